//! The Hamiltonian/phase-point abstraction that the rest of the crate flows
//! values through.

use crate::metric::Metric;
use crate::target::Target;
use nalgebra::DVector;
use rand::Rng;

/// A scalar value paired with its gradient, cached together so it is never
/// recomputed while flowing through the pipeline.
#[derive(Clone, Debug)]
pub struct DualValue {
    /// The scalar value.
    pub value: f64,
    /// Its gradient.
    pub grad: DVector<f64>,
}

/// A cached `(theta, r, log_pi, log_kappa)` bundle.
///
/// `PhasePoint`s are immutable values: every operation that would "update"
/// one instead produces a new one, which is what keeps reversibility and
/// determinism testable (design note in `SPEC_FULL.md` §9).
#[derive(Clone, Debug)]
pub struct PhasePoint {
    /// Position.
    pub theta: DVector<f64>,
    /// Momentum.
    pub r: DVector<f64>,
    /// Cached log-density and gradient at `theta`.
    pub log_pi: DualValue,
    /// Cached negative kinetic energy and its gradient w.r.t. `r`.
    pub log_kappa: DualValue,
}

impl PhasePoint {
    /// A phase point is valid iff every finite-checked field is finite.
    /// Non-finite ("divergent") points still flow through the pipeline but
    /// are treated as having Hamiltonian `-inf`.
    pub fn is_valid(&self) -> bool {
        self.theta.iter().all(|x| x.is_finite())
            && self.r.iter().all(|x| x.is_finite())
            && self.log_pi.value.is_finite()
            && self.log_kappa.value.is_finite()
    }

    /// `H(z) = -log_pi.value - log_kappa.value`; `+inf` (never selected) for
    /// an invalid point.
    pub fn energy(&self) -> f64 {
        if self.is_valid() {
            -self.log_pi.value - self.log_kappa.value
        } else {
            f64::INFINITY
        }
    }
}

/// Combines a [`Metric`] with a [`Target`]. Pure: mutation only happens by
/// producing a new `Hamiltonian` that shares the target.
pub struct Hamiltonian<'a> {
    /// The current mass matrix.
    pub metric: Metric,
    target: &'a dyn Target,
}

impl<'a> Hamiltonian<'a> {
    /// Pair a metric with a target.
    pub fn new(metric: Metric, target: &'a dyn Target) -> Self {
        Self { metric, target }
    }

    /// Rebuild with a new metric, keeping the same target.
    pub fn update(&self, metric: Metric) -> Self {
        Hamiltonian {
            metric,
            target: self.target,
        }
    }

    /// Dimension of the underlying target.
    pub fn dimension(&self) -> usize {
        self.target.dimension()
    }

    /// Build a [`PhasePoint`] at `theta` with momentum `r`, evaluating the
    /// target's log-density exactly once.
    pub fn phasepoint(&self, theta: DVector<f64>, r: DVector<f64>) -> PhasePoint {
        let (value, grad) = self.target.log_density(&theta);
        let (kvalue, kgrad) = self.metric.neg_kinetic_energy(&r);
        PhasePoint {
            theta,
            r,
            log_pi: DualValue { value, grad },
            log_kappa: DualValue {
                value: kvalue,
                grad: kgrad,
            },
        }
    }

    /// Redraw momentum `r ~ N(0, M)`, reusing the cached `log_pi` (`theta` is
    /// unchanged, so no extra log-density evaluation happens).
    pub fn refresh<R: Rng + ?Sized>(&self, rng: &mut R, z: &PhasePoint) -> PhasePoint {
        let r = self.metric.sample_momentum(rng);
        let (kvalue, kgrad) = self.metric.neg_kinetic_energy(&r);
        PhasePoint {
            theta: z.theta.clone(),
            r,
            log_pi: z.log_pi.clone(),
            log_kappa: DualValue {
                value: kvalue,
                grad: kgrad,
            },
        }
    }
}
