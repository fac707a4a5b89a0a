//! Symplectic leapfrog integration and its jittered/tempered variants.
//!
//! Grounded in the `nuts-rs` reference potential's `leapfrog` (half-step,
//! full-step, half-step, then an energy-error check that turns into a
//! divergence) and in `Funmatu-hamiltonian-sampler-rs::run_hmc_chain`'s plain
//! leapfrog loop, generalized from a hardcoded 2D point to a `DVector<f64>`.

use crate::hamiltonian::{Hamiltonian, PhasePoint};
use rand::Rng;

/// The result of integrating a trajectory: the last point reached, and
/// whether a divergence (non-finite energy, or `|delta H| > max_energy_error`)
/// was hit before all requested steps completed.
pub struct StepResult {
    /// Last valid phase point reached.
    pub z: PhasePoint,
    /// True if integration stopped early due to a divergence.
    pub diverged: bool,
    /// The (possibly jittered) step size actually used for this call.
    pub epsilon_used: f64,
}

/// The closed set of leapfrog variants.
#[derive(Clone, Debug)]
pub enum Leapfrog {
    /// Constant step size `epsilon`.
    Plain {
        /// Nominal step size.
        epsilon: f64,
    },
    /// `epsilon` multiplied by `1 + jitter * U(-1, 1)`, resampled once per
    /// `step` call (not per leap).
    Jittered {
        /// Nominal (unjittered) step size.
        epsilon: f64,
        /// Relative jitter amplitude in `[0, 1)`.
        jitter: f64,
    },
    /// Momentum tempered by `sqrt(alpha)` on the first half of the
    /// trajectory and `1/sqrt(alpha)` on the second.
    Tempered {
        /// Nominal step size.
        epsilon: f64,
        /// Tempering factor.
        alpha: f64,
    },
}

impl Leapfrog {
    /// The nominal (pre-jitter) step size, used by dual averaging.
    pub fn nominal_epsilon(&self) -> f64 {
        match self {
            Leapfrog::Plain { epsilon } | Leapfrog::Jittered { epsilon, .. } | Leapfrog::Tempered { epsilon, .. } => {
                *epsilon
            }
        }
    }

    /// Rebuild with a new nominal step size, keeping any jitter/tempering
    /// configuration.
    pub fn with_epsilon(&self, epsilon: f64) -> Self {
        match self {
            Leapfrog::Plain { .. } => Leapfrog::Plain { epsilon },
            Leapfrog::Jittered { jitter, .. } => Leapfrog::Jittered { epsilon, jitter: *jitter },
            Leapfrog::Tempered { alpha, .. } => Leapfrog::Tempered { epsilon, alpha: *alpha },
        }
    }

    /// Resolve this trajectory's actual step size, sampling jitter once if
    /// applicable. Returns the signed step for `n_steps`'s direction.
    fn resolve_epsilon<R: Rng + ?Sized>(&self, rng: &mut R, n_steps: i64) -> f64 {
        let sign = if n_steps < 0 { -1.0 } else { 1.0 };
        let base = match self {
            Leapfrog::Plain { epsilon } | Leapfrog::Tempered { epsilon, .. } => *epsilon,
            Leapfrog::Jittered { epsilon, jitter } => {
                let u: f64 = rng.gen_range(-1.0..1.0);
                epsilon * (1.0 + jitter * u)
            }
        };
        sign * base
    }

    /// Tempering factor to apply to momentum before the `i`-th (1-indexed)
    /// pre-kick half step, and after its post-kick half step, out of `n`
    /// total steps. Plain/Jittered variants always return `1.0`. For odd
    /// `n` the single middle step gets the pre-kick boost but a neutral
    /// post-kick factor, so it contributes one net `sqrt(alpha)` rather than
    /// `alpha` (boost then immediately undoing it) or `1` (no net effect).
    fn temper_factors(&self, i: u64, n: u64) -> (f64, f64) {
        match self {
            Leapfrog::Tempered { alpha, .. } => {
                let pre_cut = (n as f64 / 2.0).ceil() as u64;
                let post_cut = n / 2;
                let midpoint = if n % 2 == 1 { Some(n / 2 + 1) } else { None };
                let pre = if i <= pre_cut { alpha.sqrt() } else { 1.0 / alpha.sqrt() };
                let post = if Some(i) == midpoint {
                    1.0
                } else if i <= post_cut {
                    alpha.sqrt()
                } else {
                    1.0 / alpha.sqrt()
                };
                (pre, post)
            }
            _ => (1.0, 1.0),
        }
    }

    /// Perform `|n_steps|` leapfrog leaps from `z`, in the direction
    /// `sign(n_steps)`. Returns early with `diverged = true` if a phase
    /// point becomes non-finite.
    pub fn step<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        h: &Hamiltonian,
        z: &PhasePoint,
        n_steps: i64,
    ) -> StepResult {
        let n = n_steps.unsigned_abs();
        let epsilon = self.resolve_epsilon(rng, n_steps);

        let mut cur = z.clone();
        for i in 1..=n {
            let (pre, post) = self.temper_factors(i, n);
            let r_tempered = &cur.r * pre;
            let r_half = &r_tempered + cur.log_pi.grad.clone() * (0.5 * epsilon);
            let theta_new = &cur.theta + &r_half * epsilon;
            let next = h.phasepoint(theta_new, r_half);
            if !next.is_valid() {
                return StepResult { z: cur, diverged: true, epsilon_used: epsilon };
            }
            let r_full = &next.r + next.log_pi.grad.clone() * (0.5 * epsilon);
            let r_full = r_full * post;
            let next = h.phasepoint(next.theta, r_full);
            if !next.is_valid() {
                return StepResult { z: cur, diverged: true, epsilon_used: epsilon };
            }
            cur = next;
        }
        StepResult { z: cur, diverged: false, epsilon_used: epsilon }
    }
}
