//! Sampler configuration and the per-chain/multi-chain driving loop.
//!
//! Generalized from the teacher's `Runner` builder
//! (`runner/mod.rs::Runner::{new,draws,warmup,chains,thinning,run}`): a
//! config gathers run knobs, validates itself, and `Driver::sample_chains`
//! fans out independently-seeded chains with `rayon`, exactly as
//! `Runner::run` seeds one RNG per chain and calls `par_iter`.

use crate::adaptors::mass_matrix::MetricKind;
use crate::adaptors::warmup::StanWarmup;
use crate::error::HmcError;
use crate::hamiltonian::{Hamiltonian, PhasePoint};
use crate::integrator::Leapfrog;
use crate::kernel::Kernel;
use crate::metric::Metric;
use crate::target::Target;
use crate::termination::Termination;
use crate::trajectory::sampler::TrajectorySampler;
use log::{debug, info, warn};
use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

/// Run configuration, validated once at [`Driver::new`].
#[derive(Clone, Debug)]
pub struct SamplerConfig {
    /// Target acceptance rate for dual averaging, in `(0, 1)`.
    pub delta: f64,
    /// Maximum NUTS tree-doubling depth (ignored by the static kernels).
    pub max_depth: u32,
    /// Maximum tolerated `|delta H|` before a leaf is marked divergent.
    pub max_energy_error: f64,
    /// Initial step size; `None` triggers the reasonable-epsilon search.
    pub initial_step_size: Option<f64>,
    /// Number of warmup/adaptation iterations.
    pub n_adapts: usize,
    /// Which mass-matrix shape to adapt.
    pub metric_kind: MetricKind,
    /// Whether to retain warmup draws in the returned [`Chain`].
    pub keep_warmup: bool,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            delta: 0.8,
            max_depth: 10,
            max_energy_error: 1000.0,
            initial_step_size: None,
            n_adapts: 1000,
            metric_kind: MetricKind::Diag,
            keep_warmup: false,
        }
    }
}

impl SamplerConfig {
    /// Check field ranges, matching the taxonomy in `error.rs`.
    pub fn validate(&self) -> Result<(), HmcError> {
        if !(self.delta > 0.0 && self.delta < 1.0) {
            return Err(HmcError::InvalidConfig {
                reason: format!("delta must be in (0, 1), got {}", self.delta),
            });
        }
        if self.max_depth < 1 {
            return Err(HmcError::InvalidConfig {
                reason: "max_depth must be at least 1".into(),
            });
        }
        if let Some(eps) = self.initial_step_size {
            if !(eps > 0.0 && eps.is_finite()) {
                return Err(HmcError::InvalidConfig {
                    reason: format!("initial_step_size must be positive and finite, got {}", eps),
                });
            }
        }
        if self.max_energy_error <= 0.0 {
            return Err(HmcError::InvalidConfig {
                reason: "max_energy_error must be positive".into(),
            });
        }
        Ok(())
    }
}

/// Per-transition diagnostics, per `SPEC_FULL.md` §3 "Transition".
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde_support", derive(serde::Serialize, serde::Deserialize))]
pub struct TransitionStats {
    /// Number of leapfrog evaluations taken this transition.
    pub n_steps: u64,
    /// Whether the proposal was accepted.
    pub is_accept: bool,
    /// Mean acceptance probability across leaves/proposals.
    pub acceptance_rate: f64,
    /// `log pi(theta)` at the returned point.
    pub log_density: f64,
    /// `H(z)` at the returned point.
    pub hamiltonian_energy: f64,
    /// Whether a divergence was hit during this transition.
    pub numerical_error: bool,
    /// Step size actually used (post-jitter).
    pub step_size: f64,
    /// Nominal (pre-jitter, currently-adapted) step size.
    pub nom_step_size: f64,
    /// NUTS tree depth reached (`0` for static kernels).
    pub tree_depth: u32,
}

/// One `(theta, stats)` pair.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde_support", derive(serde::Serialize, serde::Deserialize))]
pub struct Transition {
    /// Sampled position.
    pub theta: DVector<f64>,
    /// This transition's diagnostics.
    pub stats: TransitionStats,
}

/// Read-only hook invoked at the end of every iteration.
pub trait ProgressCallback {
    /// Called after iteration `iteration` (1-indexed) completes.
    fn on_step(&mut self, iteration: usize, transition: &Transition);
}

/// A no-op callback, the default when the caller doesn't want progress reporting.
pub struct NoopCallback;
impl ProgressCallback for NoopCallback {
    fn on_step(&mut self, _iteration: usize, _transition: &Transition) {}
}

/// A batched sink of draws and their per-iteration stats for one chain.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde_support", derive(serde::Serialize, serde::Deserialize))]
pub struct Chain {
    /// Sampled positions, in draw order.
    pub draws: Vec<DVector<f64>>,
    /// Per-iteration diagnostics, parallel to `draws`.
    pub stats: Vec<TransitionStats>,
}

impl Chain {
    /// Extract coordinate `d`'s trace across all draws.
    pub fn coordinate(&self, d: usize) -> Vec<f64> {
        self.draws.iter().map(|theta| theta[d]).collect()
    }

    /// Split this chain in half (used for split-R̂); panics if the chain has fewer than 2 draws.
    pub fn split_halves(&self) -> (Chain, Chain) {
        let half = self.draws.len() / 2;
        let first = Chain {
            draws: self.draws[..half].to_vec(),
            stats: self.stats[..half].to_vec(),
        };
        let second = Chain {
            draws: self.draws[half..2 * half].to_vec(),
            stats: self.stats[half..2 * half].to_vec(),
        };
        (first, second)
    }
}

/// Multiple chains' results, as returned by [`Driver::sample_chains`].
pub type Chains = Vec<Chain>;

/// Drives a single chain's sampling loop.
pub struct Driver<'a> {
    config: SamplerConfig,
    target: &'a dyn Target,
    kernel: Kernel,
}

impl<'a> Driver<'a> {
    /// Build a driver for `target` under `config`, validating `config` and
    /// finding a reasonable initial step size at `theta0` if none was given.
    pub fn new<R: Rng + ?Sized>(rng: &mut R, target: &'a dyn Target, config: SamplerConfig, theta0: &DVector<f64>) -> Result<(Self, Hamiltonian<'a>, Leapfrog), HmcError> {
        config.validate()?;
        if theta0.len() != target.dimension() {
            return Err(HmcError::DimensionMismatch {
                expected: target.dimension(),
                found: theta0.len(),
            });
        }

        let metric = Metric::unit(target.dimension());
        let h = Hamiltonian::new(metric, target);

        let epsilon0 = match config.initial_step_size {
            Some(eps) => eps,
            None => find_reasonable_epsilon(rng, &h, theta0),
        };
        let lf = Leapfrog::Jittered { epsilon: epsilon0, jitter: 0.0 };

        let kernel = Kernel::Nuts {
            max_depth: config.max_depth,
            termination: Termination::Generalized,
            sampler: TrajectorySampler::Multinomial,
        };

        Ok((Driver { config, target, kernel }, h, lf))
    }

    /// Run `n_samples` total iterations (including `config.n_adapts` warmup
    /// iterations), starting from `theta0`. Returns the resulting [`Chain`]
    /// (dropping the warmup draws unless `config.keep_warmup`).
    pub fn sample<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        mut h: Hamiltonian<'a>,
        mut lf: Leapfrog,
        theta0: DVector<f64>,
        n_samples: usize,
        callback: &mut dyn ProgressCallback,
    ) -> Chain {
        let n_adapts = self.config.n_adapts.min(n_samples);
        let mut warmup = StanWarmup::new(n_adapts, self.config.delta, lf.nominal_epsilon(), self.config.metric_kind, self.target.dimension());

        let mut z = h.phasepoint(theta0, DVector::zeros(self.target.dimension()));
        let mut chain = Chain::default();

        for i in 1..=n_samples {
            z = h.refresh(rng, &z);
            let nominal_epsilon = lf.nominal_epsilon();
            let result = self.kernel.transition(rng, &h, &lf, &z, self.config.max_energy_error);
            z = result.z;

            if result.numerical_error {
                warn!("divergent transition at iteration {} (tree depth {})", i, result.tree_depth);
            }

            if i <= n_adapts {
                let update = warmup.observe(i, &z.theta, result.acceptance_rate, &h.metric);
                lf = lf.with_epsilon(update.next_epsilon);
                if let Some(metric) = update.new_metric {
                    h = h.update(metric);
                    z = h.phasepoint(z.theta, z.r);
                }
                if i == n_adapts {
                    lf = lf.with_epsilon(warmup.committed_epsilon());
                    info!("warmup finished at iteration {}, committed step size {}", i, lf.nominal_epsilon());
                }
            }

            let stats = TransitionStats {
                n_steps: result.n_steps,
                is_accept: result.is_accept,
                acceptance_rate: result.acceptance_rate,
                log_density: z.log_pi.value,
                hamiltonian_energy: z.energy(),
                numerical_error: result.numerical_error,
                step_size: result.step_size,
                nom_step_size: nominal_epsilon,
                tree_depth: result.tree_depth,
            };

            let transition = Transition { theta: z.theta.clone(), stats };
            callback.on_step(i, &transition);

            if self.config.keep_warmup || i > n_adapts {
                chain.draws.push(transition.theta);
                chain.stats.push(transition.stats);
            }

            debug!("iteration {}: accept={} steps={} depth={}", i, transition.stats.is_accept, transition.stats.n_steps, transition.stats.tree_depth);
        }

        chain
    }

    /// Run `n_chains` independent chains in parallel (via `rayon`), each
    /// seeded from `master_rng`. Requires `Target: Sync` (already required
    /// by the trait) and that `theta0` is shared as the common starting point.
    pub fn sample_chains<R: Rng + ?Sized>(
        master_rng: &mut R,
        target: &'a dyn Target,
        config: SamplerConfig,
        theta0: &DVector<f64>,
        n_chains: usize,
        n_samples: usize,
    ) -> Result<Chains, HmcError> {
        let seeds: Vec<u64> = (0..n_chains).map(|_| master_rng.gen()).collect();

        seeds
            .par_iter()
            .map(|&seed| {
                let mut rng = StdRng::seed_from_u64(seed);
                let (driver, h, lf) = Driver::new(&mut rng, target, config.clone(), theta0)?;
                Ok(driver.sample(&mut rng, h, lf, theta0.clone(), n_samples, &mut NoopCallback))
            })
            .collect()
    }
}

/// Doubling/halving search for a step size giving an initial acceptance
/// probability near `0.5`, following the heuristic used by Stan/NUTS
/// implementations (and the `nuts-rs` reference potential in the retrieval
/// pack) to bootstrap dual averaging without a caller-supplied `epsilon0`.
fn find_reasonable_epsilon<R: Rng + ?Sized>(rng: &mut R, h: &Hamiltonian, theta0: &DVector<f64>) -> f64 {
    let mut epsilon = 1.0;
    let r0 = h.metric.sample_momentum(rng);
    let z0 = h.phasepoint(theta0.clone(), r0);

    let log_accept = |eps: f64| -> f64 {
        let step = Leapfrog::Plain { epsilon: eps }.step(rng, h, &z0, 1);
        if step.diverged {
            f64::NEG_INFINITY
        } else {
            z0.energy() - step.z.energy()
        }
    };

    let mut a = log_accept(epsilon);
    let direction = if a > (0.5f64).ln() { 1.0 } else { -1.0 };
    let mut iterations = 0;
    while (a * direction) > (-direction * (0.5f64).ln()) && iterations < 100 {
        epsilon *= 2f64.powf(direction);
        a = log_accept(epsilon);
        iterations += 1;
    }
    epsilon.max(1e-6)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::FnTarget;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn standard_normal() -> FnTarget<impl Fn(&DVector<f64>) -> (f64, DVector<f64>)> {
        FnTarget::new(2, |theta: &DVector<f64>| (-0.5 * theta.dot(theta), -theta.clone()))
    }

    #[test]
    fn config_rejects_bad_delta() {
        let config = SamplerConfig { delta: 1.5, ..SamplerConfig::default() };
        assert!(matches!(config.validate(), Err(HmcError::InvalidConfig { .. })));
    }

    #[test]
    fn config_rejects_zero_max_depth() {
        let config = SamplerConfig { max_depth: 0, ..SamplerConfig::default() };
        assert!(matches!(config.validate(), Err(HmcError::InvalidConfig { .. })));
    }

    #[test]
    fn driver_new_rejects_dimension_mismatch() {
        let target = standard_normal();
        let mut rng = StdRng::seed_from_u64(0);
        let config = SamplerConfig::default();
        let theta0 = DVector::from_vec(vec![0.0, 0.0, 0.0]);
        let result = Driver::new(&mut rng, &target, config, &theta0);
        assert!(matches!(result, Err(HmcError::DimensionMismatch { .. })));
    }

    #[test]
    fn short_run_produces_expected_number_of_kept_draws() {
        let target = standard_normal();
        let mut rng = StdRng::seed_from_u64(0);
        let config = SamplerConfig {
            n_adapts: 20,
            ..SamplerConfig::default()
        };
        let theta0 = DVector::from_vec(vec![0.0, 0.0]);
        let (driver, h, lf) = Driver::new(&mut rng, &target, config, &theta0).unwrap();
        let chain = driver.sample(&mut rng, h, lf, theta0, 40, &mut NoopCallback);
        assert_eq!(chain.draws.len(), 20);
    }

    #[test]
    fn rng_determinism_gives_identical_chains() {
        let target = standard_normal();
        let theta0 = DVector::from_vec(vec![0.0, 0.0]);
        let config = SamplerConfig { n_adapts: 10, ..SamplerConfig::default() };

        let mut rng_a = StdRng::seed_from_u64(99);
        let (driver_a, h_a, lf_a) = Driver::new(&mut rng_a, &target, config.clone(), &theta0).unwrap();
        let chain_a = driver_a.sample(&mut rng_a, h_a, lf_a, theta0.clone(), 20, &mut NoopCallback);

        let mut rng_b = StdRng::seed_from_u64(99);
        let (driver_b, h_b, lf_b) = Driver::new(&mut rng_b, &target, config, &theta0).unwrap();
        let chain_b = driver_b.sample(&mut rng_b, h_b, lf_b, theta0, 20, &mut NoopCallback);

        for (a, b) in chain_a.draws.iter().zip(chain_b.draws.iter()) {
            assert_eq!(a, b);
        }
    }

    #[cfg(feature = "serde_support")]
    #[test]
    fn chain_round_trips_through_json() {
        let target = standard_normal();
        let mut rng = StdRng::seed_from_u64(0);
        let config = SamplerConfig { n_adapts: 5, ..SamplerConfig::default() };
        let theta0 = DVector::from_vec(vec![0.0, 0.0]);
        let (driver, h, lf) = Driver::new(&mut rng, &target, config, &theta0).unwrap();
        let chain = driver.sample(&mut rng, h, lf, theta0, 10, &mut NoopCallback);

        let json = serde_json::to_string(&chain).expect("chain should serialize");
        let round_tripped: Chain = serde_json::from_str(&json).expect("chain should deserialize");
        assert_eq!(chain.draws.len(), round_tripped.draws.len());
        for (a, b) in chain.draws.iter().zip(round_tripped.draws.iter()) {
            assert_eq!(a, b);
        }
    }
}
