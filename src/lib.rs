//! Hamiltonian Monte Carlo and the No-U-Turn Sampler.
//!
//! Draws samples from a continuous distribution on `R^D` given only an
//! un-normalized log-density and its gradient (a [`target::Target`]). Built
//! from three layers: the trajectory engine (leapfrog integration, tree
//! doubling, termination), the adaptation engine (Welford estimators, dual
//! averaging, the Stan-style warmup scheduler), and the [`driver::Driver`]
//! that ties them into a per-iteration sampling loop.
//!
//! ```
//! use nalgebra::DVector;
//! use nuts_sampler::driver::{Driver, NoopCallback, SamplerConfig};
//! use nuts_sampler::target::FnTarget;
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//!
//! let target = FnTarget::new(1, |theta: &DVector<f64>| {
//!     let x = theta[0];
//!     (-0.5 * x * x, DVector::from_vec(vec![-x]))
//! });
//! let mut rng = StdRng::seed_from_u64(0);
//! let config = SamplerConfig { n_adapts: 50, ..SamplerConfig::default() };
//! let theta0 = DVector::from_vec(vec![0.0]);
//! let (driver, h, lf) = Driver::new(&mut rng, &target, config, &theta0).unwrap();
//! let chain = driver.sample(&mut rng, h, lf, theta0, 100, &mut NoopCallback);
//! assert_eq!(chain.draws.len(), 50);
//! ```

pub mod adaptors;
pub mod diagnostics;
pub mod driver;
pub mod error;
pub mod hamiltonian;
pub mod integrator;
pub mod kernel;
pub mod metric;
pub mod target;
pub mod termination;
pub mod trajectory;

pub use driver::{Chain, Chains, Driver, SamplerConfig, Transition, TransitionStats};
pub use error::HmcError;
pub use hamiltonian::{Hamiltonian, PhasePoint};
pub use kernel::Kernel;
pub use metric::Metric;
pub use target::{FnTarget, Target};
