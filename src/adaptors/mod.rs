//! Adaptation: online estimators, dual averaging, mass-matrix adaptation,
//! and the composite Stan-style warmup scheduler.

pub mod dual_averaging;
pub mod mass_matrix;
pub mod warmup;
pub mod welford;

pub use dual_averaging::DualAveraging;
pub use mass_matrix::{MassMatrixAdaptor, MetricKind};
pub use warmup::{StanWarmup, WarmupPhase, WarmupSchedule, WarmupUpdate};
pub use welford::{CovEstimator, VarEstimator};
