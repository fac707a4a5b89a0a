//! Mass-matrix adaptor: wraps a Welford estimator and produces a [`Metric`]
//! on finalize.

use crate::adaptors::welford::{CovEstimator, VarEstimator};
use crate::metric::Metric;
use log::warn;
use nalgebra::DVector;

/// Which shape of metric a run adapts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetricKind {
    /// No mass-matrix adaptation; `Metric::Unit` throughout.
    Unit,
    /// Diagonal mass matrix, fed by a [`VarEstimator`].
    Diag,
    /// Dense mass matrix, fed by a [`CovEstimator`].
    Dense,
}

/// Accumulates draws into the estimator matching `kind` and produces a new
/// [`Metric`] on finalize. A singular finalize refuses the update and keeps
/// the prior metric (logged at `warn`), per §7's error-handling design.
pub enum MassMatrixAdaptor {
    Unit { dim: usize },
    Diag(VarEstimator),
    Dense(CovEstimator),
}

impl MassMatrixAdaptor {
    /// Build a fresh adaptor of the given kind and dimension.
    pub fn new(kind: MetricKind, dim: usize) -> Self {
        match kind {
            MetricKind::Unit => MassMatrixAdaptor::Unit { dim },
            MetricKind::Diag => MassMatrixAdaptor::Diag(VarEstimator::new(dim)),
            MetricKind::Dense => MassMatrixAdaptor::Dense(CovEstimator::new(dim)),
        }
    }

    /// Feed one post-transition `theta` draw into the estimator.
    pub fn push(&mut self, theta: &DVector<f64>) {
        match self {
            MassMatrixAdaptor::Unit { .. } => {}
            MassMatrixAdaptor::Diag(est) => est.push(theta),
            MassMatrixAdaptor::Dense(est) => est.push(theta),
        }
    }

    /// Number of draws accumulated since the last reset.
    pub fn count(&self) -> u64 {
        match self {
            MassMatrixAdaptor::Unit { .. } => 0,
            MassMatrixAdaptor::Diag(est) => est.count(),
            MassMatrixAdaptor::Dense(est) => est.count(),
        }
    }

    /// Reset the underlying estimator, keeping the adaptor's kind/dimension.
    pub fn reset(&mut self) {
        match self {
            MassMatrixAdaptor::Unit { .. } => {}
            MassMatrixAdaptor::Diag(est) => est.reset(),
            MassMatrixAdaptor::Dense(est) => est.reset(),
        }
    }

    /// Extract the current estimate and build a new [`Metric`].
    ///
    /// On a non-positive-definite dense estimate, refuses the update and
    /// returns `prior.clone()` instead, logging a warning (§7).
    pub fn finalize(&self, prior: &Metric) -> Metric {
        match self {
            MassMatrixAdaptor::Unit { dim } => Metric::unit(*dim),
            MassMatrixAdaptor::Diag(est) => match Metric::diag(est.estimate()) {
                Ok(m) => m,
                Err(e) => {
                    warn!("mass-matrix finalize refused ({e}), keeping prior metric");
                    prior.clone()
                }
            },
            MassMatrixAdaptor::Dense(est) => match Metric::dense(est.estimate()) {
                Ok(m) => m,
                Err(e) => {
                    warn!("mass-matrix finalize refused ({e}), keeping prior metric");
                    prior.clone()
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_adaptor_always_finalizes_to_unit() {
        let adaptor = MassMatrixAdaptor::new(MetricKind::Unit, 3);
        let prior = Metric::unit(3);
        let m = adaptor.finalize(&prior);
        assert_eq!(m.dimension(), 3);
    }

    #[test]
    fn diag_adaptor_accumulates_and_finalizes() {
        let mut adaptor = MassMatrixAdaptor::new(MetricKind::Diag, 2);
        for i in 0..10 {
            adaptor.push(&DVector::from_vec(vec![i as f64, -(i as f64)]));
        }
        assert_eq!(adaptor.count(), 10);
        let prior = Metric::unit(2);
        let m = adaptor.finalize(&prior);
        assert!(matches!(m, Metric::Diag { .. }));
    }
}
