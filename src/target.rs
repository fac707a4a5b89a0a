//! The target distribution: the sampler's one required external collaborator.

use nalgebra::DVector;

/// A value providing an un-normalized log-density and its gradient, pointwise.
///
/// Implementations are expected to be pure: for a given `theta`, `log_density`
/// always returns the same `(value, gradient)` pair. This is the only
/// boundary at which automatic differentiation is assumed to happen; the
/// sampler itself never differentiates anything.
pub trait Target: Sync {
    /// Dimension `D` of the parameter space.
    fn dimension(&self) -> usize;

    /// Evaluate `(log pi(theta), grad log pi(theta))`.
    fn log_density(&self, theta: &DVector<f64>) -> (f64, DVector<f64>);
}

/// Adapts a plain closure into a [`Target`], the way the teacher's
/// `log_likelihood_from_data` wrapped a dataset into a `Fn(&M) -> f64`.
///
/// Useful for quick experiments and for the statistical test suite, where the
/// target is a closed-form density (e.g. a multivariate normal) rather than a
/// bespoke struct.
pub struct FnTarget<F> {
    dimension: usize,
    f: F,
}

impl<F> FnTarget<F>
where
    F: Fn(&DVector<f64>) -> (f64, DVector<f64>) + Sync,
{
    /// Wrap `f` as a [`Target`] of the given `dimension`.
    pub fn new(dimension: usize, f: F) -> Self {
        Self { dimension, f }
    }
}

impl<F> Target for FnTarget<F>
where
    F: Fn(&DVector<f64>) -> (f64, DVector<f64>) + Sync,
{
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn log_density(&self, theta: &DVector<f64>) -> (f64, DVector<f64>) {
        (self.f)(theta)
    }
}
