//! Online (Welford) variance/covariance estimators, generalized from the
//! teacher's scalar `utils::mean_and_variance::MeanAndVariance` to vectors
//! and matrices.

use nalgebra::{DMatrix, DVector};

/// Stan's shrinkage constant: the regularized estimate blends the raw
/// Welford estimate with a `1e-3 * I` prior, weighted `n / (n + 5)`.
const SHRINKAGE_TARGET: f64 = 1e-3;
const SHRINKAGE_NU: f64 = 5.0;

/// Online estimator of a per-coordinate variance vector.
#[derive(Clone, Debug)]
pub struct VarEstimator {
    dim: usize,
    n: u64,
    mean: DVector<f64>,
    m2: DVector<f64>,
}

impl VarEstimator {
    /// A fresh estimator over `dim` dimensions.
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            n: 0,
            mean: DVector::zeros(dim),
            m2: DVector::zeros(dim),
        }
    }

    /// Dimension.
    pub fn dimension(&self) -> usize {
        self.dim
    }

    /// Number of samples seen.
    pub fn count(&self) -> u64 {
        self.n
    }

    /// Incorporate one sample.
    pub fn push(&mut self, x: &DVector<f64>) {
        self.n += 1;
        let n = self.n as f64;
        let delta = x - &self.mean;
        self.mean += &delta / n;
        let delta2 = x - &self.mean;
        for i in 0..self.dim {
            self.m2[i] += delta[i] * delta2[i];
        }
    }

    /// The regularized variance estimate. `n < 2` returns the identity
    /// (a vector of ones), used during cold start.
    pub fn estimate(&self) -> DVector<f64> {
        if self.n < 2 {
            return DVector::from_element(self.dim, 1.0);
        }
        let n = self.n as f64;
        let raw = &self.m2 / (n - 1.0);
        let w = n / (n + SHRINKAGE_NU);
        raw * w + DVector::from_element(self.dim, SHRINKAGE_TARGET * (1.0 - w))
    }

    /// Reset to a fresh estimator of the same dimension, as happens between
    /// warmup windows.
    pub fn reset(&mut self) {
        *self = Self::new(self.dim);
    }

    /// Naive two-pass variance over a batch, used to cross-check the online
    /// recurrence in tests.
    pub fn naive(values: &[DVector<f64>]) -> DVector<f64> {
        let dim = values[0].len();
        let n = values.len() as f64;
        let mean = values.iter().fold(DVector::zeros(dim), |acc, x| acc + x) / n;
        let ss = values.iter().fold(DVector::zeros(dim), |acc, x| {
            let d = x - &mean;
            acc + d.component_mul(&d)
        });
        ss / (n - 1.0)
    }
}

/// Online estimator of a full `D x D` covariance matrix.
#[derive(Clone, Debug)]
pub struct CovEstimator {
    dim: usize,
    n: u64,
    mean: DVector<f64>,
    m2: DMatrix<f64>,
}

impl CovEstimator {
    /// A fresh estimator over `dim` dimensions.
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            n: 0,
            mean: DVector::zeros(dim),
            m2: DMatrix::zeros(dim, dim),
        }
    }

    /// Dimension.
    pub fn dimension(&self) -> usize {
        self.dim
    }

    /// Number of samples seen.
    pub fn count(&self) -> u64 {
        self.n
    }

    /// Incorporate one sample: the Welford rank-one outer-product update.
    pub fn push(&mut self, x: &DVector<f64>) {
        self.n += 1;
        let n = self.n as f64;
        let delta = x - &self.mean;
        self.mean += &delta / n;
        let delta2 = x - &self.mean;
        self.m2 += outer(&delta, &delta2);
    }

    /// The regularized covariance estimate. `n < 2` returns the identity.
    pub fn estimate(&self) -> DMatrix<f64> {
        if self.n < 2 {
            return DMatrix::identity(self.dim, self.dim);
        }
        let n = self.n as f64;
        let raw = &self.m2 / (n - 1.0);
        let w = n / (n + SHRINKAGE_NU);
        raw * w + DMatrix::identity(self.dim, self.dim) * (SHRINKAGE_TARGET * (1.0 - w))
    }

    /// Reset to a fresh estimator of the same dimension.
    pub fn reset(&mut self) {
        *self = Self::new(self.dim);
    }

    /// Naive two-pass covariance over a batch, used to cross-check the
    /// online recurrence in tests.
    pub fn naive(values: &[DVector<f64>]) -> DMatrix<f64> {
        let dim = values[0].len();
        let n = values.len() as f64;
        let mean = values.iter().fold(DVector::zeros(dim), |acc, x| acc + x) / n;
        let ss = values.iter().fold(DMatrix::zeros(dim, dim), |acc, x| {
            let d = x - &mean;
            acc + outer(&d, &d)
        });
        ss / (n - 1.0)
    }
}

/// Outer product, as in the teacher's `utils::outer`.
fn outer(left: &DVector<f64>, right: &DVector<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(left.len(), right.len(), |i, j| left[i] * right[j])
}
