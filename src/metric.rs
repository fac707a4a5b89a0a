//! Mass matrices parameterizing the kinetic energy and momentum distribution.

use crate::error::HmcError;
use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use rand::Rng;
use rand_distr::StandardNormal;

/// The three supported mass-matrix shapes.
///
/// A closed set, dispatched on the tag rather than through a trait object,
/// per the "tagged variants over inheritance" design note: integrators,
/// kernels, and adaptors all switch on `Metric` the same way.
#[derive(Clone, Debug)]
pub enum Metric {
    /// `M^-1 = I`.
    Unit {
        /// Dimension `D`.
        dim: usize,
    },
    /// `M^-1 = diag(m_inv)`, all entries strictly positive and finite.
    Diag {
        /// Inverse mass per coordinate.
        m_inv: DVector<f64>,
    },
    /// `M^-1` dense and symmetric positive-definite; `chol_m` is the
    /// Cholesky factor of `M` (the inverse of `m_inv`), used to draw momentum.
    Dense {
        /// Inverse mass matrix.
        m_inv: DMatrix<f64>,
        /// Cholesky factor of `M = m_inv^-1`.
        chol_m: DMatrix<f64>,
    },
}

impl Metric {
    /// Construct a unit metric of the given dimension.
    pub fn unit(dim: usize) -> Self {
        Metric::Unit { dim }
    }

    /// Construct a diagonal metric from an inverse-mass vector.
    ///
    /// Returns `InvalidConfig` if any entry is non-positive or non-finite.
    pub fn diag(m_inv: DVector<f64>) -> Result<Self, HmcError> {
        if m_inv.iter().any(|&x| !(x > 0.0 && x.is_finite())) {
            return Err(HmcError::InvalidConfig {
                reason: "diagonal inverse mass must be strictly positive and finite".into(),
            });
        }
        Ok(Metric::Diag { m_inv })
    }

    /// Construct a dense metric from a symmetric positive-definite inverse
    /// mass matrix, computing the Cholesky factor of its inverse.
    pub fn dense(m_inv: DMatrix<f64>) -> Result<Self, HmcError> {
        let m = m_inv.clone().try_inverse().ok_or(HmcError::SingularMassMatrix)?;
        let chol: Cholesky<f64, Dyn> =
            Cholesky::new(m).ok_or(HmcError::SingularMassMatrix)?;
        Ok(Metric::Dense {
            m_inv,
            chol_m: chol.l(),
        })
    }

    /// Dimension `D`.
    pub fn dimension(&self) -> usize {
        match self {
            Metric::Unit { dim } => *dim,
            Metric::Diag { m_inv } => m_inv.len(),
            Metric::Dense { m_inv, .. } => m_inv.nrows(),
        }
    }

    /// Rebuild this metric at a new dimension (used only at initialization,
    /// per the "dimension mismatch resolved by rebuilding at init" rule).
    pub fn with_dimension(&self, dim: usize) -> Self {
        match self {
            Metric::Unit { .. } => Metric::Unit { dim },
            Metric::Diag { .. } => Metric::Diag {
                m_inv: DVector::from_element(dim, 1.0),
            },
            Metric::Dense { .. } => Metric::Dense {
                m_inv: DMatrix::identity(dim, dim),
                chol_m: DMatrix::identity(dim, dim),
            },
        }
    }

    /// Draw momentum `r ~ N(0, M)`.
    pub fn sample_momentum<R: Rng + ?Sized>(&self, rng: &mut R) -> DVector<f64> {
        let dim = self.dimension();
        let z = DVector::from_iterator(dim, (0..dim).map(|_| rng.sample::<f64, _>(StandardNormal)));
        match self {
            Metric::Unit { .. } => z,
            Metric::Diag { m_inv } => {
                DVector::from_iterator(dim, m_inv.iter().zip(z.iter()).map(|(m, zi)| zi * m.sqrt()))
            }
            // z ~ N(0, I); r = chol(M) z ~ N(0, M)
            Metric::Dense { chol_m, .. } => chol_m * &z,
        }
    }

    /// Negative kinetic energy and its gradient w.r.t. momentum:
    /// `l_kappa(r) = -0.5 r^T M^-1 r`, `grad = -M^-1 r`.
    pub fn neg_kinetic_energy(&self, r: &DVector<f64>) -> (f64, DVector<f64>) {
        match self {
            Metric::Unit { .. } => (-0.5 * r.dot(r), -r.clone()),
            Metric::Diag { m_inv } => {
                let minv_r = DVector::from_iterator(
                    r.len(),
                    r.iter().zip(m_inv.iter()).map(|(ri, mi)| ri * mi),
                );
                (-0.5 * r.dot(&minv_r), -minv_r)
            }
            Metric::Dense { m_inv, .. } => {
                let minv_r = m_inv * r;
                (-0.5 * r.dot(&minv_r), -minv_r)
            }
        }
    }

    /// `r . M^-1 . r'`, used by the generalized no-U-turn criterion.
    pub fn quad_form(&self, r: &DVector<f64>, rp: &DVector<f64>) -> f64 {
        match self {
            Metric::Unit { .. } => r.dot(rp),
            Metric::Diag { m_inv } => r.iter().zip(rp.iter()).zip(m_inv.iter()).map(|((a, b), m)| a * b * m).sum(),
            Metric::Dense { m_inv, .. } => r.dot(&(m_inv * rp)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn unit_metric_kinetic_energy() {
        let m = Metric::unit(2);
        let r = DVector::from_vec(vec![1.0, 2.0]);
        let (v, g) = m.neg_kinetic_energy(&r);
        assert!((v - (-2.5)).abs() < 1e-12);
        assert_eq!(g, -r);
    }

    #[test]
    fn diag_rejects_nonpositive() {
        assert!(Metric::diag(DVector::from_vec(vec![1.0, -1.0])).is_err());
        assert!(Metric::diag(DVector::from_vec(vec![1.0, f64::NAN])).is_err());
    }

    #[test]
    fn dense_rejects_singular() {
        let singular = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        assert!(Metric::dense(singular).is_err());
    }

    #[test]
    fn momentum_sampling_is_deterministic_given_seed() {
        let m = Metric::diag(DVector::from_vec(vec![1.0, 4.0])).unwrap();
        let mut r1 = StdRng::seed_from_u64(42);
        let mut r2 = StdRng::seed_from_u64(42);
        assert_eq!(m.sample_momentum(&mut r1), m.sample_momentum(&mut r2));
    }

    #[test]
    fn quad_form_matches_dot_for_unit() {
        let m = Metric::unit(3);
        let a = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        let b = DVector::from_vec(vec![4.0, 5.0, 6.0]);
        assert!((m.quad_form(&a, &b) - a.dot(&b)).abs() < 1e-12);
    }
}
