//! No-U-turn termination criteria.

use crate::hamiltonian::PhasePoint;
use crate::metric::Metric;
use nalgebra::DVector;

/// Default divergence threshold, matching `SamplerConfig::default().max_energy_error`.
pub const DEFAULT_MAX_ENERGY_ERROR: f64 = 1000.0;

/// Closed set of termination tests, dispatched on the tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    /// `(theta+ - theta-) . r- < 0 || (theta+ - theta-) . r+ < 0`.
    Classic,
    /// `r_sum . M^-1 . r- < 0 || r_sum . M^-1 . r+ < 0`.
    Generalized,
}

impl Termination {
    /// Evaluate the no-U-turn test between a subtree's two endpoints, given
    /// the accumulated momentum sum over the whole subtree.
    pub fn is_u_turn(&self, metric: &Metric, z_minus: &PhasePoint, z_plus: &PhasePoint, r_sum: &DVector<f64>) -> bool {
        match self {
            Termination::Classic => {
                let dtheta = &z_plus.theta - &z_minus.theta;
                dtheta.dot(&z_minus.r) < 0.0 || dtheta.dot(&z_plus.r) < 0.0
            }
            Termination::Generalized => {
                metric.quad_form(r_sum, &z_minus.r) < 0.0 || metric.quad_form(r_sum, &z_plus.r) < 0.0
            }
        }
    }
}

/// A leaf/subtree is divergent if its energy error relative to the initial
/// energy exceeds `max_energy_error`, or if the point itself is non-finite.
pub fn is_divergent(initial_energy: f64, z: &PhasePoint, max_energy_error: f64) -> bool {
    if !z.is_valid() {
        return true;
    }
    let delta_h = z.energy() - initial_energy;
    !delta_h.is_finite() || delta_h.abs() > max_energy_error
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hamiltonian::DualValue;

    fn point(theta: Vec<f64>, r: Vec<f64>) -> PhasePoint {
        PhasePoint {
            theta: DVector::from_vec(theta),
            r: DVector::from_vec(r),
            log_pi: DualValue { value: 0.0, grad: DVector::zeros(1) },
            log_kappa: DualValue { value: 0.0, grad: DVector::zeros(1) },
        }
    }

    #[test]
    fn classic_detects_u_turn() {
        let metric = Metric::unit(1);
        let z_minus = point(vec![0.0], vec![-1.0]);
        let z_plus = point(vec![1.0], vec![-1.0]);
        // theta diff = 1, dot with r+ = -1 < 0 => u-turn
        assert!(Termination::Classic.is_u_turn(&metric, &z_minus, &z_plus, &DVector::zeros(1)));
    }

    #[test]
    fn classic_no_u_turn_when_moving_apart() {
        let metric = Metric::unit(1);
        let z_minus = point(vec![0.0], vec![-1.0]);
        let z_plus = point(vec![1.0], vec![1.0]);
        assert!(!Termination::Classic.is_u_turn(&metric, &z_minus, &z_plus, &DVector::zeros(1)));
    }

    #[test]
    fn divergence_threshold() {
        let z = point(vec![0.0], vec![0.0]);
        assert!(!is_divergent(0.0, &z, DEFAULT_MAX_ENERGY_ERROR));
        let z_nan = PhasePoint {
            log_pi: DualValue { value: f64::NAN, grad: DVector::zeros(1) },
            ..point(vec![0.0], vec![0.0])
        };
        assert!(is_divergent(0.0, &z_nan, DEFAULT_MAX_ENERGY_ERROR));
    }

    #[test]
    fn divergence_threshold_is_configurable() {
        // energy error of 5 is fine against a threshold of 1000, but
        // divergent against a tight threshold of 1.
        let z = PhasePoint {
            log_pi: DualValue { value: -5.0, grad: DVector::zeros(1) },
            ..point(vec![0.0], vec![0.0])
        };
        assert!(!is_divergent(0.0, &z, DEFAULT_MAX_ENERGY_ERROR));
        assert!(is_divergent(0.0, &z, 1.0));
    }
}
