//! Nesterov dual-averaging step-size adaptation (Hoffman & Gelman §3.2.1),
//! following the teacher's `Adaptor`/`ScaleAdaptor` trait shape
//! (`steppers::adaptors::global_adaptor::GlobalAdaptor`) but tracking a
//! scalar log step size rather than a per-parameter proposal scale.

const GAMMA: f64 = 0.05;
const T0: f64 = 10.0;
const KAPPA: f64 = 0.75;

/// Dual-averaging state, per `SPEC_FULL.md` §3/§4.7.
#[derive(Clone, Debug)]
pub struct DualAveraging {
    mu: f64,
    delta: f64,
    h_bar: f64,
    log_eps_bar: f64,
    m: u64,
    /// Current (adapting) nominal step size, `exp(logϵ)`.
    current_epsilon: f64,
}

impl DualAveraging {
    /// Start dual averaging targeting acceptance rate `delta` from an
    /// initial step size `epsilon0`.
    pub fn new(delta: f64, epsilon0: f64) -> Self {
        let mu = (10.0 * epsilon0).ln();
        Self {
            mu,
            delta,
            h_bar: 0.0,
            log_eps_bar: 0.0,
            m: 0,
            current_epsilon: epsilon0,
        }
    }

    /// Target acceptance rate.
    pub fn delta(&self) -> f64 {
        self.delta
    }

    /// The step size to use *during* adaptation (`exp(logϵ)`).
    pub fn current_epsilon(&self) -> f64 {
        self.current_epsilon
    }

    /// The step size to commit once adaptation finishes (`exp(logϵ̄)`).
    pub fn averaged_epsilon(&self) -> f64 {
        if self.m == 0 {
            self.current_epsilon
        } else {
            self.log_eps_bar.exp()
        }
    }

    /// Feed one acceptance statistic `alpha` (coerced to `0` if non-finite)
    /// and advance the recursion by one adaptation step.
    pub fn update(&mut self, alpha: f64) {
        let alpha = if alpha.is_finite() { alpha.clamp(0.0, 1.0) } else { 0.0 };
        self.m += 1;
        let m = self.m as f64;

        self.h_bar = (1.0 - 1.0 / (m + T0)) * self.h_bar + (1.0 / (m + T0)) * (self.delta - alpha);
        let log_eps = self.mu - (m.sqrt() / GAMMA) * self.h_bar;
        let eta = m.powf(-KAPPA);
        self.log_eps_bar = eta * log_eps + (1.0 - eta) * self.log_eps_bar;
        self.current_epsilon = log_eps.exp();
    }

    /// Reset to a fresh dual-averaging run centered on `epsilon_current`, as
    /// happens when a warmup window closes and the mass matrix changes
    /// (`SPEC_FULL.md` §4.8).
    pub fn reset(&mut self, epsilon_current: f64) {
        self.mu = (10.0 * epsilon_current).ln();
        self.h_bar = 0.0;
        self.log_eps_bar = 0.0;
        self.m = 0;
        self.current_epsilon = epsilon_current;
    }
}
