//! Stan-style three-phase warmup scheduler: composes dual averaging and
//! mass-matrix adaptation behind a small explicit state machine, per the
//! "composable adaptor" design note (`SPEC_FULL.md` §9) and grounded in the
//! teacher's `steppers::adaptors::adaptor_state::AdaptState` idiom of
//! representing adaptor phase as a closed enum rather than scattered
//! booleans.

use crate::adaptors::dual_averaging::DualAveraging;
use crate::adaptors::mass_matrix::{MassMatrixAdaptor, MetricKind};
use crate::metric::Metric;
use log::info;
use nalgebra::DVector;

const DEFAULT_INIT_BUFFER: usize = 75;
const DEFAULT_TERM_BUFFER: usize = 50;
const DEFAULT_BASE_WINDOW: usize = 25;

/// Which of the three phases iteration `i` (1-indexed) falls in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WarmupPhase {
    /// Only step-size adapts.
    Init,
    /// Both step-size and mass-matrix adapt; windows close within this phase.
    MassWindow,
    /// Only step-size adapts.
    Term,
    /// Warmup has finished (`i > n_adapts`).
    Done,
}

/// The computed window boundaries for a given `n_adapts`, independent of any
/// running adaptor state (this is what §8 tests 8/9 check directly).
#[derive(Clone, Debug)]
pub struct WarmupSchedule {
    n_adapts: usize,
    init_buffer: usize,
    term_buffer: usize,
    window_end: usize,
    /// Iterations at which a mass-matrix window closes (ascending, last
    /// entry always equals `window_end`).
    window_closes: Vec<usize>,
}

impl WarmupSchedule {
    /// Compute the schedule for `n_adapts` adaptation iterations, per
    /// `SPEC_FULL.md` §4.8 (default buffers, doubling windows, and the
    /// degenerate collapse when the buffers don't fit).
    pub fn new(n_adapts: usize) -> Self {
        Self::with_buffers(n_adapts, DEFAULT_INIT_BUFFER, DEFAULT_TERM_BUFFER, DEFAULT_BASE_WINDOW)
    }

    fn with_buffers(n_adapts: usize, init_buffer: usize, term_buffer: usize, base_window: usize) -> Self {
        if init_buffer + term_buffer + base_window > n_adapts {
            let init_buffer = ((0.15 * n_adapts as f64) as usize).max(1).min(n_adapts);
            let term_buffer = ((0.1 * n_adapts as f64) as usize).max(1).min(n_adapts.saturating_sub(init_buffer));
            let window_end = n_adapts.saturating_sub(term_buffer).max(init_buffer);
            info!(
                "warmup buffers do not fit n_adapts={}, collapsing to a single window [{}..{}]",
                n_adapts, init_buffer, window_end
            );
            return Self {
                n_adapts,
                init_buffer,
                term_buffer,
                window_end,
                window_closes: vec![window_end],
            };
        }

        let window_end = n_adapts - term_buffer;
        let window_start = init_buffer + 1;
        let mut w = base_window;
        let mut b = window_start + w - 1;
        let mut closes = vec![b];
        while b < window_end {
            let tentative_w = w * 2;
            let tentative_b = b + tentative_w;
            let lookahead = tentative_b + 2 * tentative_w;
            if lookahead > window_end {
                if b != window_end {
                    closes.push(window_end);
                }
                b = window_end;
            } else {
                w = tentative_w;
                b = tentative_b;
                closes.push(b);
            }
        }

        Self {
            n_adapts,
            init_buffer,
            term_buffer,
            window_end,
            window_closes: closes,
        }
    }

    /// The `init_buffer + 1` boundary where mass-matrix adaptation begins.
    pub fn window_start(&self) -> usize {
        self.init_buffer + 1
    }

    /// The iteration at which the last mass-matrix window closes.
    pub fn window_end(&self) -> usize {
        self.window_end
    }

    /// The ascending list of mass-matrix window closing iterations.
    pub fn window_closes(&self) -> &[usize] {
        &self.window_closes
    }

    /// Which phase iteration `i` (1-indexed) falls in.
    pub fn phase(&self, i: usize) -> WarmupPhase {
        if i > self.n_adapts {
            WarmupPhase::Done
        } else if i <= self.init_buffer {
            WarmupPhase::Init
        } else if i <= self.window_end {
            WarmupPhase::MassWindow
        } else {
            WarmupPhase::Term
        }
    }

    /// True iff a mass-matrix window closes exactly at iteration `i`.
    pub fn is_window_close(&self, i: usize) -> bool {
        self.phase(i) == WarmupPhase::MassWindow && self.window_closes.binary_search(&i).is_ok()
    }
}

/// The composite adaptor: a [`WarmupSchedule`] driving a [`DualAveraging`]
/// step-size adaptor and a [`MassMatrixAdaptor`].
pub struct StanWarmup {
    schedule: WarmupSchedule,
    dual_averaging: DualAveraging,
    mass_matrix: MassMatrixAdaptor,
    metric_kind: MetricKind,
}

/// What the driver should do in response to observing one iteration.
pub struct WarmupUpdate {
    /// The step size to use for the *next* iteration's integrator.
    pub next_epsilon: f64,
    /// `Some(metric)` if a window closed (or warmup finished) and the
    /// Hamiltonian's metric should be rebuilt.
    pub new_metric: Option<Metric>,
}

impl StanWarmup {
    /// Start a new composite warmup adaptor.
    pub fn new(n_adapts: usize, delta: f64, epsilon0: f64, metric_kind: MetricKind, dim: usize) -> Self {
        Self {
            schedule: WarmupSchedule::new(n_adapts),
            dual_averaging: DualAveraging::new(delta, epsilon0),
            mass_matrix: MassMatrixAdaptor::new(metric_kind, dim),
            metric_kind,
        }
    }

    /// Read-only access to the computed window schedule.
    pub fn schedule(&self) -> &WarmupSchedule {
        &self.schedule
    }

    /// Observe one post-transition `(theta, acceptance_stat)` pair at
    /// 1-indexed iteration `i` (`i` must be `<= n_adapts`; the driver should
    /// not call this once warmup is done).
    pub fn observe(&mut self, i: usize, theta: &DVector<f64>, accept_stat: f64, prior_metric: &Metric) -> WarmupUpdate {
        self.dual_averaging.update(accept_stat);

        let phase = self.schedule.phase(i);
        if phase == WarmupPhase::MassWindow {
            self.mass_matrix.push(theta);
        }

        let mut new_metric = None;
        if self.schedule.is_window_close(i) {
            let metric = self.mass_matrix.finalize(prior_metric);
            info!("warmup window closed at iteration {}, rebuilding {:?} metric", i, self.metric_kind);
            self.mass_matrix.reset();
            self.dual_averaging.reset(self.dual_averaging.current_epsilon());
            new_metric = Some(metric);
        }

        if i == self.schedule.n_adapts {
            info!("warmup finished, committing averaged step size");
        }

        WarmupUpdate {
            next_epsilon: self.dual_averaging.current_epsilon(),
            new_metric,
        }
    }

    /// The final, committed step size (`exp(logϵ̄)`), to be used once warmup
    /// has finished.
    pub fn committed_epsilon(&self) -> f64 {
        self.dual_averaging.averaged_epsilon()
    }
}
