//! Transition kernels: fixed-length, fixed-time, and NUTS tree-doubling.
//!
//! Generalized from the teacher's `SteppingAlg` trait-object dispatch
//! (`steppers::stepper_traits::SteppingAlg`, one impl per move type) to a
//! single closed tagged enum, per the "tagged variants over inheritance"
//! design note.

use crate::hamiltonian::{Hamiltonian, PhasePoint};
use crate::integrator::Leapfrog;
use crate::termination::{is_divergent, Termination};
use crate::trajectory::sampler::TrajectorySampler;
use crate::trajectory::tree::{build_tree, cross_tree_terminated, Direction, TreeNode};
use log::{debug, warn};
use rand::Rng;

/// Result of one kernel transition.
pub struct KernelResult {
    /// The new phase point (unchanged from `z0` on an MH reject).
    pub z: PhasePoint,
    /// Number of leapfrog steps taken.
    pub n_steps: u64,
    /// Whether the proposal was accepted.
    pub is_accept: bool,
    /// Mean `min(1, exp(-delta H))` across leaves/proposals, fed to dual averaging.
    pub acceptance_rate: f64,
    /// Whether a divergence was hit anywhere in the transition.
    pub numerical_error: bool,
    /// Tree depth reached (`0` for the static kernels).
    pub tree_depth: u32,
    /// The (possibly jittered) step size actually used. For the static
    /// kernels this is the single leapfrog call's resolved epsilon; NUTS
    /// resamples jitter per leaf, so this is the integrator's nominal value.
    pub step_size: f64,
}

/// The closed set of transition kernels.
#[derive(Clone, Debug)]
pub enum Kernel {
    /// Integrate forward a fixed number of leapfrog steps, then MH-accept the endpoint.
    StaticTrajectory {
        /// Number of leapfrog steps per transition.
        n_leapfrog: u64,
    },
    /// HMC with dual-averaging-style fixed path length `lambda`; steps
    /// taken is `max(1, round(lambda / epsilon))`.
    HmcDa {
        /// Target path length.
        lambda: f64,
    },
    /// No-U-Turn Sampler: recursive tree doubling up to `max_depth`.
    Nuts {
        /// Maximum doubling depth.
        max_depth: u32,
        /// Termination criterion to use.
        termination: Termination,
        /// Trajectory sampler to use (typically `Multinomial`).
        sampler: TrajectorySampler,
    },
}

impl Kernel {
    /// Run one transition from `z0`, flagging divergence when the energy
    /// error exceeds `max_energy_error`.
    pub fn transition<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        h: &Hamiltonian,
        lf: &Leapfrog,
        z0: &PhasePoint,
        max_energy_error: f64,
    ) -> KernelResult {
        match self {
            Kernel::StaticTrajectory { n_leapfrog } => static_transition(rng, h, lf, z0, *n_leapfrog, max_energy_error),
            Kernel::HmcDa { lambda } => {
                let epsilon = lf.nominal_epsilon();
                let n_leapfrog = ((lambda / epsilon).round() as i64).max(1) as u64;
                static_transition(rng, h, lf, z0, n_leapfrog, max_energy_error)
            }
            Kernel::Nuts { max_depth, termination, sampler } => {
                nuts_transition(rng, h, lf, termination, sampler, z0, *max_depth, max_energy_error)
            }
        }
    }
}

fn static_transition<R: Rng + ?Sized>(
    rng: &mut R,
    h: &Hamiltonian,
    lf: &Leapfrog,
    z0: &PhasePoint,
    n_leapfrog: u64,
    max_energy_error: f64,
) -> KernelResult {
    let initial_energy = z0.energy();
    let result = lf.step(rng, h, z0, n_leapfrog as i64);
    let diverged = result.diverged || is_divergent(initial_energy, &result.z, max_energy_error);
    let final_energy = result.z.energy();
    let delta_h = final_energy - initial_energy;
    let accept_prob = if delta_h.is_finite() { (-delta_h).exp().min(1.0) } else { 0.0 };

    let is_accept = !diverged && rng.gen::<f64>() < accept_prob;
    if diverged {
        warn!("static kernel diverged after {} leapfrog steps", n_leapfrog);
    }
    let z = if is_accept { result.z } else { z0.clone() };

    KernelResult {
        z,
        n_steps: n_leapfrog,
        is_accept,
        acceptance_rate: accept_prob,
        numerical_error: diverged,
        tree_depth: 0,
        step_size: result.epsilon_used,
    }
}

#[allow(clippy::too_many_arguments)]
fn nuts_transition<R: Rng + ?Sized>(
    rng: &mut R,
    h: &Hamiltonian,
    lf: &Leapfrog,
    term: &Termination,
    sampler: &TrajectorySampler,
    z0: &PhasePoint,
    max_depth: u32,
    max_energy_error: f64,
) -> KernelResult {
    let initial_energy = z0.energy();

    let mut tree = TreeNode {
        z_left: z0.clone(),
        z_right: z0.clone(),
        z_candidate: z0.clone(),
        log_weight: sampler.leaf_log_weight(initial_energy),
        r_sum: z0.r.clone(),
        n_leaves: 1,
        terminated: false,
        divergent: false,
        sum_accept_prob: 0.0,
        n_proposals: 0,
    };

    let mut depth = 0u32;

    while depth < max_depth && !tree.terminated {
        let dir = if rng.gen::<bool>() { Direction::Forward } else { Direction::Backward };
        let (extend_from, old_extreme) = match dir {
            Direction::Backward => (&tree.z_left, &tree.z_right),
            Direction::Forward => (&tree.z_right, &tree.z_left),
        };

        let new_subtree = build_tree(rng, h, lf, term, sampler, extend_from, dir, depth, initial_energy, max_energy_error);

        let (z_left, z_right) = match dir {
            Direction::Backward => (new_subtree.z_left.clone(), tree.z_right.clone()),
            Direction::Forward => (tree.z_left.clone(), new_subtree.z_right.clone()),
        };

        let accept_new = !new_subtree.terminated
            && rng.gen::<f64>() < TrajectorySampler::accept_prob(tree.log_weight, new_subtree.log_weight);
        let z_candidate = if accept_new { new_subtree.z_candidate.clone() } else { tree.z_candidate.clone() };

        let combined_log_weight = TrajectorySampler::combine_log_weight(tree.log_weight, new_subtree.log_weight);
        let r_sum = &tree.r_sum + &new_subtree.r_sum;
        let turned = term.is_u_turn(&h.metric, &z_left, &z_right, &r_sum)
            || cross_tree_terminated(term, &h.metric, old_extreme, &new_subtree);

        tree.sum_accept_prob += new_subtree.sum_accept_prob;
        tree.n_proposals += new_subtree.n_proposals;
        tree.z_left = z_left;
        tree.z_right = z_right;
        tree.z_candidate = z_candidate;
        tree.log_weight = combined_log_weight;
        tree.r_sum = r_sum;
        tree.n_leaves += new_subtree.n_leaves;
        tree.divergent = tree.divergent || new_subtree.divergent;
        tree.terminated = new_subtree.terminated || turned;

        depth += 1;
    }

    if depth == max_depth && !tree.terminated {
        debug!("nuts transition hit max_depth={} without terminating", max_depth);
    }

    let acceptance_rate = if tree.n_proposals > 0 {
        tree.sum_accept_prob / tree.n_proposals as f64
    } else {
        0.0
    };

    KernelResult {
        z: tree.z_candidate,
        n_steps: tree.n_leaves,
        is_accept: true,
        acceptance_rate,
        numerical_error: tree.divergent,
        tree_depth: depth,
        step_size: lf.nominal_epsilon(),
    }
}
