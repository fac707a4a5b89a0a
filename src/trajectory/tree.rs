//! Recursive NUTS tree doubling: §4.4 of the design.

use crate::hamiltonian::{Hamiltonian, PhasePoint};
use crate::integrator::Leapfrog;
use crate::metric::Metric;
use crate::termination::{is_divergent, Termination};
use crate::trajectory::sampler::TrajectorySampler;
use nalgebra::DVector;
use rand::Rng;

/// Direction to extend the trajectory in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Backward,
    Forward,
}

impl Direction {
    fn sign(self) -> i64 {
        match self {
            Direction::Backward => -1,
            Direction::Forward => 1,
        }
    }
}

/// One (sub)tree built during NUTS doubling; see `SPEC_FULL.md` §3 "Trajectory
/// state (tree node)".
pub struct TreeNode {
    /// Leftmost (backward-most) endpoint reached.
    pub z_left: PhasePoint,
    /// Rightmost (forward-most) endpoint reached.
    pub z_right: PhasePoint,
    /// The subtree's currently-selected candidate.
    pub z_candidate: PhasePoint,
    /// Accumulated log-weight (`logsumexp(-H_i)` for multinomial, `log(count)` for slice).
    pub log_weight: f64,
    /// Sum of momenta over all leaves in this subtree.
    pub r_sum: DVector<f64>,
    /// Number of leaves (leapfrog evaluations) contributing to this subtree.
    pub n_leaves: u64,
    /// Whether this subtree (or any ancestor merge within it) has terminated,
    /// for either reason below (a no-U-turn stop or an actual divergence).
    pub terminated: bool,
    /// Whether this subtree (or any leaf within it) hit a genuine numerical
    /// divergence, as distinct from an ordinary no-U-turn stop. Never set by
    /// a U-turn merge, only propagated up from `build_leaf`.
    pub divergent: bool,
    /// Sum of `min(1, exp(-delta H))` across leaves, for dual-averaging feedback.
    pub sum_accept_prob: f64,
    /// Number of leapfrog proposals contributing to `sum_accept_prob`.
    pub n_proposals: u64,
}

impl TreeNode {
    fn leaf(z: PhasePoint, log_weight: f64, accept_prob: f64, divergent: bool) -> Self {
        let r_sum = z.r.clone();
        TreeNode {
            z_left: z.clone(),
            z_right: z.clone(),
            z_candidate: z,
            log_weight,
            r_sum,
            n_leaves: 1,
            terminated: divergent,
            divergent,
            sum_accept_prob: accept_prob,
            n_proposals: 1,
        }
    }
}

/// Build a single leaf: one leapfrog step from `z` in direction `dir`.
#[allow(clippy::too_many_arguments)]
fn build_leaf<R: Rng + ?Sized>(
    rng: &mut R,
    h: &Hamiltonian,
    lf: &Leapfrog,
    sampler: &TrajectorySampler,
    z: &PhasePoint,
    dir: Direction,
    initial_energy: f64,
    max_energy_error: f64,
) -> TreeNode {
    let result = lf.step(rng, h, z, dir.sign());
    let z_new = result.z;
    let divergent = result.diverged || is_divergent(initial_energy, &z_new, max_energy_error);
    let energy = z_new.energy();
    let log_weight = if divergent {
        f64::NEG_INFINITY
    } else {
        sampler.leaf_log_weight(energy)
    };
    let accept_prob = (initial_energy - energy).exp();
    let accept_prob = if accept_prob.is_finite() { accept_prob.min(1.0) } else { 0.0 };
    TreeNode::leaf(z_new, log_weight, accept_prob, divergent)
}

/// Recursively build a depth-`depth` subtree starting from `z` in direction
/// `dir`, per the Hoffman & Gelman efficient `BuildTree` recursion: depth-0
/// is a single leapfrog step; depth-`j` builds a depth-`(j-1)` subtree,
/// then (if it has not terminated) extends it by another depth-`(j-1)`
/// subtree from its outer tip, combining via biased progressive sampling.
#[allow(clippy::too_many_arguments)]
pub fn build_tree<R: Rng + ?Sized>(
    rng: &mut R,
    h: &Hamiltonian,
    lf: &Leapfrog,
    term: &Termination,
    sampler: &TrajectorySampler,
    z: &PhasePoint,
    dir: Direction,
    depth: u32,
    initial_energy: f64,
    max_energy_error: f64,
) -> TreeNode {
    if depth == 0 {
        return build_leaf(rng, h, lf, sampler, z, dir, initial_energy, max_energy_error);
    }

    let mut first = build_tree(rng, h, lf, term, sampler, z, dir, depth - 1, initial_energy, max_energy_error);
    if first.terminated {
        return first;
    }

    let extend_from = match dir {
        Direction::Backward => &first.z_left,
        Direction::Forward => &first.z_right,
    };
    let second = build_tree(rng, h, lf, term, sampler, extend_from, dir, depth - 1, initial_energy, max_energy_error);

    let (z_left, z_right) = match dir {
        Direction::Backward => (second.z_left.clone(), first.z_right.clone()),
        Direction::Forward => (first.z_left.clone(), second.z_right.clone()),
    };

    let combined_log_weight = TrajectorySampler::combine_log_weight(first.log_weight, second.log_weight);
    let accept_new = rng.gen::<f64>() < TrajectorySampler::accept_prob(first.log_weight, second.log_weight);
    let z_candidate = if accept_new { second.z_candidate.clone() } else { first.z_candidate.clone() };

    let old_extreme = match dir {
        Direction::Backward => &first.z_right,
        Direction::Forward => &first.z_left,
    };
    let r_sum = &first.r_sum + &second.r_sum;
    let u_turned = term.is_u_turn(&h.metric, &z_left, &z_right, &r_sum)
        || cross_tree_terminated(term, &h.metric, old_extreme, &second);
    let combined_terminated = second.terminated || u_turned;

    first.z_left = z_left;
    first.z_right = z_right;
    first.z_candidate = z_candidate;
    first.log_weight = combined_log_weight;
    first.r_sum = r_sum;
    first.n_leaves += second.n_leaves;
    first.terminated = combined_terminated;
    first.divergent = first.divergent || second.divergent;
    first.sum_accept_prob += second.sum_accept_prob;
    first.n_proposals += second.n_proposals;
    first
}

/// Cross-tree termination check (§4.4 step 4): also terminate if the
/// previously-combined tree's outer extreme and the freshly built
/// subtree's own endpoints, joined via the fresh subtree's own momentum
/// sum, already form a U-turn. This catches reversals that fall entirely
/// within the newly doubled half before the top-level combined check (which
/// uses the *total* `r_sum`) would see them.
pub fn cross_tree_terminated(term: &Termination, metric: &Metric, old_extreme: &PhasePoint, new_subtree: &TreeNode) -> bool {
    term.is_u_turn(metric, old_extreme, &new_subtree.z_left, &new_subtree.r_sum)
        || term.is_u_turn(metric, old_extreme, &new_subtree.z_right, &new_subtree.r_sum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::FnTarget;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn standard_normal() -> FnTarget<impl Fn(&DVector<f64>) -> (f64, DVector<f64>)> {
        FnTarget::new(2, |theta: &DVector<f64>| (-0.5 * theta.dot(theta), -theta.clone()))
    }

    #[test]
    fn depth_zero_is_one_leapfrog_step() {
        let target = standard_normal();
        let h = Hamiltonian::new(Metric::unit(2), &target);
        let z0 = h.phasepoint(DVector::zeros(2), DVector::from_vec(vec![1.0, 0.0]));
        let lf = Leapfrog::Plain { epsilon: 0.1 };
        let term = Termination::Generalized;
        let sampler = TrajectorySampler::Multinomial;
        let mut rng = StdRng::seed_from_u64(0);
        let node = build_tree(&mut rng, &h, &lf, &term, &sampler, &z0, Direction::Forward, 0, z0.energy(), 1000.0);
        assert_eq!(node.n_leaves, 1);
    }

    #[test]
    fn doubling_grows_leaf_count_as_power_of_two() {
        let target = standard_normal();
        let h = Hamiltonian::new(Metric::unit(2), &target);
        let z0 = h.phasepoint(DVector::zeros(2), DVector::from_vec(vec![0.1, 0.0]));
        let lf = Leapfrog::Plain { epsilon: 0.01 };
        let term = Termination::Generalized;
        let sampler = TrajectorySampler::Multinomial;
        let mut rng = StdRng::seed_from_u64(1);
        for depth in 0..4 {
            let node = build_tree(&mut rng, &h, &lf, &term, &sampler, &z0, Direction::Forward, depth, z0.energy(), 1000.0);
            assert!(node.n_leaves <= 1 << depth);
        }
    }
}
