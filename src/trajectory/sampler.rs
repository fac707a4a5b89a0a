//! Trajectory sampling strategies used to pick a candidate phase point out of
//! a doubling NUTS tree (or, for `EndPoint`, out of a fixed-length trajectory).

/// Closed set of ways to select a sample from a trajectory's points.
#[derive(Clone, Copy, Debug)]
pub enum TrajectorySampler {
    /// Always take the trajectory's final point (used by the static/HMCDA
    /// kernels in `kernel.rs`, which propose the endpoint and MH-accept it).
    EndPoint,
    /// Original Hoffman & Gelman slice sampler: draw `log_u` once per
    /// trajectory, a leaf counts (log-weight `0`) iff `log_u <= -energy`,
    /// otherwise it is excluded (log-weight `-inf`).
    Slice {
        /// `log(u)` for `u ~ Uniform(0, exp(-H0))`.
        log_u: f64,
    },
    /// Betancourt's generalized multinomial sampler: leaf log-weight is
    /// `-energy`, i.e. `logsumexp(-H_i)` is the running normalizer.
    Multinomial,
}

impl TrajectorySampler {
    /// Log-weight contributed by a single leaf with the given `energy`
    /// (`H_i`). Divergent leaves should be excluded by the caller before
    /// calling this (open question (b): a divergent leaf always contributes
    /// `-inf`, never its raw energy).
    pub fn leaf_log_weight(&self, energy: f64) -> f64 {
        match self {
            TrajectorySampler::EndPoint => 0.0,
            TrajectorySampler::Slice { log_u } => {
                if *log_u <= -energy {
                    0.0
                } else {
                    f64::NEG_INFINITY
                }
            }
            TrajectorySampler::Multinomial => -energy,
        }
    }

    /// Combine two subtrees' accumulated log-weights into one
    /// (`logsumexp`). Both the multinomial `logsumexp(-H_i)` accumulator
    /// and the slice `log(count)` accumulator (since a leaf's weight is
    /// either `0` or `-inf`, repeated `logsumexp` correctly accumulates
    /// `log(number of accepted leaves)`) are special cases of this one
    /// operation.
    pub fn combine_log_weight(a: f64, b: f64) -> f64 {
        logsumexp2(a, b)
    }

    /// Biased progressive-sampling acceptance probability for swapping the
    /// running candidate for a newly built subtree's candidate:
    /// `min(1, w_new / w_old)`, computed in log space.
    pub fn accept_prob(old_log_weight: f64, new_log_weight: f64) -> f64 {
        if old_log_weight == f64::NEG_INFINITY {
            return if new_log_weight == f64::NEG_INFINITY { 0.0 } else { 1.0 };
        }
        (new_log_weight - old_log_weight).exp().min(1.0)
    }
}

fn logsumexp2(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let m = a.max(b);
    m + ((a - m).exp() + (b - m).exp()).ln()
}
