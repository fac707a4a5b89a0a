//! Convergence diagnostics across multiple chains.

use crate::adaptors::welford::VarEstimator;
use itertools::Itertools;
use nalgebra::DVector;

/// Gelman-Rubin potential scale reduction statistic (R̂), computed after
/// splitting each chain in half, for a single coordinate's trace across
/// chains.
///
/// Generalized from the teacher's `diagnostics::rhat::rhat` (which took one
/// scalar trace per chain) by first splitting each chain in half, matching
/// the "split-R̂" variant used for multi-dimensional posteriors.
pub fn split_rhat(chains: &[Vec<f64>]) -> f64 {
    let split: Vec<Vec<f64>> = chains
        .iter()
        .flat_map(|chain| {
            let half = chain.len() / 2;
            vec![chain[..half].to_vec(), chain[half..2 * half].to_vec()]
        })
        .collect();
    rhat(split)
}

/// Split-R̂ for every coordinate of a `D`-dimensional chain set.
pub fn split_rhat_vector(chains: &[Vec<DVector<f64>>]) -> DVector<f64> {
    let dim = chains[0][0].len();
    DVector::from_iterator(
        dim,
        (0..dim).map(|d| {
            let traces: Vec<Vec<f64>> = chains.iter().map(|chain| chain.iter().map(|theta| theta[d]).collect()).collect();
            split_rhat(&traces)
        }),
    )
}

/// The Gelman-Rubin R̂ over `vals`, one trace per chain. All traces must have
/// equal length.
fn rhat(vals: Vec<Vec<f64>>) -> f64 {
    let distinct_lengths: Vec<usize> = vals.iter().map(|x| x.len()).sorted().dedup().collect();
    assert_eq!(distinct_lengths.len(), 1, "unequal chain sizes, cannot calculate rhat");

    let m = vals.len() as f64;
    let n = distinct_lengths[0] as f64;

    let chain_var = |x: &[f64]| -> f64 {
        let points: Vec<DVector<f64>> = x.iter().map(|&v| DVector::from_vec(vec![v])).collect();
        VarEstimator::naive(&points)[0]
    };

    let chain_means: Vec<f64> = vals.iter().map(|x| x.iter().sum::<f64>() / n).collect();
    let w = vals.iter().map(|x| chain_var(x)).sum::<f64>() / m;
    let theta_bar_bar = chain_means.iter().sum::<f64>() / m;
    let b = n * chain_means.iter().map(|mean| (mean - theta_bar_bar).powi(2)).sum::<f64>() / (m - 1.0);
    let var_hat_theta = (1.0 - 1.0 / n) * w + b / n;
    (var_hat_theta / w).sqrt()
}
