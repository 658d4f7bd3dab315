//! Aggregation strategies over a drained batch of agent states.
//!
//! Inputs are assumed dimension-checked at submission. Sums are carried in
//! f64 and narrowed to f32 once per dimension.

use rand::Rng;

use crate::privacy::pairwise_masks;
use crate::types::AgentState;

/// Unweighted per-dimension mean.
pub fn fed_avg(batch: &[AgentState], dim: usize) -> Vec<f32> {
    let mut acc = vec![0f64; dim];
    for s in batch { for (i, v) in s.weights.iter().enumerate() { acc[i] += *v as f64; } }
    let n = batch.len().max(1) as f64;
    acc.into_iter().map(|v| (v / n) as f32).collect()
}

/// Mean weighted by `pattern_count`. `None` when the batch carries no patterns.
pub fn weighted_avg(batch: &[AgentState], dim: usize) -> Option<Vec<f32>> {
    let total: u64 = batch.iter().map(|s| s.pattern_count).sum();
    if total == 0 { return None; }
    let mut acc = vec![0f64; dim];
    for s in batch {
        let w = s.pattern_count as f64 / total as f64;
        for (i, v) in s.weights.iter().enumerate() { acc[i] += *v as f64 * w; }
    }
    Some(acc.into_iter().map(|v| v as f32).collect())
}

/// Masks each contributor pairwise, then averages the masked vectors.
/// Only the sum of masked vectors is ever read, so no individual weight
/// vector is observed unmasked.
pub fn secure_avg<R: Rng + ?Sized>(batch: &[AgentState], dim: usize, rng: &mut R) -> Vec<f32> {
    let mut masked: Vec<Vec<f64>> = batch.iter().map(|s| s.weights.iter().map(|v| *v as f64).collect()).collect();
    pairwise_masks(&mut masked, rng);
    let mut acc = vec![0f64; dim];
    for m in &masked { for (i, v) in m.iter().enumerate() { acc[i] += *v; } }
    let n = batch.len().max(1) as f64;
    acc.into_iter().map(|v| (v / n) as f32).collect()
}

/// Population variance across contributors, averaged over dimensions.
pub fn mean_variance(batch: &[AgentState], dim: usize) -> f64 {
    if batch.is_empty() || dim == 0 { return 0.0; }
    let n = batch.len() as f64;
    let mut total = 0.0;
    for i in 0..dim {
        let mean = batch.iter().map(|s| s.weights[i] as f64).sum::<f64>() / n;
        total += batch.iter().map(|s| (s.weights[i] as f64 - mean).powi(2)).sum::<f64>() / n;
    }
    total / dim as f64
}

/// 1 / (1 + sqrt(variance)); 1.0 means all contributors agree exactly.
pub fn convergence_rate(batch: &[AgentState], dim: usize) -> f64 {
    1.0 / (1.0 + mean_variance(batch, dim).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn state(id: &str, weights: Vec<f32>, pattern_count: u64) -> AgentState {
        AgentState { agent_id: id.into(), version: 1, gradients: vec![0.0; weights.len()], weights, pattern_count, timestamp: 0 }
    }

    #[test]
    fn fedavg_is_plain_mean() {
        let batch = vec![state("n1", vec![0.1, 0.2, 0.3], 10), state("n2", vec![0.2, 0.4, 0.6], 30)];
        let out = fed_avg(&batch, 3);
        assert!((out[0] - 0.15).abs() < 1e-6);
        assert!((out[2] - 0.45).abs() < 1e-6);
    }

    #[test]
    fn weighted_uses_pattern_counts() {
        let batch = vec![state("n1", vec![0.1, 0.2, 0.3], 10), state("n2", vec![0.2, 0.4, 0.6], 30)];
        let out = weighted_avg(&batch, 3).unwrap();
        // (0.1*10 + 0.2*30)/40 = 0.175
        assert!((out[0] - 0.175).abs() < 1e-6);
    }

    #[test]
    fn weighted_skips_zero_total() {
        let batch = vec![state("n1", vec![1.0], 0), state("n2", vec![3.0], 0)];
        assert!(weighted_avg(&batch, 1).is_none());
    }

    #[test]
    fn secure_matches_fedavg() {
        let mut rng = StdRng::seed_from_u64(5);
        let batch: Vec<AgentState> = (0..5).map(|i| state(&format!("n{i}"), vec![i as f32, 1.0 - i as f32, 0.5], 1)).collect();
        let plain = fed_avg(&batch, 3);
        let secure = secure_avg(&batch, 3, &mut rng);
        for (a, b) in plain.iter().zip(secure.iter()) { assert!((a - b).abs() < 1e-5); }
    }

    #[test]
    fn convergence_is_one_for_identical_weights() {
        let batch = vec![state("n1", vec![0.5, 0.5], 1), state("n2", vec![0.5, 0.5], 1)];
        assert!((convergence_rate(&batch, 2) - 1.0).abs() < 1e-12);
        let spread = vec![state("n1", vec![0.0, 0.0], 1), state("n2", vec![2.0, 2.0], 1)];
        // variance 1.0 in every dimension
        assert!((convergence_rate(&spread, 2) - 0.5).abs() < 1e-12);
    }
}
