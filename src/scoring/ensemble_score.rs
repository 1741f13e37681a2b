//! Ensemble uncertainty scores.
//!
//! Given the five ensemble heads' probability distributions for a batch,
//! two per-sample statistics are computed:
//!
//! - **marginal confidence**: the gap between each head's top-1 and top-2
//!   probabilities, averaged over the five heads (higher = more known-like)
//! - **entropy**: the Shannon entropy of each head's distribution, averaged
//!   over the five heads (higher = more unknown-like)
//!
//! The combined "known-ness" score is `(confidence + 1 - entropy) / 2`,
//! where both statistics are normalized by the caller: statically over a
//! full pass, or through running bounds inside the adversarial loop.

use burn::tensor::{activation::softmax, backend::Backend, Tensor};

use crate::ENSEMBLE_SIZE;

/// Per-sample marginal confidence over exactly five probability
/// distributions, each a flat row-major `[batch, num_classes]` slice.
pub fn marginal_confidence(heads: &[Vec<f32>; ENSEMBLE_SIZE], num_classes: usize) -> Vec<f32> {
    let batch = heads[0].len() / num_classes;
    let mut scores = vec![0.0f32; batch];

    for head in heads {
        for (i, row) in head.chunks(num_classes).enumerate() {
            let (top1, top2) = top_two(row);
            scores[i] += (top1 - top2) / ENSEMBLE_SIZE as f32;
        }
    }
    scores
}

/// Per-sample Shannon entropy (natural log) averaged over the five heads.
pub fn entropy(heads: &[Vec<f32>; ENSEMBLE_SIZE], num_classes: usize) -> Vec<f32> {
    let batch = heads[0].len() / num_classes;
    let mut scores = vec![0.0f32; batch];

    for head in heads {
        for (i, row) in head.chunks(num_classes).enumerate() {
            let h: f32 = row
                .iter()
                .map(|&p| if p > 0.0 { -p * p.ln() } else { 0.0 })
                .sum();
            scores[i] += h / ENSEMBLE_SIZE as f32;
        }
    }
    scores
}

/// Combine confidence and entropy into the per-sample known-ness score
/// `(confidence + 1 - entropy) / 2`. The inputs are expected to be
/// normalized (or deliberately raw, inside the running-bound loop).
pub fn combined_score(confidence: &[f32], entropy: &[f32]) -> Vec<f32> {
    confidence
        .iter()
        .zip(entropy.iter())
        .map(|(&c, &e)| (c + 1.0 - e) / 2.0)
        .collect()
}

/// Softmax the five heads' logits and pull them onto the host as flat
/// row-major probability vectors, discarding the autodiff graph.
pub fn head_probabilities<B: Backend>(
    logits: [Tensor<B, 2>; ENSEMBLE_SIZE],
) -> [Vec<f32>; ENSEMBLE_SIZE] {
    logits.map(|y| {
        softmax(y, 1)
            .into_data()
            .to_vec()
            .expect("ensemble output should convert to f32")
    })
}

fn top_two(row: &[f32]) -> (f32, f32) {
    let mut top1 = f32::NEG_INFINITY;
    let mut top2 = f32::NEG_INFINITY;
    for &p in row {
        if p > top1 {
            top2 = top1;
            top1 = p;
        } else if p > top2 {
            top2 = p;
        }
    }
    (top1, top2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_heads(batch: usize, num_classes: usize) -> [Vec<f32>; ENSEMBLE_SIZE] {
        let row = vec![1.0 / num_classes as f32; num_classes];
        let head: Vec<f32> = row
            .iter()
            .cycle()
            .take(batch * num_classes)
            .cloned()
            .collect();
        [
            head.clone(),
            head.clone(),
            head.clone(),
            head.clone(),
            head,
        ]
    }

    fn peaked_heads(batch: usize, num_classes: usize) -> [Vec<f32>; ENSEMBLE_SIZE] {
        let mut row = vec![0.0f32; num_classes];
        row[0] = 1.0;
        let head: Vec<f32> = row
            .iter()
            .cycle()
            .take(batch * num_classes)
            .cloned()
            .collect();
        [
            head.clone(),
            head.clone(),
            head.clone(),
            head.clone(),
            head,
        ]
    }

    #[test]
    fn test_confidence_bounds() {
        let heads = peaked_heads(3, 4);
        let conf = marginal_confidence(&heads, 4);
        for c in &conf {
            assert!(*c >= 0.0 && *c <= 1.0);
        }
        // one-hot distributions have the maximal top1-top2 gap
        assert!((conf[0] - 1.0).abs() < 1e-6);

        let heads = uniform_heads(3, 4);
        let conf = marginal_confidence(&heads, 4);
        assert!((conf[0] - 0.0).abs() < 1e-6);
    }

    #[test]
    fn test_entropy_bounds() {
        let num_classes = 4;
        let heads = uniform_heads(2, num_classes);
        let ent = entropy(&heads, num_classes);
        let max_entropy = (num_classes as f32).ln();
        for h in &ent {
            assert!(*h >= 0.0 && *h <= max_entropy + 1e-6);
        }
        // uniform distribution attains the maximum entropy
        assert!((ent[0] - max_entropy).abs() < 1e-5);

        let heads = peaked_heads(2, num_classes);
        let ent = entropy(&heads, num_classes);
        assert!((ent[0] - 0.0).abs() < 1e-6);
    }

    #[test]
    fn test_combined_score() {
        let scores = combined_score(&[1.0, 0.0], &[0.0, 1.0]);
        assert!((scores[0] - 1.0).abs() < 1e-6);
        assert!((scores[1] - 0.0).abs() < 1e-6);
    }

    #[test]
    fn test_disagreeing_heads_average() {
        // four confident heads, one uniform head: confidence averages to 4/5
        let num_classes = 2;
        let confident = vec![1.0f32, 0.0];
        let uniform = vec![0.5f32, 0.5];
        let heads = [
            confident.clone(),
            confident.clone(),
            confident.clone(),
            confident,
            uniform,
        ];
        let conf = marginal_confidence(&heads, num_classes);
        assert!((conf[0] - 0.8).abs() < 1e-6);
    }
}
