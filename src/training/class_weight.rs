//! Source class weighting from ensemble scores on the target domain.
//!
//! Target samples the ensemble is confident about are probably from shared
//! classes. Averaging the main head's softmax over those samples and
//! thresholding yields a binary mask over source classes: classes that never
//! show up confidently in the target are treated as source-private and
//! excluded from alignment.

use burn::data::dataset::Dataset;
use burn::prelude::*;
use burn::tensor::activation::softmax;
use tracing::{info, warn};

use crate::dataset::{DomainBatcher, DomainItem};
use crate::model::{EnsembleClassifier, ImageClassifier};
use crate::scoring::{combined_score, entropy, head_probabilities, marginal_confidence, minmax_normalize};
use burn::data::dataloader::batcher::Batcher;

/// Compute the per-class weight mask over the source label set.
///
/// Runs one deterministic pass over the target data (partial final batch
/// included), scores every sample with the ensemble, and averages the main
/// head's softmax over samples scoring at least `src_threshold`. The
/// average is min-max normalized over classes and binarized at `cut`; ties
/// at the cut go to zero. If no sample clears the threshold the mask falls
/// back to all ones.
pub fn compute_source_class_weight<B: Backend>(
    model: &ImageClassifier<B>,
    ensemble: &EnsembleClassifier<B>,
    target: &dyn Dataset<DomainItem>,
    batcher: &DomainBatcher<B>,
    batch_size: usize,
    src_threshold: f32,
    cut: f32,
) -> Vec<f32> {
    let num_classes = model.num_classes();
    let mut all_probs: Vec<f32> = Vec::new();
    let mut all_conf: Vec<f32> = Vec::new();
    let mut all_ent: Vec<f32> = Vec::new();

    let mut index = 0;
    while index < target.len() {
        let end = (index + batch_size).min(target.len());
        let items: Vec<DomainItem> = (index..end).filter_map(|i| target.get(i)).collect();
        index = end;
        if items.is_empty() {
            continue;
        }
        let batch = batcher.batch(items);

        let (logits, features) = model.forward(batch.images);
        let probs: Vec<f32> = softmax(logits, 1).into_data().to_vec().unwrap();
        all_probs.extend(probs);

        let head_probs = head_probabilities(ensemble.forward_all(features));
        all_conf.extend(marginal_confidence(&head_probs, num_classes));
        all_ent.extend(entropy(&head_probs, num_classes));
    }

    let conf = minmax_normalize(&all_conf);
    let ent = minmax_normalize(&all_ent);
    let scores = combined_score(&conf, &ent);

    let Some(weight) = confident_mean(&scores, &all_probs, num_classes, src_threshold) else {
        warn!(src_threshold, "no confident target samples, keeping all source classes");
        return vec![1.0; num_classes];
    };
    let mask = binarize(&weight, cut);

    info!(
        total = scores.len(),
        kept_classes = mask.iter().filter(|&&w| w > 0.0).count(),
        "source class weight computed"
    );
    mask
}

/// Column-mean of the probability rows whose score clears `src_threshold`,
/// min-max normalized over classes so the weakest class maps to zero.
/// `None` if nothing is selected.
fn confident_mean(
    scores: &[f32],
    probs: &[f32],
    num_classes: usize,
    src_threshold: f32,
) -> Option<Vec<f32>> {
    let mut sums = vec![0.0f32; num_classes];
    let mut selected = 0usize;
    for (sample, &score) in scores.iter().enumerate() {
        if score >= src_threshold {
            selected += 1;
            let row = &probs[sample * num_classes..(sample + 1) * num_classes];
            for (sum, &p) in sums.iter_mut().zip(row) {
                *sum += p;
            }
        }
    }
    if selected == 0 {
        return None;
    }

    let mean: Vec<f32> = sums.iter().map(|s| s / selected as f32).collect();
    Some(minmax_normalize(&mean))
}

/// Binarize at `cut`; a weight exactly at the cut goes to zero.
fn binarize(weight: &[f32], cut: f32) -> Vec<f32> {
    weight
        .iter()
        .map(|&w| if w > cut { 1.0 } else { 0.0 })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DefaultBackend;
    use crate::dataset::SyntheticDomainDataset;
    use crate::model::lookup_arch;

    #[test]
    fn test_confident_mean_selects_exact_rows() {
        // 10 samples over 3 classes, exactly three score at or above 0.5
        let scores = [0.1, 0.9, 0.2, 0.3, 0.6, 0.1, 0.0, 0.5, 0.4, 0.2];
        let mut probs = vec![1.0f32 / 3.0; 30];
        for sample in [1usize, 4, 7] {
            probs[sample * 3] = 0.5;
            probs[sample * 3 + 1] = 0.3;
            probs[sample * 3 + 2] = 0.2;
        }

        let weight = confident_mean(&scores, &probs, 3, 0.5).unwrap();
        // column means are (0.5, 0.3, 0.2); min-max gives (1, 1/3, 0)
        assert!((weight[0] - 1.0).abs() < 1e-6);
        assert!((weight[1] - 1.0 / 3.0).abs() < 1e-6);
        assert!((weight[2] - 0.0).abs() < 1e-6);
    }

    #[test]
    fn test_weakest_class_is_always_cut() {
        // the min-maxed weakest class is exactly zero, below any cut
        let scores = [1.0, 1.0];
        let probs = vec![0.7, 0.2, 0.1, 0.5, 0.4, 0.1];
        let weight = confident_mean(&scores, &probs, 3, 0.5).unwrap();
        assert_eq!(weight[2], 0.0);
        let mask = binarize(&weight, 0.1);
        assert_eq!(mask[2], 0.0);
    }

    #[test]
    fn test_confident_mean_empty_selection() {
        let scores = [0.1, 0.2];
        let probs = vec![0.5f32; 4];
        assert!(confident_mean(&scores, &probs, 2, 0.9).is_none());
    }

    #[test]
    fn test_binarize_ties_go_to_zero() {
        let mask = binarize(&[0.05, 0.1, 0.11, 1.0], 0.1);
        assert_eq!(mask, vec![0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_weight_is_binary_and_sized() {
        let device = Default::default();
        let config = lookup_arch("cnn16", 3).unwrap();
        let model = ImageClassifier::<DefaultBackend>::new(&config, &device);
        let ensemble = EnsembleClassifier::<DefaultBackend>::new(model.features_dim(), 3, &device);
        let batcher = DomainBatcher::new(device, 16);

        let target = SyntheticDomainDataset::target(3, 2, 6, 2, 16, 0);
        let weight =
            compute_source_class_weight(&model, &ensemble, &target, &batcher, 4, 0.0, 0.1);

        assert_eq!(weight.len(), 3);
        assert!(weight.iter().all(|&w| w == 0.0 || w == 1.0));
        // threshold zero selects everything, so at least one class survives
        assert!(weight.iter().any(|&w| w == 1.0));
    }

    #[test]
    fn test_impossible_threshold_falls_back_to_ones() {
        let device = Default::default();
        let config = lookup_arch("cnn16", 3).unwrap();
        let model = ImageClassifier::<DefaultBackend>::new(&config, &device);
        let ensemble = EnsembleClassifier::<DefaultBackend>::new(model.features_dim(), 3, &device);
        let batcher = DomainBatcher::new(device, 16);

        let target = SyntheticDomainDataset::target(3, 2, 6, 2, 16, 0);
        let weight =
            compute_source_class_weight(&model, &ensemble, &target, &batcher, 4, 2.0, 0.1);
        assert_eq!(weight, vec![1.0; 3]);
    }
}
