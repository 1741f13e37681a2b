//! Target-domain evaluation with unknown rejection.
//!
//! Prediction is the main head's argmax, overridden to the unknown class
//! whenever the ensemble score falls below the rejection threshold. Scores
//! are normalized over the whole evaluation pass, not per batch, so the
//! threshold compares like against like.

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use tracing::info;

use crate::dataset::{DomainBatcher, DomainItem};
use crate::model::{EnsembleClassifier, ImageClassifier};
use crate::scoring::{
    combined_score, entropy, head_probabilities, marginal_confidence, minmax_normalize,
};
use crate::utils::metrics::{ConfusionMatrix, UniversalMetrics};

/// Per-sample results of one deterministic pass over a dataset.
pub struct ScoredPass {
    pub paths: Vec<String>,
    pub labels: Vec<usize>,
    pub predictions: Vec<usize>,
    /// Ensemble marginal confidence, normalized over the pass
    pub confidence: Vec<f32>,
    /// Ensemble entropy, normalized over the pass
    pub entropy: Vec<f32>,
    /// Combined score in [0, 1]
    pub scores: Vec<f32>,
}

/// Score every sample in order; the final partial batch is kept.
pub fn score_pass<B: Backend>(
    model: &ImageClassifier<B>,
    ensemble: &EnsembleClassifier<B>,
    dataset: &dyn Dataset<DomainItem>,
    batcher: &DomainBatcher<B>,
    batch_size: usize,
) -> ScoredPass {
    let num_classes = model.num_classes();
    let mut paths: Vec<String> = Vec::new();
    let mut labels: Vec<usize> = Vec::new();
    let mut predictions: Vec<usize> = Vec::new();
    let mut all_conf: Vec<f32> = Vec::new();
    let mut all_ent: Vec<f32> = Vec::new();

    let mut index = 0;
    while index < dataset.len() {
        let end = (index + batch_size).min(dataset.len());
        let items: Vec<DomainItem> = (index..end).filter_map(|i| dataset.get(i)).collect();
        index = end;
        if items.is_empty() {
            continue;
        }
        paths.extend(items.iter().map(|item| item.path.clone()));
        let batch = batcher.batch(items);

        let (logits, features) = model.forward(batch.images);
        let argmax: Vec<i64> = logits.argmax(1).into_data().to_vec().unwrap();
        predictions.extend(argmax.into_iter().map(|p| p as usize));
        labels.extend(batch.labels);

        let head_probs = head_probabilities(ensemble.forward_all(features));
        all_conf.extend(marginal_confidence(&head_probs, num_classes));
        all_ent.extend(entropy(&head_probs, num_classes));
    }

    let confidence = minmax_normalize(&all_conf);
    let entropy = minmax_normalize(&all_ent);
    let scores = combined_score(&confidence, &entropy);

    ScoredPass {
        paths,
        labels,
        predictions,
        confidence,
        entropy,
        scores,
    }
}

/// Evaluate on the target domain.
///
/// Ground-truth labels at or above `num_source_classes` are target-private
/// and collapse to the unknown class, indexed `num_source_classes` in the
/// returned confusion matrix.
pub fn validate<B: Backend>(
    model: &ImageClassifier<B>,
    ensemble: &EnsembleClassifier<B>,
    target: &dyn Dataset<DomainItem>,
    batcher: &DomainBatcher<B>,
    batch_size: usize,
    threshold: f32,
    num_common_classes: usize,
) -> (UniversalMetrics, ConfusionMatrix) {
    let num_source_classes = model.num_classes();
    let unknown = num_source_classes;
    let pass = score_pass(model, ensemble, target, batcher, batch_size);

    let mut confmat = ConfusionMatrix::new(num_source_classes + 1);
    for ((&label, &prediction), &score) in
        pass.labels.iter().zip(&pass.predictions).zip(&pass.scores)
    {
        let actual = if label >= num_source_classes {
            unknown
        } else {
            label
        };
        let predicted = if score < threshold { unknown } else { prediction };
        confmat.add(actual, predicted);
    }

    let metrics = UniversalMetrics::from_confusion_matrix(&confmat, num_common_classes);
    info!(
        mean = metrics.mean_accuracy,
        known = metrics.known_accuracy,
        unknown = metrics.unknown_accuracy,
        h_score = metrics.h_score,
        "validation"
    );
    (metrics, confmat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DefaultBackend;
    use crate::dataset::SyntheticDomainDataset;
    use crate::model::lookup_arch;

    fn setup() -> (
        ImageClassifier<DefaultBackend>,
        EnsembleClassifier<DefaultBackend>,
        DomainBatcher<DefaultBackend>,
        SyntheticDomainDataset,
    ) {
        let device = Default::default();
        let config = lookup_arch("cnn16", 4).unwrap();
        let model = ImageClassifier::new(&config, &device);
        let ensemble = EnsembleClassifier::new(model.features_dim(), 4, &device);
        let batcher = DomainBatcher::new(device, 16);
        let target = SyntheticDomainDataset::target(3, 2, 6, 3, 16, 0);
        (model, ensemble, batcher, target)
    }

    #[test]
    fn test_score_pass_covers_every_sample() {
        let (model, ensemble, batcher, target) = setup();
        // batch 4 over 15 samples leaves a partial final batch
        let pass = score_pass(&model, &ensemble, &target, &batcher, 4);
        assert_eq!(pass.labels.len(), target.len());
        assert_eq!(pass.predictions.len(), target.len());
        assert_eq!(pass.scores.len(), target.len());
        assert!(pass.scores.iter().all(|s| (0.0..=1.0).contains(s)));
    }

    #[test]
    fn test_threshold_above_one_rejects_everything() {
        let (model, ensemble, batcher, target) = setup();
        // normalized scores live in [0, 1]; 1.1 is unreachable
        let (metrics, confmat) = validate(&model, &ensemble, &target, &batcher, 4, 1.1, 3);
        for actual in 0..5 {
            for predicted in 0..4 {
                assert_eq!(confmat.get(actual, predicted), 0);
            }
        }
        assert!((metrics.unknown_accuracy - 100.0).abs() < 1e-9);
        assert_eq!(metrics.known_accuracy, 0.0);
        assert_eq!(metrics.h_score, 0.0);
    }

    #[test]
    fn test_confusion_matrix_counts_all_samples() {
        let (model, ensemble, batcher, target) = setup();
        let (_, confmat) = validate(&model, &ensemble, &target, &batcher, 4, 0.5, 3);
        assert_eq!(confmat.total(), target.len());
    }
}
