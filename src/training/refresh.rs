//! Auxiliary-head refresh against frozen backbone features.
//!
//! After every adversarial epoch each head is retrained for half an epoch
//! on its own perturbed source view, so the disagreement signal keeps
//! tracking the evolving feature space. The backbone only provides
//! features; its parameters are not stepped.

use burn::nn::loss::CrossEntropyLossConfig;
use burn::optim::{GradientsParams, Optimizer};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use tracing::{debug, info};

use crate::dataset::ForeverBatchIter;
use crate::model::{EnsembleClassifier, ImageClassifier};
use crate::utils::metrics::RunningAverage;
use crate::ENSEMBLE_SIZE;

use super::scheduler::InverseDecaySchedule;

/// Fit every auxiliary head on its perturbed view for `iters` iterations.
pub fn refresh_ensemble<B, O>(
    model: &ImageClassifier<B>,
    mut ensemble: EnsembleClassifier<B>,
    optimizer: &mut O,
    ens_sources: &mut [ForeverBatchIter<B>; ENSEMBLE_SIZE],
    schedule: &mut InverseDecaySchedule,
    iters: usize,
) -> EnsembleClassifier<B>
where
    B: AutodiffBackend,
    O: Optimizer<EnsembleClassifier<B>, B>,
{
    for (head, source) in ens_sources.iter_mut().enumerate() {
        let mut avg_loss = RunningAverage::new();

        for _ in 0..iters {
            let lr = schedule.next_lr();
            let batch = source.next_batch();
            let device = batch.images.device();

            // gradients must not reach the backbone
            let (_, features) = model.forward(batch.images);
            let features = features.detach();

            let logits = ensemble.forward_head(features, head);
            let loss = CrossEntropyLossConfig::new()
                .init(&device)
                .forward(logits, batch.targets);
            avg_loss.add(loss.clone().into_scalar().elem::<f32>() as f64);

            let grads = GradientsParams::from_grads(loss.backward(), &ensemble);
            ensemble = optimizer.step(lr, ensemble, grads);
        }
        debug!(head, avg_loss = avg_loss.average(), "head refreshed");
    }

    info!(iters_per_head = iters, "ensemble refreshed");
    ensemble
}
