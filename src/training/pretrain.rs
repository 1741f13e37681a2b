//! Joint source-only pretraining.
//!
//! Each iteration draws one clean source batch for the main head and five
//! independently shuffled perturbed batches, one per auxiliary head. The
//! six cross-entropy losses are summed and backpropagated together, so the
//! backbone learns from every view while each head only sees its own.

use burn::nn::loss::CrossEntropyLossConfig;
use burn::optim::{GradientsParams, Optimizer};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use tracing::info;

use crate::dataset::ForeverBatchIter;
use crate::model::{EnsembleClassifier, ImageClassifier};
use crate::utils::metrics::RunningAverage;
use crate::ENSEMBLE_SIZE;

use super::scheduler::InverseDecaySchedule;

/// Train the classifier and all auxiliary heads on source batches.
///
/// Returns the updated modules and the per-epoch average of the summed loss.
#[allow(clippy::too_many_arguments)]
pub fn pretrain<B, OM, OE>(
    mut model: ImageClassifier<B>,
    mut ensemble: EnsembleClassifier<B>,
    model_optimizer: &mut OM,
    ens_optimizer: &mut OE,
    source: &mut ForeverBatchIter<B>,
    ens_sources: &mut [ForeverBatchIter<B>; ENSEMBLE_SIZE],
    schedule: &mut InverseDecaySchedule,
    epochs: usize,
    iters_per_epoch: usize,
    print_freq: usize,
) -> (ImageClassifier<B>, EnsembleClassifier<B>, Vec<f32>)
where
    B: AutodiffBackend,
    OM: Optimizer<ImageClassifier<B>, B>,
    OE: Optimizer<EnsembleClassifier<B>, B>,
{
    let mut epoch_losses = Vec::with_capacity(epochs);

    for epoch in 0..epochs {
        let mut avg_loss = RunningAverage::new();

        for iter in 0..iters_per_epoch {
            let lr = schedule.next_lr();
            let batch = source.next_batch();
            let device = batch.images.device();
            let criterion = CrossEntropyLossConfig::new().init(&device);

            let (y_s, _) = model.forward(batch.images);
            let mut total = criterion.forward(y_s, batch.targets);

            for (head, ens_source) in ens_sources.iter_mut().enumerate() {
                let batch = ens_source.next_batch();
                let (_, f_s) = model.forward(batch.images);
                let y_s = ensemble.forward_head(f_s, head);
                total = total + criterion.forward(y_s, batch.targets);
            }

            let loss_value = total.clone().into_scalar().elem::<f32>();
            avg_loss.add(loss_value as f64);

            let mut grads = total.backward();
            let model_grads = GradientsParams::from_module(&mut grads, &model);
            let ens_grads = GradientsParams::from_module(&mut grads, &ensemble);
            model = model_optimizer.step(lr, model, model_grads);
            ensemble = ens_optimizer.step(lr, ensemble, ens_grads);

            if print_freq > 0 && iter % print_freq == 0 {
                info!(epoch, iter, lr, loss = loss_value, "pretrain");
            }
        }

        info!(epoch, avg_loss = avg_loss.average(), "pretrain epoch done");
        epoch_losses.push(avg_loss.average() as f32);
    }

    (model, ensemble, epoch_losses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::TrainingBackend;
    use crate::dataset::{DomainBatcher, PerturbView, PerturbedDataset, SyntheticDomainDataset};
    use crate::model::lookup_arch;
    use burn::data::dataset::Dataset;
    use burn::optim::SgdConfig;
    use std::sync::Arc;

    #[test]
    fn test_pretrain_steps_both_modules() {
        let device = Default::default();
        let config = lookup_arch("cnn16", 3).unwrap();
        let model = ImageClassifier::<TrainingBackend>::new(&config, &device);
        let ensemble =
            EnsembleClassifier::<TrainingBackend>::new(model.features_dim(), 3, &device);

        let dataset: Arc<dyn Dataset<crate::dataset::DomainItem>> =
            Arc::new(SyntheticDomainDataset::source(3, 4, 16, 0));
        let batcher = DomainBatcher::<TrainingBackend>::new(device, 16);
        let mut source = ForeverBatchIter::new(dataset.clone(), batcher.clone(), 4, 0);
        let mut ens_sources = PerturbView::all().map(|view| {
            let perturbed: Arc<dyn Dataset<crate::dataset::DomainItem>> =
                Arc::new(PerturbedDataset::new(dataset.clone(), view, 16, 0));
            ForeverBatchIter::new(perturbed, batcher.clone(), 4, view.index() as u64)
        });

        let mut model_opt = SgdConfig::new().init();
        let mut ens_opt = SgdConfig::new().init();
        let mut schedule = InverseDecaySchedule::new(0.01, 0.001, 0.75);

        let (_, _, losses) = pretrain(
            model,
            ensemble,
            &mut model_opt,
            &mut ens_opt,
            &mut source,
            &mut ens_sources,
            &mut schedule,
            1,
            2,
            0,
        );
        assert_eq!(losses.len(), 1);
        assert!(losses[0].is_finite());
        assert_eq!(schedule.step_count(), 2);
    }
}
