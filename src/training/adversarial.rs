//! Weighted domain-adversarial training.
//!
//! Each iteration pairs a source batch with a target batch. Source samples
//! are weighted by the class mask from [`super::class_weight`]; target
//! samples are weighted by their ensemble score, normalized through the
//! running bounds so the threshold stays meaningful as scores drift.

use burn::nn::loss::CrossEntropyLossConfig;
use burn::optim::{GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use tracing::info;

use crate::dataset::ForeverBatchIter;
use crate::model::{DomainAdversarialLoss, DomainDiscriminator, EnsembleClassifier, ImageClassifier};
use crate::scoring::{
    combined_score, entropy, head_probabilities, marginal_confidence, RunningBounds,
};
use crate::utils::metrics::RunningAverage;

use super::scheduler::InverseDecaySchedule;

/// Averages over one adversarial epoch.
#[derive(Clone, Copy, Debug)]
pub struct EpochStats {
    pub cls_loss: f32,
    pub transfer_loss: f32,
    pub discriminator_loss: f32,
    pub domain_accuracy: f64,
}

/// Run one epoch of the min-max game.
///
/// The classifier is stepped on `cls_loss + trade_off * transfer_loss`; the
/// discriminator is stepped on its own loss over detached features. Both
/// share the inverse-decay learning rate, advanced once per iteration.
#[allow(clippy::too_many_arguments)]
pub fn train_adversarial_epoch<B, OM, OD>(
    mut model: ImageClassifier<B>,
    mut domain_adv: DomainAdversarialLoss<B>,
    ensemble: &EnsembleClassifier<B>,
    model_optimizer: &mut OM,
    disc_optimizer: &mut OD,
    source: &mut ForeverBatchIter<B>,
    target: &mut ForeverBatchIter<B>,
    source_class_weight: &[f32],
    bounds: &mut RunningBounds,
    schedule: &mut InverseDecaySchedule,
    trade_off: f32,
    iters_per_epoch: usize,
    print_freq: usize,
    epoch: usize,
) -> (ImageClassifier<B>, DomainAdversarialLoss<B>, EpochStats)
where
    B: AutodiffBackend,
    OM: Optimizer<ImageClassifier<B>, B>,
    OD: Optimizer<DomainDiscriminator<B>, B>,
{
    let num_classes = model.num_classes();
    let mut avg_cls = RunningAverage::new();
    let mut avg_transfer = RunningAverage::new();
    let mut avg_disc = RunningAverage::new();
    let mut avg_acc = RunningAverage::new();

    for iter in 0..iters_per_epoch {
        let lr = schedule.next_lr();
        let batch_s = source.next_batch();
        let batch_t = target.next_batch();
        let device = batch_s.images.device();

        let (y_s, f_s) = model.forward(batch_s.images);
        let (_, f_t) = model.forward(batch_t.images);

        // target weights from the ensemble, used as constants
        let head_probs = head_probabilities(ensemble.forward_all(f_t.clone().detach()));
        let conf = marginal_confidence(&head_probs, num_classes);
        let ent = entropy(&head_probs, num_classes);
        let scores = combined_score(&conf, &ent);
        let w_t = bounds.update_and_normalize(&scores);

        let w_s: Vec<f32> = batch_s
            .labels
            .iter()
            .map(|&label| source_class_weight.get(label).copied().unwrap_or(1.0))
            .collect();

        let batch_size_t = w_t.len();
        let batch_size_s = w_s.len();
        let w_t = Tensor::<B, 1>::from_floats(TensorData::new(w_t, [batch_size_t]), &device);
        let w_s = Tensor::<B, 1>::from_floats(TensorData::new(w_s, [batch_size_s]), &device);

        let cls_loss = CrossEntropyLossConfig::new()
            .init(&device)
            .forward(y_s, batch_s.targets);
        let losses = domain_adv.forward(f_s, f_t, w_s, w_t);
        let total = cls_loss.clone() + losses.transfer_loss.clone() * trade_off;

        avg_cls.add(cls_loss.into_scalar().elem::<f32>() as f64);
        avg_transfer.add(losses.transfer_loss.clone().into_scalar().elem::<f32>() as f64);
        avg_disc.add(
            losses
                .discriminator_loss
                .clone()
                .into_scalar()
                .elem::<f32>() as f64,
        );
        avg_acc.add(domain_adv.domain_accuracy);

        let grads = GradientsParams::from_grads(total.backward(), &model);
        model = model_optimizer.step(lr, model, grads);

        let grads_d =
            GradientsParams::from_grads(losses.discriminator_loss.backward(), &domain_adv.discriminator);
        domain_adv.discriminator = disc_optimizer.step(lr, domain_adv.discriminator.clone(), grads_d);

        if print_freq > 0 && iter % print_freq == 0 {
            info!(
                epoch,
                iter,
                lr,
                cls_loss = avg_cls.average(),
                transfer_loss = avg_transfer.average(),
                domain_acc = avg_acc.average(),
                "adversarial"
            );
        }
    }

    let stats = EpochStats {
        cls_loss: avg_cls.average() as f32,
        transfer_loss: avg_transfer.average() as f32,
        discriminator_loss: avg_disc.average() as f32,
        domain_accuracy: avg_acc.average(),
    };
    (model, domain_adv, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::TrainingBackend;
    use crate::dataset::{DomainBatcher, SyntheticDomainDataset};
    use crate::model::lookup_arch;
    use burn::optim::SgdConfig;
    use std::sync::Arc;

    #[test]
    fn test_one_epoch_produces_finite_stats() {
        let device = Default::default();
        let config = lookup_arch("cnn16", 3).unwrap();
        let model = ImageClassifier::<TrainingBackend>::new(&config, &device);
        let ensemble =
            EnsembleClassifier::<TrainingBackend>::new(model.features_dim(), 3, &device);
        let domain_adv = DomainAdversarialLoss::new(DomainDiscriminator::new(
            model.features_dim(),
            32,
            &device,
        ));

        let batcher = DomainBatcher::new(device, 16);
        let mut source = ForeverBatchIter::new(
            Arc::new(SyntheticDomainDataset::source(3, 4, 16, 0)),
            batcher.clone(),
            4,
            0,
        );
        let mut target = ForeverBatchIter::new(
            Arc::new(SyntheticDomainDataset::target(3, 2, 6, 4, 16, 1)),
            batcher,
            4,
            1,
        );

        let mut model_opt = SgdConfig::new().init();
        let mut disc_opt = SgdConfig::new().init();
        let mut bounds = RunningBounds::new();
        let mut schedule = InverseDecaySchedule::new(0.01, 0.001, 0.75);

        let (_, _, stats) = train_adversarial_epoch(
            model,
            domain_adv,
            &ensemble,
            &mut model_opt,
            &mut disc_opt,
            &mut source,
            &mut target,
            &[1.0, 1.0, 0.0],
            &mut bounds,
            &mut schedule,
            1.0,
            2,
            0,
            0,
        );

        assert!(stats.cls_loss.is_finite());
        assert!(stats.transfer_loss.is_finite());
        assert!(stats.discriminator_loss.is_finite());
        assert!((0.0..=100.0).contains(&stats.domain_accuracy));
        assert_eq!(schedule.step_count(), 2);
    }
}
