//! Full training, test, and analysis drivers.
//!
//! `run_training` executes the three stages end to end: source pretraining,
//! ensemble-based class weighting, and the weighted adversarial loop with
//! periodic ensemble refresh. Checkpoints go to the output directory as
//! `latest_*` every epoch and `best_*` whenever the H-score improves.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use burn::data::dataset::Dataset;
use burn::module::{AutodiffModule, Module};
use burn::optim::momentum::MomentumConfig;
use burn::optim::{decay::WeightDecayConfig, SgdConfig};
use burn::record::CompactRecorder;
use tracing::{info, warn};

use crate::backend::{default_device, DefaultBackend, TrainingBackend};
use crate::dataset::{
    lookup_dataset, DatasetSpec, DomainBatcher, DomainItem, ForeverBatchIter, ImageFolderDataset,
    PerturbView, PerturbedDataset, SyntheticDomainDataset,
};
use crate::model::{
    lookup_arch, DomainAdversarialLoss, DomainDiscriminator, EnsembleClassifier, ImageClassifier,
    ModelConfig, TrainingConfig, UniversalConfig,
};
use crate::scoring::RunningBounds;
use crate::training::{
    adversarial::train_adversarial_epoch, class_weight::compute_source_class_weight,
    evaluate::score_pass, evaluate::validate, pretrain::pretrain, refresh::refresh_ensemble,
    scheduler::InverseDecaySchedule,
};
use crate::utils::error::{Result, UdaError};
use crate::utils::metrics::UniversalMetrics;

const DISCRIMINATOR_HIDDEN: usize = 1024;
const SYNTHETIC_SAMPLES_PER_CLASS: usize = 16;

/// Everything needed to run one source-to-target task.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Dataset name, see `dataset::dataset_names`
    pub dataset: String,
    /// Source domain within the dataset
    pub source: String,
    /// Target domain within the dataset
    pub target: String,
    /// Root directory with `<domain>/<class>/<image>` trees; unused for the
    /// synthetic dataset
    pub data_root: Option<PathBuf>,
    /// Directory for checkpoints and run artifacts
    pub output_dir: PathBuf,
    pub model: ModelConfig,
    pub training: TrainingConfig,
    pub universal: UniversalConfig,
}

impl RunConfig {
    fn validate(&self) -> Result<&'static DatasetSpec> {
        self.training.validate()?;
        self.universal.validate()?;
        let spec = lookup_dataset(&self.dataset)?;
        spec.validate_domain(&self.source)?;
        spec.validate_domain(&self.target)?;
        if self.source == self.target {
            return Err(UdaError::Config(
                "source and target domains must differ".into(),
            ));
        }
        Ok(spec)
    }
}

fn build_datasets(
    config: &RunConfig,
    spec: &DatasetSpec,
    seed: u64,
) -> Result<(Arc<dyn Dataset<DomainItem>>, Arc<dyn Dataset<DomainItem>>)> {
    let size = config.model.input_size;
    if spec.name == "Synthetic" {
        let target_private =
            spec.num_total_classes - spec.num_common_classes - spec.num_source_private;
        let source = SyntheticDomainDataset::source(
            spec.num_source_classes(),
            SYNTHETIC_SAMPLES_PER_CLASS,
            size,
            seed,
        );
        let target = SyntheticDomainDataset::target(
            spec.num_common_classes,
            target_private,
            spec.num_total_classes,
            SYNTHETIC_SAMPLES_PER_CLASS,
            size,
            seed.wrapping_add(1),
        );
        return Ok((Arc::new(source), Arc::new(target)));
    }

    let root = config.data_root.as_deref().ok_or_else(|| {
        UdaError::Config(format!("dataset {} requires --data-root", spec.name))
    })?;
    let source = ImageFolderDataset::from_folder(root, &config.source, size)?
        .retain_source_classes(spec.num_source_classes());
    let target = ImageFolderDataset::from_folder(root, &config.target, size)?;
    Ok((Arc::new(source), Arc::new(target)))
}

fn checkpoint_path(dir: &Path, name: &str, part: &str) -> PathBuf {
    dir.join(format!("{name}_{part}"))
}

fn save_checkpoint<B: burn::tensor::backend::Backend>(
    model: &ImageClassifier<B>,
    ensemble: &EnsembleClassifier<B>,
    dir: &Path,
    name: &str,
) -> Result<()> {
    model
        .clone()
        .save_file(checkpoint_path(dir, name, "classifier"), &CompactRecorder::new())
        .map_err(|e| UdaError::Checkpoint(e.to_string()))?;
    ensemble
        .clone()
        .save_file(
            checkpoint_path(dir, name, "ens_classifier"),
            &CompactRecorder::new(),
        )
        .map_err(|e| UdaError::Checkpoint(e.to_string()))?;
    Ok(())
}

fn load_checkpoint(
    config: &RunConfig,
    spec: &DatasetSpec,
    name: &str,
) -> Result<(ImageClassifier<DefaultBackend>, EnsembleClassifier<DefaultBackend>)> {
    let device = default_device();
    let arch = lookup_arch(&config.model.arch, spec.num_source_classes())?
        .with_bottleneck_dim(config.model.bottleneck_dim);
    let model = ImageClassifier::<DefaultBackend>::new(&arch, &device);
    let ensemble = EnsembleClassifier::<DefaultBackend>::new(
        model.features_dim(),
        spec.num_source_classes(),
        &device,
    );

    let classifier_path = checkpoint_path(&config.output_dir, name, "classifier");
    let model = model
        .load_file(classifier_path.clone(), &CompactRecorder::new(), &device)
        .map_err(|e| {
            UdaError::Checkpoint(format!("{}: {e}", classifier_path.display()))
        })?;
    let ensemble = ensemble
        .load_file(
            checkpoint_path(&config.output_dir, name, "ens_classifier"),
            &CompactRecorder::new(),
            &device,
        )
        .map_err(|e| UdaError::Checkpoint(e.to_string()))?;
    Ok((model, ensemble))
}

fn sgd_config(training: &TrainingConfig) -> SgdConfig {
    SgdConfig::new()
        .with_weight_decay(Some(WeightDecayConfig::new(training.weight_decay)))
        .with_momentum(Some(
            MomentumConfig::new()
                .with_momentum(training.momentum)
                .with_dampening(0.0)
                .with_nesterov(true),
        ))
}

/// Run the full three-stage protocol; returns the best validation metrics.
pub fn run_training(config: &RunConfig) -> Result<UniversalMetrics> {
    let spec = config.validate()?;
    std::fs::create_dir_all(&config.output_dir)?;
    config
        .universal
        .save(&config.output_dir.join("universal.json"))?;

    let seed = config.training.seed.unwrap_or_else(rand::random);
    <TrainingBackend as burn::tensor::backend::Backend>::seed(seed);
    let num_classes = spec.num_source_classes();
    let size = config.model.input_size;
    let training = &config.training;

    info!(
        dataset = %config.dataset,
        source = %config.source,
        target = %config.target,
        num_classes,
        seed,
        backend = crate::backend::backend_name(),
        "starting run"
    );

    let (source_ds, target_ds) = build_datasets(config, spec, seed)?;
    let device = default_device();

    let arch = lookup_arch(&config.model.arch, num_classes)?
        .with_bottleneck_dim(config.model.bottleneck_dim);
    let mut model = ImageClassifier::<TrainingBackend>::new(&arch, &device);
    let mut ensemble =
        EnsembleClassifier::<TrainingBackend>::new(model.features_dim(), num_classes, &device);
    let mut domain_adv = DomainAdversarialLoss::new(DomainDiscriminator::new(
        model.features_dim(),
        DISCRIMINATOR_HIDDEN,
        &device,
    ));

    let batcher = DomainBatcher::<TrainingBackend>::new(device.clone(), size);
    let mut source_iter = ForeverBatchIter::new(
        source_ds.clone(),
        batcher.clone(),
        training.batch_size,
        seed,
    );
    let mut target_iter = ForeverBatchIter::new(
        target_ds.clone(),
        batcher.clone(),
        training.batch_size,
        seed.wrapping_add(1),
    );
    // one endless perturbed-source iterator per auxiliary head
    let mut ens_sources = PerturbView::all().map(|view| {
        let perturbed: Arc<dyn Dataset<DomainItem>> = Arc::new(PerturbedDataset::new(
            source_ds.clone(),
            view,
            size,
            seed.wrapping_add(view.index() as u64),
        ));
        ForeverBatchIter::new(
            perturbed,
            batcher.clone(),
            training.batch_size,
            seed.wrapping_add(100 + view.index() as u64),
        )
    });
    let valid_batcher = DomainBatcher::<DefaultBackend>::new(default_device(), size);
    let refresh_iters = (training.iters_per_epoch / 2).max(1);

    let new_schedule = || {
        InverseDecaySchedule::new(training.learning_rate, training.lr_gamma, training.lr_decay)
    };
    let mut pretrain_schedule = new_schedule();
    let mut ens_schedule = new_schedule();

    // stage 1: joint pretraining of the classifier and the auxiliary heads,
    // with its own optimizer state discarded at stage end
    let mut pretrain_model_opt = sgd_config(training).init();
    let mut pretrain_ens_opt = sgd_config(training).init();
    let (pretrained_model, pretrained_ensemble, _) = pretrain(
        model,
        ensemble,
        &mut pretrain_model_opt,
        &mut pretrain_ens_opt,
        &mut source_iter,
        &mut ens_sources,
        &mut pretrain_schedule,
        training.epochs_pretrain,
        training.iters_per_epoch,
        training.print_freq,
    );
    model = pretrained_model;
    ensemble = pretrained_ensemble;

    // stage 2: class weighting from confident target samples
    let source_class_weight = compute_source_class_weight(
        &model.valid(),
        &ensemble.valid(),
        target_ds.as_ref(),
        &valid_batcher,
        training.batch_size,
        config.universal.src_threshold,
        config.universal.cut,
    );

    // stage 3: weighted adversarial alignment, with fresh momentum state
    let mut model_opt = sgd_config(training).init();
    let mut disc_opt = sgd_config(training).init();
    let mut ens_opt = sgd_config(training).init();
    let mut bounds = RunningBounds::new();
    let mut schedule = new_schedule();
    let mut best_metrics: Option<UniversalMetrics> = None;

    for epoch in 0..training.epochs {
        let (next_model, next_adv, stats) = train_adversarial_epoch(
            model,
            domain_adv,
            &ensemble,
            &mut model_opt,
            &mut disc_opt,
            &mut source_iter,
            &mut target_iter,
            &source_class_weight,
            &mut bounds,
            &mut schedule,
            config.universal.trade_off as f32,
            training.iters_per_epoch,
            training.print_freq,
            epoch,
        );
        model = next_model;
        domain_adv = next_adv;

        ensemble = refresh_ensemble(
            &model,
            ensemble,
            &mut ens_opt,
            &mut ens_sources,
            &mut ens_schedule,
            refresh_iters,
        );

        let (metrics, _) = validate(
            &model.valid(),
            &ensemble.valid(),
            target_ds.as_ref(),
            &valid_batcher,
            training.batch_size,
            config.universal.threshold,
            spec.num_common_classes,
        );
        info!(
            epoch,
            cls_loss = stats.cls_loss,
            transfer_loss = stats.transfer_loss,
            domain_acc = stats.domain_accuracy,
            h_score = metrics.h_score,
            "epoch complete"
        );

        save_checkpoint(&model, &ensemble, &config.output_dir, "latest")?;
        let improved = best_metrics
            .as_ref()
            .map(|best| metrics.h_score > best.h_score)
            .unwrap_or(true);
        if improved {
            save_checkpoint(&model, &ensemble, &config.output_dir, "best")?;
            best_metrics = Some(metrics);
        }
    }

    best_metrics.ok_or_else(|| {
        UdaError::Config("training ran for zero epochs, nothing to report".into())
    })?;

    // final evaluation reloads the best checkpoint from disk, so the
    // reported numbers are exactly what `test` will reproduce
    let (best_model, best_ensemble) = load_checkpoint(config, spec, "best")?;
    let (best, _) = validate(
        &best_model,
        &best_ensemble,
        target_ds.as_ref(),
        &valid_batcher,
        training.batch_size,
        config.universal.threshold,
        spec.num_common_classes,
    );

    let summary = serde_json::json!({
        "finished_at": chrono::Utc::now().to_rfc3339(),
        "dataset": config.dataset,
        "source": config.source,
        "target": config.target,
        "arch": config.model.arch,
        "seed": seed,
        "best": &best,
    });
    let summary = serde_json::to_string_pretty(&summary)
        .map_err(|e| UdaError::Serialization(e.to_string()))?;
    std::fs::write(config.output_dir.join("run.json"), summary)?;

    info!(h_score = best.h_score, "run complete");
    Ok(best)
}

/// Evaluate the best checkpoint on the target domain.
pub fn run_test(config: &RunConfig) -> Result<UniversalMetrics> {
    let spec = config.validate()?;
    let seed = config.training.seed.unwrap_or(0);
    let (_, target_ds) = build_datasets(config, spec, seed)?;

    let (model, ensemble) = load_checkpoint(config, spec, "best")?;
    let batcher = DomainBatcher::<DefaultBackend>::new(default_device(), config.model.input_size);

    let (metrics, confmat) = validate(
        &model,
        &ensemble,
        target_ds.as_ref(),
        &batcher,
        config.training.batch_size,
        config.universal.threshold,
        spec.num_common_classes,
    );
    info!("\n{}", confmat.display());
    Ok(metrics)
}

/// Dump per-sample scores for both domains to `scores.csv`.
///
/// Columns: domain, path, label, prediction, confidence, entropy, score.
pub fn run_analysis(config: &RunConfig) -> Result<PathBuf> {
    let spec = config.validate()?;
    let seed = config.training.seed.unwrap_or(0);
    let (source_ds, target_ds) = build_datasets(config, spec, seed)?;

    let (model, ensemble) = load_checkpoint(config, spec, "best")?;
    let batcher = DomainBatcher::<DefaultBackend>::new(default_device(), config.model.input_size);

    let mut csv = String::from("domain,path,label,prediction,confidence,entropy,score\n");
    for (domain, dataset) in [("source", source_ds), ("target", target_ds)] {
        let pass = score_pass(
            &model,
            &ensemble,
            dataset.as_ref(),
            &batcher,
            config.training.batch_size,
        );
        if pass.labels.is_empty() {
            warn!(domain, "no samples scored");
        }
        for i in 0..pass.labels.len() {
            csv.push_str(&format!(
                "{},{},{},{},{:.6},{:.6},{:.6}\n",
                domain,
                pass.paths[i],
                pass.labels[i],
                pass.predictions[i],
                pass.confidence[i],
                pass.entropy[i],
                pass.scores[i],
            ));
        }
    }

    std::fs::create_dir_all(&config.output_dir)?;
    let out = config.output_dir.join("scores.csv");
    std::fs::write(&out, csv)?;
    info!(path = %out.display(), "analysis written");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_config(dir: &str) -> RunConfig {
        RunConfig {
            dataset: "Synthetic".into(),
            source: "S".into(),
            target: "T".into(),
            data_root: None,
            output_dir: std::env::temp_dir().join(dir),
            model: ModelConfig {
                arch: "cnn16".into(),
                input_size: 16,
                bottleneck_dim: 32,
            },
            training: TrainingConfig::quick(),
            universal: UniversalConfig::default(),
        }
    }

    #[test]
    fn test_same_domain_rejected() {
        let mut config = quick_config("cmu_uda_run_same");
        config.target = "S".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_data_root_rejected() {
        let mut config = quick_config("cmu_uda_run_root");
        config.dataset = "Office31".into();
        config.source = "A".into();
        config.target = "W".into();
        let spec = config.validate().unwrap();
        assert!(build_datasets(&config, spec, 0).is_err());
    }

    #[test]
    fn test_missing_checkpoint_is_fatal() {
        let config = quick_config("cmu_uda_run_missing_ckpt");
        let err = run_test(&config).unwrap_err();
        assert!(matches!(err, UdaError::Checkpoint(_)));
    }
}
