//! # CMU Universal Domain Adaptation
//!
//! A Rust implementation of Calibrated Multiple Uncertainties (CMU) for
//! universal domain adaptation, built on the Burn framework.
//!
//! The training protocol has three stages:
//!
//! 1. **Pretraining**: the main classifier and an ensemble of five weak
//!    heads are trained jointly on labeled source data, each head on its own
//!    perturbed view of the source domain.
//! 2. **Source class weighting**: ensemble uncertainty over a held-out pass
//!    selects high-confidence samples and derives a binary per-class
//!    reliability mask for the source domain.
//! 3. **Adversarial alignment**: source and target features are aligned with
//!    a per-sample weighted domain-adversarial loss; target weights come from
//!    a running-normalized ensemble "known-ness" score, and the ensemble
//!    heads are periodically retrained to stay calibrated.
//!
//! Target samples the ensemble scores below a threshold at evaluation time
//! are assigned to a reserved unknown class, and quality is summarized by
//! the H-score (harmonic mean of known and unknown accuracy).
//!
//! ## Modules
//!
//! - `dataset`: domain datasets, universal class splits, batching, the five
//!   per-head augmentation pipelines, and the forever iterator
//! - `model`: backbone classifier, ensemble heads, domain discriminator
//! - `scoring`: ensemble uncertainty scores and score normalization
//! - `training`: the three training stages, evaluation, and the run driver
//! - `utils`: logging, metrics, and error types

pub mod backend;
pub mod dataset;
pub mod model;
pub mod scoring;
pub mod training;
pub mod utils;

pub use dataset::burn_dataset::{DomainBatch, DomainBatcher, DomainItem};
pub use dataset::iterator::ForeverBatchIter;
pub use dataset::registry::{dataset_names, lookup_dataset, DatasetSpec};
pub use model::cnn::{ImageClassifier, ImageClassifierConfig};
pub use model::config::{ModelConfig, TrainingConfig, UniversalConfig};
pub use model::discriminator::{DomainAdversarialLoss, DomainDiscriminator};
pub use model::ensemble::EnsembleClassifier;
pub use scoring::ensemble_score::{combined_score, entropy, marginal_confidence};
pub use scoring::normalizer::{minmax_normalize, RunningBounds};
pub use training::evaluate::validate;
pub use training::run::{run_analysis, run_test, run_training, RunConfig};
pub use utils::error::{Result, UdaError};
pub use utils::metrics::{ConfusionMatrix, UniversalMetrics};

/// Number of ensemble heads. The scoring algorithm is defined over exactly
/// five distributions; this is a fixed design constant, not a tunable.
pub const ENSEMBLE_SIZE: usize = 5;

/// Default input image size (square).
pub const IMAGE_SIZE: usize = 64;

/// Default evaluation threshold below which a sample is marked unknown.
pub const DEFAULT_THRESHOLD: f32 = 0.7;

/// Version of the library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
