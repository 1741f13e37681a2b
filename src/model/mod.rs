//! Model components: backbone classifier, ensemble heads, discriminator.

pub mod cnn;
pub mod config;
pub mod discriminator;
pub mod ensemble;

pub use cnn::{arch_names, lookup_arch, ImageClassifier, ImageClassifierConfig};
pub use config::{ModelConfig, TrainingConfig, UniversalConfig};
pub use discriminator::{DomainAdversarialLoss, DomainDiscriminator};
pub use ensemble::EnsembleClassifier;
