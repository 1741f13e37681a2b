//! Configuration structures for training runs.
//!
//! Defines the optimizer/schedule hyperparameters, the universal-DA
//! thresholds, and JSON save/load for reproducing runs.

use serde::{Deserialize, Serialize};

use crate::utils::error::{Result, UdaError};

/// Model architecture configuration (resolved from the arch registry).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Backbone architecture name (see `model::arch_names`)
    pub arch: String,
    /// Input image size (width and height, assumed square)
    pub input_size: usize,
    /// Dimension of the bottleneck feature vector shared by the main head,
    /// the ensemble heads, and the domain discriminator
    pub bottleneck_dim: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            arch: "cnn32".to_string(),
            input_size: crate::IMAGE_SIZE,
            bottleneck_dim: 256,
        }
    }
}

/// Optimizer and schedule hyperparameters shared by all three stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Batch size
    pub batch_size: usize,
    /// Initial learning rate
    pub learning_rate: f64,
    /// Inverse-decay schedule gamma
    pub lr_gamma: f64,
    /// Inverse-decay schedule exponent
    pub lr_decay: f64,
    /// SGD momentum
    pub momentum: f64,
    /// Weight decay (L2 regularization)
    pub weight_decay: f64,
    /// Total adversarial epochs
    pub epochs: usize,
    /// Pretraining epochs
    pub epochs_pretrain: usize,
    /// Iterations per epoch
    pub iters_per_epoch: usize,
    /// Log every N iterations
    pub print_freq: usize,
    /// Number of data loading workers (recorded for parity; loading is
    /// synchronous)
    pub num_workers: usize,
    /// Random seed; enables deterministic mode when set
    pub seed: Option<u64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            learning_rate: 0.001,
            lr_gamma: 0.001,
            lr_decay: 0.75,
            momentum: 0.9,
            weight_decay: 1e-3,
            epochs: 30,
            epochs_pretrain: 5,
            iters_per_epoch: 200,
            print_freq: 50,
            num_workers: 2,
            seed: None,
        }
    }
}

impl TrainingConfig {
    /// A fast configuration for smoke tests and the synthetic dataset.
    pub fn quick() -> Self {
        Self {
            batch_size: 8,
            epochs: 2,
            epochs_pretrain: 1,
            iters_per_epoch: 4,
            print_freq: 1,
            seed: Some(42),
            ..Default::default()
        }
    }

    /// Validate hyperparameter ranges before any training begins.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(UdaError::Config("batch_size must be positive".into()));
        }
        if self.learning_rate <= 0.0 {
            return Err(UdaError::Config("learning_rate must be positive".into()));
        }
        if self.iters_per_epoch == 0 {
            return Err(UdaError::Config("iters_per_epoch must be positive".into()));
        }
        Ok(())
    }
}

/// Thresholds and trade-off specific to universal domain adaptation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniversalConfig {
    /// Evaluation threshold: samples with a combined score below this value
    /// are assigned to the unknown class
    pub threshold: f32,
    /// Source-selection threshold for the class weighter
    pub src_threshold: f32,
    /// Cut value binarizing the class weight vector
    pub cut: f32,
    /// Trade-off coefficient on the domain-adversarial loss
    pub trade_off: f64,
}

impl Default for UniversalConfig {
    fn default() -> Self {
        Self {
            threshold: crate::DEFAULT_THRESHOLD,
            src_threshold: 0.4,
            cut: 0.1,
            trade_off: 1.0,
        }
    }
}

impl UniversalConfig {
    /// Validate threshold ranges.
    pub fn validate(&self) -> Result<()> {
        for (name, v) in [
            ("threshold", self.threshold),
            ("src_threshold", self.src_threshold),
            ("cut", self.cut),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(UdaError::Config(format!(
                    "{} must be in [0, 1], got {}",
                    name, v
                )));
            }
        }
        if self.trade_off < 0.0 {
            return Err(UdaError::Config("trade_off must be non-negative".into()));
        }
        Ok(())
    }

    /// Save to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| UdaError::Serialization(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load from a JSON file.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(|e| UdaError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_training_config_default() {
        let config = TrainingConfig::default();
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.epochs_pretrain, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_training_config_validation() {
        let config = TrainingConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = TrainingConfig {
            learning_rate: -1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_universal_config_validation() {
        let config = UniversalConfig::default();
        assert!(config.validate().is_ok());

        let config = UniversalConfig {
            threshold: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_universal_config_roundtrip() {
        let dir = std::env::temp_dir().join("cmu_uda_config_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("universal.json");

        let config = UniversalConfig {
            threshold: 0.6,
            src_threshold: 0.5,
            cut: 0.2,
            trade_off: 0.8,
        };
        config.save(&path).unwrap();
        let loaded = UniversalConfig::load(&path).unwrap();
        assert_eq!(loaded.threshold, 0.6);
        assert_eq!(loaded.cut, 0.2);
    }
}
