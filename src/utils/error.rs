//! Error handling.
//!
//! Custom error types for the library, defined with thiserror.
//! Misconfiguration errors surface before any training begins.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for universal domain adaptation operations.
#[derive(Error, Debug)]
pub enum UdaError {
    /// Unknown dataset name (not in the registry)
    #[error("Unknown dataset '{0}', expected one of: {1}")]
    UnknownDataset(String, String),

    /// Unknown domain for a dataset
    #[error("Unknown domain '{0}' for dataset '{1}'")]
    UnknownDomain(String, String),

    /// Unknown backbone architecture name
    #[error("Unknown architecture '{0}'")]
    UnknownArchitecture(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error with dataset loading or iteration
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Error loading or processing an image
    #[error("Failed to load image at '{0}': {1}")]
    ImageLoad(PathBuf, String),

    /// Checkpoint save/load failure
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Convenience Result type for library operations.
pub type Result<T> = std::result::Result<T, UdaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = UdaError::Config("missing source domain".to_string());
        assert_eq!(
            format!("{}", err),
            "Configuration error: missing source domain"
        );
    }

    #[test]
    fn test_unknown_dataset_display() {
        let err = UdaError::UnknownDataset("Office99".to_string(), "Office31".to_string());
        assert!(format!("{}", err).contains("Office99"));
    }
}
