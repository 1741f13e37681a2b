//! Logging, metrics, and error types.

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{Result, UdaError};
pub use metrics::{ConfusionMatrix, UniversalMetrics};
