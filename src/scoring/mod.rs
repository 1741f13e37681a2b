//! Ensemble uncertainty scoring and score normalization.

pub mod ensemble_score;
pub mod normalizer;

pub use ensemble_score::{combined_score, entropy, head_probabilities, marginal_confidence};
pub use normalizer::{minmax_normalize, RunningBounds};
