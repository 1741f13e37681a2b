//! Score normalization.
//!
//! Two variants are used by the training protocol:
//!
//! - a *static* min-max normalization over a full evaluation pass, and
//! - a *running* pair of bounds updated per batch inside the adversarial
//!   training loop, which persists for the lifetime of the stage.

/// Running upper/lower bounds of a score stream.
///
/// Each update recomputes the bounds as
/// `bound = bound * 0.01 + extreme * 0.99`, which biases the bound almost
/// entirely toward the newest batch extreme. This is a fast-tracking extreme
/// follower rather than a conventional moving average; the CMU method
/// specifies this weighting and evaluation depends on it.
///
/// Owned by the adversarial-stage driver, initialized to `(0, 0)` at stage
/// start, and passed by mutable reference into each iteration.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunningBounds {
    pub upper: f32,
    pub lower: f32,
}

impl RunningBounds {
    /// Create bounds initialized to `(0, 0)`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one batch's extremes into the bounds.
    pub fn update(&mut self, batch_max: f32, batch_min: f32) {
        self.upper = self.upper * 0.01 + batch_max * 0.99;
        self.lower = self.lower * 0.01 + batch_min * 0.99;
    }

    /// Normalize a score against the current bounds.
    ///
    /// Returns 0.5 when the bounds coincide, so a degenerate batch keeps
    /// training alive instead of producing NaN weights.
    pub fn normalize(&self, score: f32) -> f32 {
        let range = self.upper - self.lower;
        if range.abs() < f32::EPSILON {
            0.5
        } else {
            (score - self.lower) / range
        }
    }

    /// Update from a full batch of scores, then normalize every score
    /// against the new bounds.
    pub fn update_and_normalize(&mut self, scores: &[f32]) -> Vec<f32> {
        if scores.is_empty() {
            return Vec::new();
        }
        let batch_max = scores.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let batch_min = scores.iter().cloned().fold(f32::INFINITY, f32::min);
        self.update(batch_max, batch_min);
        scores.iter().map(|&s| self.normalize(s)).collect()
    }
}

/// Static min-max normalization over one full pass: `(x - min) / (max - min)`.
///
/// All-equal inputs map to a constant 0.5 instead of dividing by zero.
pub fn minmax_normalize(values: &[f32]) -> Vec<f32> {
    if values.is_empty() {
        return Vec::new();
    }
    let max = values.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let min = values.iter().cloned().fold(f32::INFINITY, f32::min);
    let range = max - min;
    if range.abs() < f32::EPSILON {
        vec![0.5; values.len()]
    } else {
        values.iter().map(|&v| (v - min) / range).collect()
    }
}
