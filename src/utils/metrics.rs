//! Evaluation metrics for universal domain adaptation.
//!
//! Provides a confusion matrix sized for K known classes plus one reserved
//! unknown bucket, and the derived summary metrics: mean accuracy over the
//! common classes plus unknown, known accuracy, unknown accuracy, and the
//! H-score balancing the two.

use serde::{Deserialize, Serialize};

/// Confusion matrix for multi-class classification.
///
/// Rows are actual classes, columns are predictions, stored row-major.
/// For universal DA the matrix is (K+1)x(K+1) with the last row/column
/// holding the unknown bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// Number of classes (including the unknown bucket, if any)
    pub num_classes: usize,
    /// Matrix data in row-major order
    pub matrix: Vec<usize>,
}

impl ConfusionMatrix {
    /// Create an empty matrix.
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            matrix: vec![0; num_classes * num_classes],
        }
    }

    /// Accumulate a batch of (label, prediction) pairs.
    pub fn update(&mut self, labels: &[usize], predictions: &[usize]) {
        for (&actual, &predicted) in labels.iter().zip(predictions.iter()) {
            self.add(actual, predicted);
        }
    }

    /// Add a single observation.
    pub fn add(&mut self, actual: usize, predicted: usize) {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted] += 1;
        }
    }

    /// Count at (actual, predicted).
    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted]
        } else {
            0
        }
    }

    /// Total observation count.
    pub fn total(&self) -> usize {
        self.matrix.iter().sum()
    }

    /// Per-class accuracy: diagonal / row sum, 0.0 for empty rows.
    pub fn per_class_accuracy(&self) -> Vec<f64> {
        (0..self.num_classes)
            .map(|row| {
                let row_sum: usize = (0..self.num_classes).map(|col| self.get(row, col)).sum();
                if row_sum > 0 {
                    self.get(row, row) as f64 / row_sum as f64
                } else {
                    0.0
                }
            })
            .collect()
    }

    /// Pretty print for small matrices.
    pub fn display(&self) -> String {
        let mut output = String::new();
        output.push_str("\nConfusion Matrix (rows=actual, cols=predicted):\n");

        if self.num_classes > 20 {
            output.push_str(&format!(
                "(Matrix too large to display: {}x{}, {} samples)\n",
                self.num_classes,
                self.num_classes,
                self.total()
            ));
            return output;
        }

        for row in 0..self.num_classes {
            output.push_str(&format!("{:>4} ", row));
            for col in 0..self.num_classes {
                let count = self.get(row, col);
                if row == col {
                    output.push_str(&format!("[{:>4}]", count));
                } else if count > 0 {
                    output.push_str(&format!(" {:>4} ", count));
                } else {
                    output.push_str("    . ");
                }
            }
            output.push('\n');
        }
        output
    }
}

impl std::fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// Summary metrics for one universal-DA evaluation pass, in percent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniversalMetrics {
    /// Mean accuracy: (sum of common-class accuracies + unknown accuracy)
    /// divided by (common class count + 1)
    pub mean_accuracy: f64,
    /// Mean accuracy over the common (shared) classes
    pub known_accuracy: f64,
    /// Accuracy of the unknown bucket alone
    pub unknown_accuracy: f64,
    /// Harmonic mean of known and unknown accuracy
    pub h_score: f64,
    /// Samples evaluated
    pub total_samples: usize,
}

impl UniversalMetrics {
    /// Derive the summary from a (K+1)-sized confusion matrix, where the
    /// last index is the unknown bucket and the first `num_common_classes`
    /// indices are the shared classes.
    pub fn from_confusion_matrix(confmat: &ConfusionMatrix, num_common_classes: usize) -> Self {
        let accs = confmat.per_class_accuracy();
        let unknown_idx = confmat.num_classes - 1;

        let common_sum: f64 = accs[..num_common_classes].iter().sum();
        let unknown = accs[unknown_idx] * 100.0;
        let known = common_sum / num_common_classes as f64 * 100.0;
        let mean_accuracy =
            (common_sum + accs[unknown_idx]) / (num_common_classes + 1) as f64 * 100.0;

        Self {
            mean_accuracy,
            known_accuracy: known,
            unknown_accuracy: unknown,
            h_score: h_score(known, unknown),
            total_samples: confmat.total(),
        }
    }
}

impl std::fmt::Display for UniversalMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Mean Acc {:.3} | Known Acc {:.3} | Unknown Acc {:.3} | H-score {:.3}",
            self.mean_accuracy, self.known_accuracy, self.unknown_accuracy, self.h_score
        )
    }
}

/// Harmonic mean of known and unknown accuracy: `2ku / (k + u)`.
/// Returns 0.0 when both accuracies are zero.
pub fn h_score(known: f64, unknown: f64) -> f64 {
    if known + unknown == 0.0 {
        0.0
    } else {
        2.0 * known * unknown / (known + unknown)
    }
}

/// Running average for tracking loss/accuracy meters during training.
#[derive(Debug, Clone, Default)]
pub struct RunningAverage {
    sum: f64,
    count: usize,
}

impl RunningAverage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    pub fn average(&self) -> f64 {
        if self.count > 0 {
            self.sum / self.count as f64
        } else {
            0.0
        }
    }

    pub fn reset(&mut self) {
        self.sum = 0.0;
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confusion_matrix_accumulation() {
        let mut cm = ConfusionMatrix::new(3);
        cm.update(&[0, 1, 2, 0], &[0, 1, 0, 1]);

        assert_eq!(cm.get(0, 0), 1);
        assert_eq!(cm.get(0, 1), 1);
        assert_eq!(cm.get(2, 0), 1);
        assert_eq!(cm.total(), 4);
    }

    #[test]
    fn test_per_class_accuracy_empty_row() {
        let mut cm = ConfusionMatrix::new(3);
        cm.add(0, 0);
        cm.add(0, 0);
        // class 1 never appears: its accuracy must be 0.0, not NaN
        let accs = cm.per_class_accuracy();
        assert_eq!(accs[0], 1.0);
        assert_eq!(accs[1], 0.0);
        assert!(accs.iter().all(|a| a.is_finite()));
    }

    #[test]
    fn test_h_score_literal() {
        let h = h_score(80.0, 60.0);
        assert!((h - 68.57).abs() < 0.01);
    }

    #[test]
    fn test_h_score_zero_guard() {
        assert_eq!(h_score(0.0, 0.0), 0.0);
    }

    #[test]
    fn test_universal_metrics() {
        // 2 common classes + 1 source-private + unknown bucket -> 4x4
        let mut cm = ConfusionMatrix::new(4);
        // class 0: 4/5 correct
        for _ in 0..4 {
            cm.add(0, 0);
        }
        cm.add(0, 1);
        // class 1: 3/5 correct
        for _ in 0..3 {
            cm.add(1, 1);
        }
        cm.add(1, 0);
        cm.add(1, 3);
        // unknown: 3/5 correct
        for _ in 0..3 {
            cm.add(3, 3);
        }
        cm.add(3, 0);
        cm.add(3, 1);

        let metrics = UniversalMetrics::from_confusion_matrix(&cm, 2);
        assert!((metrics.known_accuracy - 70.0).abs() < 1e-9);
        assert!((metrics.unknown_accuracy - 60.0).abs() < 1e-9);
        let expected_mean = (0.8 + 0.6 + 0.6) / 3.0 * 100.0;
        assert!((metrics.mean_accuracy - expected_mean).abs() < 1e-9);
        assert!((metrics.h_score - h_score(70.0, 60.0)).abs() < 1e-9);
    }

    #[test]
    fn test_running_average() {
        let mut avg = RunningAverage::new();
        avg.add(1.0);
        avg.add(3.0);
        assert!((avg.average() - 2.0).abs() < 1e-9);
        avg.reset();
        assert_eq!(avg.average(), 0.0);
    }
}
