//! Synthetic two-domain data for tests and smoke runs.
//!
//! Each class is a colored blob at a class-specific position; the target
//! domain shifts brightness and adds noise so the domains are related but
//! not identical. Label sets follow the `Synthetic` registry entry: a few
//! shared classes, one source-private class, and target-private classes
//! that a universal method must reject as unknown.

use burn::data::dataset::Dataset;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::burn_dataset::DomainItem;

/// Deterministic generated dataset for one domain.
pub struct SyntheticDomainDataset {
    items: Vec<DomainItem>,
}

impl SyntheticDomainDataset {
    /// Source domain: labels `0..num_source_classes`.
    pub fn source(
        num_source_classes: usize,
        samples_per_class: usize,
        image_size: usize,
        seed: u64,
    ) -> Self {
        Self::generate(
            0..num_source_classes,
            samples_per_class,
            image_size,
            seed,
            0.0,
        )
    }

    /// Target domain: shared classes plus target-private ones, shifted.
    pub fn target(
        num_common_classes: usize,
        num_target_private: usize,
        num_total_classes: usize,
        samples_per_class: usize,
        image_size: usize,
        seed: u64,
    ) -> Self {
        // target-private labels come from the top of the shared ordering
        let private_start = num_total_classes - num_target_private;
        let mut ds = Self::generate(
            0..num_common_classes,
            samples_per_class,
            image_size,
            seed,
            0.15,
        );
        let private = Self::generate(
            private_start..num_total_classes,
            samples_per_class,
            image_size,
            seed.wrapping_add(1),
            0.15,
        );
        ds.items.extend(private.items);
        ds
    }

    fn generate(
        labels: std::ops::Range<usize>,
        samples_per_class: usize,
        image_size: usize,
        seed: u64,
        domain_shift: f32,
    ) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut items = Vec::new();
        for label in labels {
            for sample in 0..samples_per_class {
                let image = class_blob(label, image_size, domain_shift, &mut rng);
                items.push(DomainItem::new(
                    image,
                    label,
                    format!("synthetic/{label}/{sample}"),
                ));
            }
        }
        Self { items }
    }
}

/// One blob image for `label`, with per-sample jitter and a domain shift.
fn class_blob(label: usize, size: usize, domain_shift: f32, rng: &mut ChaCha8Rng) -> Vec<f32> {
    let mut chw = vec![0.1f32; 3 * size * size];

    // blob center cycles through a grid of positions by label
    let grid = 3;
    let cell = size / grid;
    let cx = (label % grid) * cell + cell / 2;
    let cy = ((label / grid) % grid) * cell + cell / 2;
    let radius = (cell / 2).max(1) as f32;

    // class-specific channel mix
    let color = [
        0.3 + 0.7 * ((label * 37 % 10) as f32 / 10.0),
        0.3 + 0.7 * ((label * 61 % 10) as f32 / 10.0),
        0.3 + 0.7 * ((label * 89 % 10) as f32 / 10.0),
    ];

    let jitter: f32 = rng.gen_range(-0.05..0.05);
    for y in 0..size {
        for x in 0..size {
            let dx = x as f32 - cx as f32;
            let dy = y as f32 - cy as f32;
            if dx * dx + dy * dy <= radius * radius {
                for c in 0..3 {
                    let value = color[c] + jitter + domain_shift + rng.gen_range(-0.02..0.02);
                    chw[c * size * size + y * size + x] = value.clamp(0.0, 1.0);
                }
            }
        }
    }
    chw
}

impl Dataset<DomainItem> for SyntheticDomainDataset {
    fn get(&self, index: usize) -> Option<DomainItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_labels_and_count() {
        let ds = SyntheticDomainDataset::source(5, 4, 16, 0);
        assert_eq!(ds.len(), 20);
        for i in 0..ds.len() {
            assert!(ds.get(i).unwrap().label < 5);
        }
    }

    #[test]
    fn test_target_contains_private_labels() {
        // registry Synthetic geometry: 6 total, 3 common, 1 source-private
        let ds = SyntheticDomainDataset::target(3, 2, 6, 4, 16, 0);
        assert_eq!(ds.len(), 20);
        let labels: Vec<usize> = (0..ds.len()).map(|i| ds.get(i).unwrap().label).collect();
        assert!(labels.iter().any(|&l| l < 3));
        assert!(labels.iter().any(|&l| l >= 4));
        // source-private label never appears in the target
        assert!(labels.iter().all(|&l| l != 3));
    }

    #[test]
    fn test_deterministic() {
        let a = SyntheticDomainDataset::source(3, 2, 8, 9);
        let b = SyntheticDomainDataset::source(3, 2, 8, 9);
        for i in 0..a.len() {
            assert_eq!(a.get(i).unwrap().image, b.get(i).unwrap().image);
        }
    }

    #[test]
    fn test_domain_shift_changes_pixels() {
        let src = SyntheticDomainDataset::source(1, 1, 8, 3);
        let tgt = SyntheticDomainDataset::target(1, 0, 1, 1, 8, 3);
        assert_ne!(src.get(0).unwrap().image, tgt.get(0).unwrap().image);
    }
}
