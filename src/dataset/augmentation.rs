//! Perturbation pipelines for the auxiliary heads.
//!
//! Each auxiliary head sees the source data through its own fixed pipeline,
//! so the heads disagree on samples that are sensitive to nuisance changes.
//! Head `i` is always paired with pipeline `i`.

use std::sync::Arc;

use burn::data::dataset::Dataset;
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::burn_dataset::DomainItem;
use crate::ENSEMBLE_SIZE;

/// One of the fixed perturbation pipelines, indexed `0..ENSEMBLE_SIZE`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PerturbView {
    index: usize,
}

impl PerturbView {
    /// Panics if `index >= ENSEMBLE_SIZE`.
    pub fn new(index: usize) -> Self {
        assert!(
            index < ENSEMBLE_SIZE,
            "view index {index} out of range (ensemble size {ENSEMBLE_SIZE})"
        );
        Self { index }
    }

    pub fn all() -> [PerturbView; ENSEMBLE_SIZE] {
        [0, 1, 2, 3, 4].map(PerturbView::new)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Apply this view's pipeline to an image.
    pub fn apply(&self, img: &DynamicImage, rng: &mut ChaCha8Rng) -> DynamicImage {
        match self.index {
            // flip + mild brightness jitter
            0 => {
                let img = DynamicImage::ImageRgb8(imageops::flip_horizontal(&img.to_rgb8()));
                let delta = rng.gen_range(-20i32..=20);
                img.brighten(delta)
            }
            // contrast jitter
            1 => {
                let factor = rng.gen_range(0.7f32..1.3);
                img.adjust_contrast((factor - 1.0) * 100.0)
            }
            // hue rotation
            2 => {
                let degrees = rng.gen_range(-45i32..=45);
                img.huerotate(degrees)
            }
            // blur
            3 => {
                let sigma = rng.gen_range(0.5f32..1.5);
                img.blur(sigma)
            }
            // random crop back to original size
            4 => {
                let (w, h) = (img.width(), img.height());
                let crop_w = (w as f32 * rng.gen_range(0.7f32..1.0)) as u32;
                let crop_h = (h as f32 * rng.gen_range(0.7f32..1.0)) as u32;
                let crop_w = crop_w.max(1);
                let crop_h = crop_h.max(1);
                let x = rng.gen_range(0..=(w - crop_w));
                let y = rng.gen_range(0..=(h - crop_h));
                img.crop_imm(x, y, crop_w, crop_h)
                    .resize_exact(w, h, FilterType::Triangle)
            }
            _ => unreachable!(),
        }
    }

    /// Apply this view's pipeline to a flat CHW buffer in `[0, 1]`.
    ///
    /// Used for items that were already decoded at load time.
    pub fn apply_chw(&self, chw: &[f32], size: usize, rng: &mut ChaCha8Rng) -> Vec<f32> {
        let img = chw_to_image(chw, size);
        let out = self.apply(&DynamicImage::ImageRgb8(img), rng).to_rgb8();
        image_to_chw(&out, size)
    }
}

/// A dataset view that perturbs every item through one fixed pipeline.
///
/// Perturbation randomness is derived from the seed and the item index, so
/// lookups stay deterministic even though `Dataset::get` takes `&self`.
pub struct PerturbedDataset {
    inner: Arc<dyn Dataset<DomainItem>>,
    view: PerturbView,
    image_size: usize,
    seed: u64,
}

impl PerturbedDataset {
    pub fn new(
        inner: Arc<dyn Dataset<DomainItem>>,
        view: PerturbView,
        image_size: usize,
        seed: u64,
    ) -> Self {
        Self {
            inner,
            view,
            image_size,
            seed,
        }
    }
}

impl Dataset<DomainItem> for PerturbedDataset {
    fn get(&self, index: usize) -> Option<DomainItem> {
        let item = self.inner.get(index)?;
        let mut rng = ChaCha8Rng::seed_from_u64(
            self.seed ^ (index as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15),
        );
        let image = self.view.apply_chw(&item.image, self.image_size, &mut rng);
        Some(DomainItem::new(image, item.label, item.path))
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

fn chw_to_image(chw: &[f32], size: usize) -> RgbImage {
    let mut img = RgbImage::new(size as u32, size as u32);
    for y in 0..size {
        for x in 0..size {
            let mut pixel = [0u8; 3];
            for c in 0..3 {
                let value = chw[c * size * size + y * size + x];
                pixel[c] = (value.clamp(0.0, 1.0) * 255.0).round() as u8;
            }
            img.put_pixel(x as u32, y as u32, image::Rgb(pixel));
        }
    }
    img
}

fn image_to_chw(img: &RgbImage, size: usize) -> Vec<f32> {
    let mut chw = vec![0.0f32; 3 * size * size];
    for (x, y, pixel) in img.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for c in 0..3 {
            chw[c * size * size + y * size + x] = pixel[c] as f32 / 255.0;
        }
    }
    chw
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_all_views_distinct_indices() {
        let views = PerturbView::all();
        for (i, view) in views.iter().enumerate() {
            assert_eq!(view.index(), i);
        }
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_index_bound() {
        let _ = PerturbView::new(ENSEMBLE_SIZE);
    }

    #[test]
    fn test_apply_chw_keeps_shape_and_range() {
        let size = 8;
        let chw: Vec<f32> = (0..3 * size * size).map(|i| (i % 256) as f32 / 255.0).collect();
        for view in PerturbView::all() {
            let mut rng = ChaCha8Rng::seed_from_u64(7);
            let out = view.apply_chw(&chw, size, &mut rng);
            assert_eq!(out.len(), 3 * size * size);
            assert!(out.iter().all(|v| (0.0..=1.0).contains(v)));
        }
    }

    #[test]
    fn test_deterministic_with_same_seed() {
        let size = 8;
        let chw = vec![0.4f32; 3 * size * size];
        let view = PerturbView::new(4);
        let mut rng_a = ChaCha8Rng::seed_from_u64(11);
        let mut rng_b = ChaCha8Rng::seed_from_u64(11);
        assert_eq!(
            view.apply_chw(&chw, size, &mut rng_a),
            view.apply_chw(&chw, size, &mut rng_b)
        );
    }
}
