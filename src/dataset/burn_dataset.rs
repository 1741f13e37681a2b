//! Batch types and the batcher.
//!
//! A `DomainItem` is one preprocessed sample: a flat CHW float image and an
//! integer label (target labels are carried only for evaluation, never for
//! supervision). The batcher stacks items into tensors and applies ImageNet
//! channel normalization.

use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;
use serde::{Deserialize, Serialize};

/// A single preprocessed sample.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DomainItem {
    /// Flattened CHW float image in [0, 1], length `3 * size * size`
    pub image: Vec<f32>,
    /// Class label; target-domain labels are evaluation-only
    pub label: usize,
    /// Source path or synthetic identifier, for debugging
    pub path: String,
}

impl DomainItem {
    pub fn new(image: Vec<f32>, label: usize, path: String) -> Self {
        Self { image, label, path }
    }
}

/// A batch of domain samples.
#[derive(Clone, Debug)]
pub struct DomainBatch<B: Backend> {
    /// Images with shape `[batch, 3, size, size]`
    pub images: Tensor<B, 4>,
    /// Labels with shape `[batch]`
    pub targets: Tensor<B, 1, Int>,
    /// Labels on the host, in batch order
    pub labels: Vec<usize>,
}

/// Batcher stacking items into normalized tensors.
#[derive(Clone, Debug)]
pub struct DomainBatcher<B: Backend> {
    device: B::Device,
    image_size: usize,
}

impl<B: Backend> DomainBatcher<B> {
    pub fn new(device: B::Device, image_size: usize) -> Self {
        Self { device, image_size }
    }
}

impl<B: Backend> Batcher<DomainItem, DomainBatch<B>> for DomainBatcher<B> {
    fn batch(&self, items: Vec<DomainItem>) -> DomainBatch<B> {
        let batch_size = items.len();
        let size = self.image_size;

        let images_data: Vec<f32> = items.iter().flat_map(|item| item.image.clone()).collect();
        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, 3, size, size]),
            &self.device,
        );

        // ImageNet channel statistics
        let mean = Tensor::<B, 4>::from_floats(
            TensorData::new(vec![0.485f32, 0.456, 0.406], [1, 3, 1, 1]),
            &self.device,
        );
        let std = Tensor::<B, 4>::from_floats(
            TensorData::new(vec![0.229f32, 0.224, 0.225], [1, 3, 1, 1]),
            &self.device,
        );
        let images = (images - mean) / std;

        let labels: Vec<usize> = items.iter().map(|item| item.label).collect();
        let targets_data: Vec<i64> = labels.iter().map(|&label| label as i64).collect();
        let targets = Tensor::<B, 1, Int>::from_data(
            TensorData::new(targets_data, [batch_size]),
            &self.device,
        );

        DomainBatch {
            images,
            targets,
            labels,
        }
    }
}
