//! Ensemble of weak classifier heads.
//!
//! Exactly five linear heads share the backbone's bottleneck features. The
//! heads never produce the final class prediction; their disagreement is
//! the known-ness signal for unknown detection. Heads are addressed by
//! index (0..5); `forward_all` returns every head's logits in index order.
//! Head `i` is always trained on augmentation pipeline `i`.

use burn::{
    module::Module,
    nn::{Linear, LinearConfig},
    tensor::{backend::Backend, Tensor},
};

use crate::ENSEMBLE_SIZE;

/// Five weak classifier heads over shared features.
#[derive(Module, Debug)]
pub struct EnsembleClassifier<B: Backend> {
    head0: Linear<B>,
    head1: Linear<B>,
    head2: Linear<B>,
    head3: Linear<B>,
    head4: Linear<B>,
}

impl<B: Backend> EnsembleClassifier<B> {
    /// Create five heads mapping `features_dim` to `num_classes`.
    pub fn new(features_dim: usize, num_classes: usize, device: &B::Device) -> Self {
        let make = || LinearConfig::new(features_dim, num_classes).init(device);
        Self {
            head0: make(),
            head1: make(),
            head2: make(),
            head3: make(),
            head4: make(),
        }
    }

    /// Forward one head, selected by index.
    ///
    /// # Panics
    /// Panics if `index >= 5`; the ensemble size is a fixed design constant.
    pub fn forward_head(&self, features: Tensor<B, 2>, index: usize) -> Tensor<B, 2> {
        match index {
            0 => self.head0.forward(features),
            1 => self.head1.forward(features),
            2 => self.head2.forward(features),
            3 => self.head3.forward(features),
            4 => self.head4.forward(features),
            _ => panic!("ensemble head index out of range: {}", index),
        }
    }

    /// Forward all five heads, returned in index order.
    pub fn forward_all(&self, features: Tensor<B, 2>) -> [Tensor<B, 2>; ENSEMBLE_SIZE] {
        [
            self.head0.forward(features.clone()),
            self.head1.forward(features.clone()),
            self.head2.forward(features.clone()),
            self.head3.forward(features.clone()),
            self.head4.forward(features),
        ]
    }
}
