//! Backbone classifier.
//!
//! A convolutional feature extractor followed by a bottleneck projection and
//! a linear classification head. The forward pass returns both the class
//! logits and the bottleneck features: the features feed the ensemble heads
//! and the domain discriminator, so they are first-class outputs here.
//!
//! Architectures are selected by name through a small registry mapping the
//! configuration string to a factory; every variant exposes the same
//! `forward(input) -> (logits, features)` shape, so no trait hierarchy is
//! needed.

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use crate::utils::error::{Result, UdaError};

/// Configuration for the backbone classifier.
#[derive(Debug, Clone)]
pub struct ImageClassifierConfig {
    /// Number of source classes
    pub num_classes: usize,
    /// Number of input channels (3 for RGB)
    pub in_channels: usize,
    /// Base number of convolutional filters; doubled at each block
    pub base_filters: usize,
    /// Number of conv blocks (each halves the spatial size)
    pub num_blocks: usize,
    /// Bottleneck feature dimension
    pub bottleneck_dim: usize,
}

impl ImageClassifierConfig {
    pub fn new(num_classes: usize, base_filters: usize, num_blocks: usize) -> Self {
        Self {
            num_classes,
            in_channels: 3,
            base_filters,
            num_blocks,
            bottleneck_dim: 256,
        }
    }

    pub fn with_bottleneck_dim(mut self, bottleneck_dim: usize) -> Self {
        self.bottleneck_dim = bottleneck_dim;
        self
    }

    pub fn with_in_channels(mut self, in_channels: usize) -> Self {
        self.in_channels = in_channels;
        self
    }
}

/// Registered backbone architecture names.
pub fn arch_names() -> Vec<&'static str> {
    vec!["cnn16", "cnn32", "cnn64"]
}

/// Resolve an architecture name to a classifier configuration factory.
pub fn lookup_arch(name: &str, num_classes: usize) -> Result<ImageClassifierConfig> {
    match name {
        "cnn16" => Ok(ImageClassifierConfig::new(num_classes, 16, 3)),
        "cnn32" => Ok(ImageClassifierConfig::new(num_classes, 32, 4)),
        "cnn64" => Ok(ImageClassifierConfig::new(num_classes, 64, 4)),
        other => Err(UdaError::UnknownArchitecture(other.to_string())),
    }
}

/// A conv block: Conv2d + BatchNorm + ReLU + MaxPool.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
    relu: Relu,
    pool: MaxPool2d,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .init(device);
        let bn = BatchNormConfig::new(out_channels).init(device);
        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();

        Self {
            conv,
            bn,
            relu: Relu::new(),
            pool,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        let x = self.relu.forward(x);
        self.pool.forward(x)
    }
}

/// Backbone feature extractor with a bottleneck and classification head.
#[derive(Module, Debug)]
pub struct ImageClassifier<B: Backend> {
    blocks: Vec<ConvBlock<B>>,
    global_pool: AdaptiveAvgPool2d,
    bottleneck: Linear<B>,
    head: Linear<B>,
    num_classes: usize,
    features_dim: usize,
}

impl<B: Backend> ImageClassifier<B> {
    /// Build the classifier from a resolved architecture configuration.
    pub fn new(config: &ImageClassifierConfig, device: &B::Device) -> Self {
        let mut blocks = Vec::with_capacity(config.num_blocks);
        let mut in_channels = config.in_channels;
        let mut out_channels = config.base_filters;
        for _ in 0..config.num_blocks {
            blocks.push(ConvBlock::new(in_channels, out_channels, device));
            in_channels = out_channels;
            out_channels *= 2;
        }

        let global_pool = AdaptiveAvgPool2dConfig::new([1, 1]).init();
        let bottleneck = LinearConfig::new(in_channels, config.bottleneck_dim).init(device);
        let head = LinearConfig::new(config.bottleneck_dim, config.num_classes).init(device);

        Self {
            blocks,
            global_pool,
            bottleneck,
            head,
            num_classes: config.num_classes,
            features_dim: config.bottleneck_dim,
        }
    }

    /// Forward pass returning `(logits, features)`.
    ///
    /// Logits have shape `[batch, num_classes]`; features are the
    /// bottleneck output with shape `[batch, features_dim]`.
    pub fn forward(&self, x: Tensor<B, 4>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let mut x = x;
        for block in &self.blocks {
            x = block.forward(x);
        }

        let x = self.global_pool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        let f = self.bottleneck.forward(x);
        let f = Relu::new().forward(f);
        let y = self.head.forward(f.clone());

        (y, f)
    }

    /// Dimension of the bottleneck feature vector.
    pub fn features_dim(&self) -> usize {
        self.features_dim
    }

    /// Number of source classes.
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_forward_shapes() {
        let device = Default::default();
        let config = ImageClassifierConfig::new(10, 16, 3).with_bottleneck_dim(64);
        let model = ImageClassifier::<TestBackend>::new(&config, &device);

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 32, 32], &device);
        let (logits, features) = model.forward(input);

        assert_eq!(logits.dims(), [2, 10]);
        assert_eq!(features.dims(), [2, 64]);
        assert_eq!(model.features_dim(), 64);
    }

    #[test]
    fn test_arch_registry() {
        let config = lookup_arch("cnn32", 20).unwrap();
        assert_eq!(config.base_filters, 32);
        assert_eq!(config.num_classes, 20);

        assert!(lookup_arch("resnet999", 20).is_err());
        assert!(arch_names().contains(&"cnn16"));
    }
}
