//! Domain discriminator and the weighted domain-adversarial loss.
//!
//! The discriminator is an MLP over bottleneck features predicting the
//! domain (source = 1, target = 0). `DomainAdversarialLoss` wraps it in the
//! min-max game: the discriminator is trained on detached features, while
//! the classifier receives the inverted-label fooling loss. Per-sample
//! weights scale each sample's contribution to the binary cross-entropy,
//! and the discriminator's batch accuracy is exposed as an observable.

use burn::{
    module::Module,
    nn::{Dropout, DropoutConfig, Linear, LinearConfig, Relu},
    tensor::{activation::sigmoid, backend::Backend, ElementConversion, Tensor},
};

/// MLP domain discriminator: features -> hidden -> hidden -> 1 (sigmoid).
#[derive(Module, Debug)]
pub struct DomainDiscriminator<B: Backend> {
    fc1: Linear<B>,
    fc2: Linear<B>,
    out: Linear<B>,
    dropout: Dropout,
}

impl<B: Backend> DomainDiscriminator<B> {
    pub fn new(in_features: usize, hidden_size: usize, device: &B::Device) -> Self {
        Self {
            fc1: LinearConfig::new(in_features, hidden_size).init(device),
            fc2: LinearConfig::new(hidden_size, hidden_size).init(device),
            out: LinearConfig::new(hidden_size, 1).init(device),
            dropout: DropoutConfig::new(0.5).init(),
        }
    }

    /// Probability that each sample comes from the source domain,
    /// shape `[batch, 1]`.
    pub fn forward(&self, features: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.fc1.forward(features);
        let x = Relu::new().forward(x);
        let x = self.dropout.forward(x);
        let x = self.fc2.forward(x);
        let x = Relu::new().forward(x);
        let x = self.dropout.forward(x);
        sigmoid(self.out.forward(x))
    }
}

/// Losses produced by one adversarial forward pass.
pub struct AdversarialLosses<B: Backend> {
    /// Fooling loss for the classifier (inverted domain labels); gradients
    /// from this term must only be applied to the classifier parameters.
    pub transfer_loss: Tensor<B, 1>,
    /// Discriminator loss computed on detached features.
    pub discriminator_loss: Tensor<B, 1>,
}

/// Weighted domain-adversarial loss owning the discriminator.
pub struct DomainAdversarialLoss<B: Backend> {
    pub discriminator: DomainDiscriminator<B>,
    /// Discriminator accuracy on the latest batch, in percent.
    pub domain_accuracy: f64,
}

impl<B: Backend> DomainAdversarialLoss<B> {
    pub fn new(discriminator: DomainDiscriminator<B>) -> Self {
        Self {
            discriminator,
            domain_accuracy: 0.0,
        }
    }

    /// Compute the weighted adversarial losses for one batch pair.
    ///
    /// `w_s` and `w_t` are per-sample weights of shape `[batch]`, treated as
    /// constants (the caller detaches them from any score computation).
    /// Updates `domain_accuracy` as a side effect.
    pub fn forward(
        &mut self,
        f_s: Tensor<B, 2>,
        f_t: Tensor<B, 2>,
        w_s: Tensor<B, 1>,
        w_t: Tensor<B, 1>,
    ) -> AdversarialLosses<B> {
        // discriminator objective: source -> 1, target -> 0, features frozen
        let d_s_detached = self.discriminator.forward(f_s.clone().detach());
        let d_t_detached = self.discriminator.forward(f_t.clone().detach());
        let discriminator_loss = (weighted_bce(d_s_detached.clone(), true, w_s.clone())
            + weighted_bce(d_t_detached.clone(), false, w_t.clone()))
            * 0.5;

        self.domain_accuracy = batch_domain_accuracy(d_s_detached, d_t_detached);

        // fooling objective: inverted labels, gradients flow into features
        let d_s = self.discriminator.forward(f_s);
        let d_t = self.discriminator.forward(f_t);
        let transfer_loss = (weighted_bce(d_s, false, w_s) + weighted_bce(d_t, true, w_t)) * 0.5;

        AdversarialLosses {
            transfer_loss,
            discriminator_loss,
        }
    }
}

/// Per-sample weighted binary cross-entropy with mean reduction.
fn weighted_bce<B: Backend>(
    probs: Tensor<B, 2>,
    target_is_one: bool,
    weights: Tensor<B, 1>,
) -> Tensor<B, 1> {
    let [batch, _] = probs.dims();
    let p = probs.reshape([batch]).clamp(1e-7, 1.0 - 1e-7);
    let nll = if target_is_one {
        p.log().neg()
    } else {
        (p.neg() + 1.0).log().neg()
    };
    (nll * weights).mean()
}

fn batch_domain_accuracy<B: Backend>(d_s: Tensor<B, 2>, d_t: Tensor<B, 2>) -> f64 {
    let [batch_s, _] = d_s.dims();
    let [batch_t, _] = d_t.dims();

    let correct_s: f32 = d_s
        .greater_equal_elem(0.5)
        .int()
        .sum()
        .into_scalar()
        .elem::<i64>() as f32;
    let correct_t: f32 = d_t
        .lower_elem(0.5)
        .int()
        .sum()
        .into_scalar()
        .elem::<i64>() as f32;

    100.0 * (correct_s + correct_t) as f64 / (batch_s + batch_t) as f64
}
