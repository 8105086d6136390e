//! Loss functions for GAN training
//!
//! Every loss is expressed as a score to be minimized. Four formulations are
//! supported: cross-entropy with one-sided label smoothing (`vanilla`),
//! Wasserstein (`wgan`), Wasserstein with gradient penalty (`iwgan`) and
//! least squares (`lsgan`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tch::{Kind, Reduction, Tensor};

use super::update::OptimizerKind;
use crate::error::{GanError, Result};

/// Smoothed target for real samples in the vanilla loss
pub const SMOOTH_REAL: f64 = 0.9;
/// Smoothed target for fake samples in the vanilla loss
pub const SMOOTH_FAKE: f64 = 0.1;

/// Loss formulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LossType {
    Vanilla,
    Wgan,
    Iwgan,
    Lsgan,
}

impl LossType {
    /// Whether the critic objective carries a gradient penalty
    pub fn uses_gradient_penalty(&self) -> bool {
        matches!(self, LossType::Iwgan)
    }

    /// Whether critic weights are clipped after each update (given clip > 0)
    pub fn uses_clipping(&self) -> bool {
        matches!(self, LossType::Wgan | LossType::Lsgan)
    }

    /// Optimizer used when the configuration does not name one
    pub fn default_optimizer(&self) -> OptimizerKind {
        match self {
            LossType::Vanilla => OptimizerKind::AdamDcgan,
            LossType::Iwgan => OptimizerKind::Adam,
            LossType::Wgan | LossType::Lsgan => OptimizerKind::RmsProp,
        }
    }
}

impl FromStr for LossType {
    type Err = GanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "vanilla" => Ok(LossType::Vanilla),
            "wgan" => Ok(LossType::Wgan),
            "iwgan" => Ok(LossType::Iwgan),
            "lsgan" => Ok(LossType::Lsgan),
            other => Err(GanError::config(format!(
                "Loss type {} not supported (expected vanilla, wgan, iwgan or lsgan)",
                other
            ))),
        }
    }
}

impl fmt::Display for LossType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LossType::Vanilla => "vanilla",
            LossType::Wgan => "wgan",
            LossType::Iwgan => "iwgan",
            LossType::Lsgan => "lsgan",
        };
        f.write_str(name)
    }
}

fn bce_with_target(logits: &Tensor, target: f64) -> Tensor {
    let targets = Tensor::full_like(logits, target);
    logits.binary_cross_entropy_with_logits::<Tensor>(&targets, None, None, Reduction::Mean)
}

/// Generator score on critic outputs for generated samples
pub fn generator_score(loss: LossType, fake_out: &Tensor) -> Tensor {
    match loss {
        LossType::Vanilla => bce_with_target(fake_out, SMOOTH_REAL),
        LossType::Wgan | LossType::Iwgan => -fake_out.mean(Kind::Float),
        LossType::Lsgan => (fake_out - 1.0).square().mean(Kind::Float),
    }
}

/// Critic score on critic outputs for real and generated samples
pub fn critic_score(loss: LossType, real_out: &Tensor, fake_out: &Tensor) -> Tensor {
    match loss {
        LossType::Vanilla => bce_with_target(real_out, SMOOTH_REAL) + bce_with_target(fake_out, SMOOTH_FAKE),
        LossType::Wgan | LossType::Iwgan => fake_out.mean(Kind::Float) - real_out.mean(Kind::Float),
        LossType::Lsgan => {
            (real_out - 1.0).square().mean(Kind::Float) + fake_out.square().mean(Kind::Float)
        }
    }
}

/// Gradient penalty `lambda * mean((||grad critic(x)||_2 - 1)^2)`
///
/// `x` interpolates between `real` and `fake` with one uniform weight per
/// example. The gradient graph is kept so the penalty itself can be
/// differentiated.
///
/// # Arguments
///
/// * `critic` - Critic forward pass (training mode)
/// * `real` - Real batch (batch_size, 1, height, width)
/// * `fake` - Generated batch, same shape
/// * `lambda` - Penalty coefficient
pub fn gradient_penalty<F>(critic: F, real: &Tensor, fake: &Tensor, lambda: f64) -> Tensor
where
    F: Fn(&Tensor) -> Tensor,
{
    let batch_size = real.size()[0];
    let alpha = Tensor::rand([batch_size, 1, 1, 1], (Kind::Float, real.device()));
    let interpolates = (real + &alpha * (fake - real)).detach().set_requires_grad(true);

    let out = critic(&interpolates);
    let gradients = Tensor::run_backward(&[out.sum(Kind::Float)], &[&interpolates], true, true);
    let gradients = &gradients[0];

    let slopes = gradients
        .square()
        .sum_dim_intlist(&[1i64, 2, 3][..], false, Kind::Float)
        .sqrt();
    (slopes - 1.0).square().mean(Kind::Float) * lambda
}

/// Score and penalty of one critic or generator evaluation
#[derive(Debug)]
pub struct Scores {
    /// Objective without penalty
    pub score: Tensor,
    /// Penalty term (zero when unused)
    pub penalty: Tensor,
}

impl Scores {
    /// Score with no penalty attached
    pub fn plain(score: Tensor) -> Self {
        let penalty = score.zeros_like();
        Self { score, penalty }
    }

    /// Quantity handed to the optimizer
    pub fn objective(&self) -> Tensor {
        &self.score + &self.penalty
    }

    /// `(score, penalty)` as plain numbers
    pub fn values(&self) -> (f64, f64) {
        (self.score.double_value(&[]), self.penalty.double_value(&[]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tch::Device;

    fn column(values: &[f32]) -> Tensor {
        Tensor::from_slice(values).view([-1, 1])
    }

    #[test]
    fn test_parse_loss_type() {
        assert_eq!("IWGAN".parse::<LossType>().unwrap(), LossType::Iwgan);
        assert!(matches!("hinge".parse::<LossType>(), Err(GanError::Configuration(_))));
    }

    #[test]
    fn test_wasserstein_scores() {
        let real = column(&[1.0, 3.0]);
        let fake = column(&[-1.0, 0.0]);

        let c = critic_score(LossType::Wgan, &real, &fake).double_value(&[]);
        let g = generator_score(LossType::Iwgan, &fake).double_value(&[]);
        assert_relative_eq!(c, -0.5 - 2.0, epsilon = 1e-6);
        assert_relative_eq!(g, 0.5, epsilon = 1e-6);
        assert_relative_eq!(
            critic_score(LossType::Iwgan, &real, &fake).double_value(&[]),
            c,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_least_squares_scores() {
        let real = column(&[1.0, 3.0]);
        let fake = column(&[0.0, 2.0]);

        // mean((r-1)^2) = (0 + 4) / 2, mean(f^2) = (0 + 4) / 2
        let c = critic_score(LossType::Lsgan, &real, &fake).double_value(&[]);
        assert_relative_eq!(c, 4.0, epsilon = 1e-6);
        // mean((f-1)^2) = (1 + 1) / 2
        let g = generator_score(LossType::Lsgan, &fake).double_value(&[]);
        assert_relative_eq!(g, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_vanilla_prefers_confident_critic() {
        let confident = critic_score(
            LossType::Vanilla,
            &Tensor::full([4, 1], 2.0, (Kind::Float, Device::Cpu)),
            &Tensor::full([4, 1], -2.0, (Kind::Float, Device::Cpu)),
        );
        let confused = critic_score(
            LossType::Vanilla,
            &Tensor::zeros([4, 1], (Kind::Float, Device::Cpu)),
            &Tensor::zeros([4, 1], (Kind::Float, Device::Cpu)),
        );
        assert!(confident.double_value(&[]) < confused.double_value(&[]));

        // sigmoid(0) = 0.5, so each smoothed BCE term is ln 2
        let ln2 = std::f64::consts::LN_2;
        assert_relative_eq!(confused.double_value(&[]), 2.0 * ln2, epsilon = 1e-6);
        let zeros = Tensor::zeros([4, 1], (Kind::Float, Device::Cpu));
        assert_relative_eq!(
            generator_score(LossType::Vanilla, &zeros).double_value(&[]),
            ln2,
            epsilon = 1e-6
        );

        // logit 2 against target 0.9: softplus(2) - 0.9 * 2
        let softplus = |x: f64| (1.0 + x.exp()).ln();
        let expected = 2.0 * (softplus(2.0) - 0.9 * 2.0);
        assert_relative_eq!(confident.double_value(&[]), expected, epsilon = 1e-5);
    }

    #[test]
    fn test_gradient_penalty_of_linear_critic() {
        // critic(x) = sum(x) has gradient of all ones, norm sqrt(n)
        let real = Tensor::zeros([3, 1, 2, 2], (Kind::Float, Device::Cpu));
        let fake = Tensor::ones([3, 1, 2, 2], (Kind::Float, Device::Cpu));
        let penalty = gradient_penalty(
            |x| x.sum_dim_intlist(&[1i64, 2, 3][..], false, Kind::Float),
            &real,
            &fake,
            10.0,
        );
        // (sqrt(4) - 1)^2 * 10
        assert_relative_eq!(penalty.double_value(&[]), 10.0, epsilon = 1e-5);
    }

    #[test]
    fn test_clipping_follows_penalty() {
        assert!(LossType::Wgan.uses_clipping());
        assert!(!LossType::Iwgan.uses_clipping());
        assert!(LossType::Lsgan.uses_clipping());
        assert!(!LossType::Vanilla.uses_clipping());
        assert_eq!(LossType::Vanilla.default_optimizer(), OptimizerKind::AdamDcgan);
        assert_eq!(LossType::Iwgan.default_optimizer(), OptimizerKind::Adam);
        assert_eq!(LossType::Lsgan.default_optimizer(), OptimizerKind::RmsProp);
    }
}
