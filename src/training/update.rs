//! Parameter update rules
//!
//! Wraps a `tch` optimizer together with the learning-rate cell and the
//! optional weight clipping applied after every step.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tch::nn::{self, OptimizerConfig, VarStore};
use tch::Tensor;

use crate::error::{GanError, Result};

/// Optimizer family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    /// Adam with beta1 = 0.5, beta2 = 0.9
    Adam,
    /// Adam with beta1 = 0.5 and the usual beta2 = 0.999
    #[serde(rename = "adam_dcgan")]
    AdamDcgan,
    /// RMSProp with rho = 0.9, eps = 1e-6
    RmsProp,
}

impl OptimizerKind {
    /// Build an optimizer over every trainable variable of `vs`
    pub fn build(&self, vs: &VarStore, lr: f64) -> Result<nn::Optimizer> {
        let optimizer = match self {
            OptimizerKind::Adam => nn::Adam {
                beta1: 0.5,
                beta2: 0.9,
                ..Default::default()
            }
            .build(vs, lr)?,
            OptimizerKind::AdamDcgan => nn::Adam {
                beta1: 0.5,
                beta2: 0.999,
                ..Default::default()
            }
            .build(vs, lr)?,
            OptimizerKind::RmsProp => nn::RmsProp {
                alpha: 0.9,
                eps: 1e-6,
                ..Default::default()
            }
            .build(vs, lr)?,
        };
        Ok(optimizer)
    }
}

impl FromStr for OptimizerKind {
    type Err = GanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "adam" => Ok(OptimizerKind::Adam),
            "adam_dcgan" => Ok(OptimizerKind::AdamDcgan),
            "rmsprop" => Ok(OptimizerKind::RmsProp),
            other => Err(GanError::config(format!(
                "Optimizer {} not supported (expected adam, adam_dcgan or rmsprop)",
                other
            ))),
        }
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizerKind::Adam => f.write_str("adam"),
            OptimizerKind::AdamDcgan => f.write_str("adam_dcgan"),
            OptimizerKind::RmsProp => f.write_str("rmsprop"),
        }
    }
}

/// Rate after 1-based epoch `epoch`, or `None` before decay starts
///
/// Decay starts once `epoch >= num_epochs / 2` and reaches zero at the last
/// epoch: `initial * 2 * (1 - epoch / num_epochs)`.
pub fn decayed_rate(initial: f64, epoch: usize, num_epochs: usize) -> Option<f64> {
    if num_epochs == 0 || epoch < num_epochs / 2 {
        return None;
    }
    let progress = epoch as f64 / num_epochs as f64;
    Some(initial * 2.0 * (1.0 - progress))
}

/// Mutable learning rate with its starting value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LearningRate {
    initial: f64,
    current: f64,
}

impl LearningRate {
    pub fn new(initial: f64) -> Self {
        Self {
            initial,
            current: initial,
        }
    }

    pub fn initial(&self) -> f64 {
        self.initial
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn set(&mut self, rate: f64) {
        self.current = rate;
    }

    /// Apply the linear decay schedule after `epoch` completes
    pub fn decay(&mut self, epoch: usize, num_epochs: usize) {
        if let Some(rate) = decayed_rate(self.initial, epoch, num_epochs) {
            self.current = rate;
        }
    }
}

/// Element-wise clamp of weights to `[-bound, bound]`
#[derive(Debug, Clone, Copy)]
pub struct WeightClip {
    bound: f64,
}

impl WeightClip {
    /// `None` when `bound` is not positive
    pub fn new(bound: f64) -> Option<Self> {
        (bound > 0.0).then_some(Self { bound })
    }

    pub fn bound(&self) -> f64 {
        self.bound
    }

    /// Clamp every tensor in place
    pub fn apply(&self, params: &[Tensor]) {
        tch::no_grad(|| {
            for param in params {
                let mut param = param.shallow_clone();
                let _ = param.clamp_(-self.bound, self.bound);
            }
        });
    }
}

/// Optimizer and post-step clipping for one network
///
/// The learning rate is not owned here: the caller passes its
/// [`LearningRate`] on every step and the value is pushed into the optimizer.
pub struct UpdateRule {
    optimizer: nn::Optimizer,
    clip: Option<WeightClip>,
    clip_targets: Vec<Tensor>,
}

impl UpdateRule {
    /// Create an update rule for the variables of `vs`
    ///
    /// # Arguments
    ///
    /// * `kind` - Optimizer family
    /// * `vs` - Variable store of the network being updated
    /// * `rate` - Starting learning rate
    /// * `clip` - Clipping to apply after each step, if any
    /// * `clip_targets` - Tensors to clip (regularizable weights)
    pub fn new(
        kind: OptimizerKind,
        vs: &VarStore,
        rate: &LearningRate,
        clip: Option<WeightClip>,
        clip_targets: Vec<Tensor>,
    ) -> Result<Self> {
        let optimizer = kind.build(vs, rate.current())?;
        Ok(Self {
            optimizer,
            clip,
            clip_targets,
        })
    }

    /// Minimize `objective` by one step at `rate`, then clip
    pub fn step(&mut self, objective: &Tensor, rate: &LearningRate) {
        self.optimizer.set_lr(rate.current());
        self.optimizer.backward_step(objective);
        if let Some(clip) = &self.clip {
            clip.apply(&self.clip_targets);
        }
    }

    /// Whether weights are clipped after each step
    pub fn clips(&self) -> bool {
        self.clip.is_some()
    }
}
