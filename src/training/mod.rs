//! Training module for adversarial training
//!
//! This module provides:
//! - Training loop implementation
//! - Loss formulations (vanilla, wgan, iwgan, lsgan)
//! - Update rules with clipping and learning-rate decay
//! - Critic schedule and score history

mod losses;
mod metrics;
mod schedule;
mod trainer;
mod update;

pub use losses::{critic_score, generator_score, gradient_penalty, LossType, Scores};
pub use metrics::{EmaTracker, EpochScore, ScoreAccumulator, ScoreHistory};
pub use schedule::CriticSchedule;
pub use trainer::{CancelToken, Phase, Trainer, TrainingConfig, TrainingState};
pub use update::{decayed_rate, LearningRate, OptimizerKind, UpdateRule, WeightClip};
