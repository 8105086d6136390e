//! # Wasserstein GANs for Images, Piano Rolls and Text
//!
//! This crate provides adversarial training loops for generative models over
//! MNIST digits, piano-roll music and character-level text, with vanilla,
//! Wasserstein, gradient-penalty and least-squares losses.
//!
//! ## Modules
//!
//! - `data`: Corpus loaders and minibatch streams
//! - `model`: Generator and critic architectures
//! - `training`: Training loop, losses and update rules
//! - `utils`: Configuration, trial folders, snapshots and rendering

pub mod data;
pub mod error;
pub mod model;
pub mod training;
pub mod utils;

pub use data::{Batch, BatchSource, DataType, MinibatchStream, SequenceDataset, StreamOptions};
pub use error::{GanError, Result};
pub use model::{CriticArch, GanPair, GeneratorArch};
pub use training::{CancelToken, LossType, ScoreHistory, Trainer, TrainingConfig};
pub use utils::{Config, TrialLayout};
