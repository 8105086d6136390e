//! Model module containing GAN architecture components
//!
//! This module provides:
//! - Generator networks (DCGAN-style and LSTM)
//! - Critic networks (DCGAN-style and crepe)
//! - A transposed convolution with full output sizing
//! - The generator / critic pair with snapshot support

mod arch;
mod critic;
mod deconv;
mod gan;
mod generator;

pub use arch::{CriticArch, GeneratorArch};
pub use critic::{Critic, CriticConfig};
pub use deconv::{deconv2d, Deconv2d, DeconvConfig};
pub use gan::{GanPair, Network};
pub use generator::{Generator, GeneratorConfig};
