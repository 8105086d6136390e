//! Architecture tags selectable from the command line

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{GanError, Result};

/// Generator architecture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorArch {
    /// Dense projection followed by two transposed convolutions
    Dcgan,
    /// Recurrent generator emitting one column per step
    Lstm,
}

/// Critic architecture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CriticArch {
    /// Two strided convolutions and a dense head
    Dcgan,
    /// Character-level convolutional stack with temporal pooling
    Crepe,
}

impl FromStr for GeneratorArch {
    type Err = GanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "dcgan" | "mnist" => Ok(GeneratorArch::Dcgan),
            "lstm" => Ok(GeneratorArch::Lstm),
            other => Err(GanError::config(format!(
                "Generator architecture {} not supported (expected dcgan or lstm)",
                other
            ))),
        }
    }
}

impl FromStr for CriticArch {
    type Err = GanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "dcgan" | "mnist" => Ok(CriticArch::Dcgan),
            "crepe" => Ok(CriticArch::Crepe),
            other => Err(GanError::config(format!(
                "Critic architecture {} not supported (expected dcgan or crepe)",
                other
            ))),
        }
    }
}

impl fmt::Display for GeneratorArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeneratorArch::Dcgan => f.write_str("dcgan"),
            GeneratorArch::Lstm => f.write_str("lstm"),
        }
    }
}

impl fmt::Display for CriticArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CriticArch::Dcgan => f.write_str("dcgan"),
            CriticArch::Crepe => f.write_str("crepe"),
        }
    }
}
