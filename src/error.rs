//! Error types for GAN training

use thiserror::Error;

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, GanError>;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum GanError {
    /// Unknown datatype, loss type or architecture, or an invalid setting
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Batch or dataset does not have the shape the run asked for
    #[error("Data shape error: {0}")]
    DataShape(String),

    /// A score went NaN or infinite
    #[error("Non-finite {what} ({value}) at epoch {epoch}, generator iteration {iteration}")]
    NumericalInstability {
        what: &'static str,
        value: f64,
        epoch: usize,
        iteration: usize,
    },

    /// libtorch error
    #[error("Torch error: {0}")]
    Torch(#[from] tch::TchError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// TOML write error
    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl GanError {
    /// Shorthand for a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        GanError::Configuration(msg.into())
    }

    /// Shorthand for a data shape error
    pub fn shape(msg: impl Into<String>) -> Self {
        GanError::DataShape(msg.into())
    }

    /// Whether the error comes from a bad setup rather than from training itself
    pub fn is_fatal_at_startup(&self) -> bool {
        matches!(self, GanError::Configuration(_))
    }
}
