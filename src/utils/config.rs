//! Configuration management
//!
//! Provides unified configuration for data loading, model construction and
//! training. Files may be TOML or JSON; command-line flags override values
//! read from a file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tch::Device;

use crate::data::{
    load_mnist, load_piano_rolls, load_text_corpus, DataType, PianoRollOptions, SequenceDataset,
    StreamOptions, TextOptions,
};
use crate::error::{GanError, Result};
use crate::model::{CriticArch, CriticConfig, GanPair, GeneratorArch, GeneratorConfig};
use crate::training::TrainingConfig;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data configuration
    pub data: DataConfig,
    /// Model configuration
    pub model: ModelConfig,
    /// Training configuration
    pub training: TrainingConfig,
}

/// Data-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Kind of corpus
    pub datatype: DataType,
    /// MNIST directory, piano-roll root or text CSV file
    pub path: PathBuf,
    /// Keep at most this many pieces (0 = all)
    pub n_pieces: usize,
    /// Crop length along the time axis; the datatype default when unset
    pub length: Option<usize>,
    /// Batch size
    pub batch_size: usize,
    /// Map piano-roll cells to {-1, 1}
    pub boolean: bool,
    /// Keep only these piano-roll pitch rows
    pub pitch_range: Option<(usize, usize)>,
    /// Text column of the CSV corpus
    pub text_column: usize,
    /// Label column of the CSV corpus
    pub label_column: usize,
    /// Whether the CSV corpus has a header row
    pub has_headers: bool,
}

/// Model-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub critic: CriticArch,
    pub generator: GeneratorArch,
    /// Size of the noise vector
    pub noise_size: i64,
    /// Width of hidden dense / recurrent layers
    pub hidden: i64,
    /// Base number of convolution filters
    pub filters: i64,
    /// Condition both networks on the one-hot label
    pub conditional: bool,
    pub critic_batch_norm: bool,
    pub generator_batch_norm: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            datatype: DataType::Mnist,
            path: PathBuf::from("data/mnist"),
            n_pieces: 0,
            length: None,
            batch_size: 128,
            boolean: false,
            pitch_range: None,
            text_column: 2,
            label_column: 0,
            has_headers: false,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            critic: CriticArch::Dcgan,
            generator: GeneratorArch::Dcgan,
            noise_size: 256,
            hidden: 1024,
            filters: 64,
            conditional: false,
            critic_batch_norm: false,
            generator_batch_norm: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data: DataConfig::default(),
            model: ModelConfig::default(),
            training: TrainingConfig::default(),
        }
    }
}

impl DataConfig {
    /// Crop length in effect (0 = no crop)
    pub fn effective_length(&self) -> usize {
        self.length.unwrap_or_else(|| self.datatype.default_length())
    }

    /// Load the configured corpus
    pub fn load_dataset(&self) -> Result<SequenceDataset> {
        match self.datatype {
            DataType::Mnist => load_mnist(&self.path, self.n_pieces),
            DataType::Proll => load_piano_rolls(
                &self.path,
                &PianoRollOptions {
                    n_pieces: self.n_pieces,
                    pitch_range: self.pitch_range,
                    boolean: self.boolean,
                },
            ),
            DataType::Text => load_text_corpus(
                &self.path,
                &TextOptions {
                    data_col: self.text_column,
                    label_col: self.label_column,
                    has_headers: self.has_headers,
                    n_pieces: self.n_pieces,
                    min_length: self.effective_length(),
                },
            ),
        }
    }

    /// Options for an endless, shuffled training stream
    pub fn stream_options(&self, seed: u64) -> StreamOptions {
        StreamOptions {
            batch_size: self.batch_size,
            shuffle: true,
            length: self.effective_length(),
            forever: true,
            seed,
        }
    }
}

impl ModelConfig {
    /// Build the generator / critic pair for samples of `sample_shape`
    pub fn build(&self, sample_shape: [i64; 3], num_classes: i64, device: Device) -> Result<GanPair> {
        let num_classes = if self.conditional { num_classes } else { 0 };
        let gen_config = GeneratorConfig {
            arch: self.generator,
            noise_size: self.noise_size,
            hidden: self.hidden,
            filters: self.filters,
            batch_norm: self.generator_batch_norm,
            num_classes,
            sample_shape,
        };
        let crit_config = CriticConfig {
            arch: self.critic,
            hidden: self.hidden,
            filters: self.filters,
            batch_norm: self.critic_batch_norm,
            num_classes,
            sample_shape,
        };
        GanPair::new(gen_config, crit_config, device)
    }
}

impl Config {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from TOML file
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration from JSON file
    pub fn from_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to JSON file
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load from TOML or JSON depending on the extension
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        if is_toml(path.as_ref()) {
            Self::from_toml(path)
        } else {
            Self::from_json(path)
        }
    }

    /// Save as TOML or JSON depending on the extension
    pub fn save_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if is_toml(path.as_ref()) {
            self.save_toml(path)
        } else {
            self.save_json(path)
        }
    }

    /// Get device from configuration
    pub fn get_device(&self) -> Device {
        match self.training.device.to_lowercase().as_str() {
            "cuda" | "gpu" => {
                if tch::Cuda::is_available() {
                    Device::Cuda(0)
                } else {
                    tracing::warn!("CUDA requested but not available, falling back to CPU");
                    Device::Cpu
                }
            }
            _ => Device::Cpu,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.data.batch_size == 0 {
            return Err(GanError::config("Batch size must be > 0"));
        }
        if self.model.noise_size <= 0 || self.model.hidden <= 0 || self.model.filters <= 0 {
            return Err(GanError::config("Noise size, hidden size and filters must be > 0"));
        }
        if self.training.num_epochs == 0 {
            return Err(GanError::config("Number of epochs must be > 0"));
        }
        if self.training.critic_lr <= 0.0 || self.training.generator_lr <= 0.0 {
            return Err(GanError::config("Learning rates must be > 0"));
        }
        if self.training.clip < 0.0 || self.training.lambda < 0.0 {
            return Err(GanError::config("Clip and lambda must be >= 0"));
        }
        if self.training.grid <= 0 {
            return Err(GanError::config("Sample grid must be > 0"));
        }
        if self.training.schedule.regular == 0 || self.training.schedule.large == 0 {
            return Err(GanError::config("Critic iterations must be > 0"));
        }
        if let Some((lo, hi)) = self.data.pitch_range {
            if lo >= hi {
                return Err(GanError::config(format!("Empty pitch range {}..{}", lo, hi)));
            }
        }
        Ok(())
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension().map_or(false, |e| e == "toml")
}

/// Create default configuration file if it doesn't exist
pub fn ensure_config_exists<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    if path.exists() {
        Config::from_file(path)
    } else {
        let config = Config::default();
        config.save_file(path)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::LossType;
    use tempfile::tempdir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.data.batch_size, 128);
        assert_eq!(config.model.noise_size, 256);
        assert_eq!(config.training.loss, LossType::Wgan);
        assert_eq!(config.training.schedule.large, 100);
        assert_eq!(config.data.effective_length(), 0);
    }

    #[test]
    fn test_config_json_roundtrip() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let loaded: Config = serde_json::from_str(&json).unwrap();

        assert_eq!(config.data.datatype, loaded.data.datatype);
        assert_eq!(config.model.hidden, loaded.model.hidden);
    }

    #[test]
    fn test_config_toml_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.data.datatype = DataType::Proll;
        config.data.pitch_range = Some((32, 96));
        config.training.loss = LossType::Iwgan;
        config.save_file(&path).unwrap();

        let loaded = ensure_config_exists(&path).unwrap();
        assert_eq!(loaded.data.pitch_range, Some((32, 96)));
        assert_eq!(loaded.training.loss, LossType::Iwgan);
        assert_eq!(loaded.data.effective_length(), 128);
    }

    #[test]
    fn test_ensure_config_creates_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        ensure_config_exists(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.data.batch_size = 0;
        assert!(matches!(config.validate(), Err(GanError::Configuration(_))));
    }

    #[test]
    fn test_build_model_unconditional_ignores_classes() {
        let mut config = Config::default();
        config.model.noise_size = 4;
        config.model.hidden = 8;
        config.model.filters = 2;
        let gan = config.model.build([1, 28, 28], 10, Device::Cpu).unwrap();
        assert_eq!(gan.generator.config().num_classes, 0);
    }
}
