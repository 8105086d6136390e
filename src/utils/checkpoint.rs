//! Trial folders and snapshot save/load utilities
//!
//! A trial folder is laid out as
//!
//! ```text
//! {root}/{datatype}_{loss}_{YYYYmmdd-HHMMSS}/
//!     args.txt  config.json  critic_scores.npy  generator_scores.npy  scores.csv
//!     models/   gen_{epoch}.npz  crit_{epoch}.npz  meta_{epoch}.json
//!     images/   samples_{epoch}.png
//!     samples/  samples_{epoch}.npy
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::data::DataType;
use crate::error::{GanError, Result};
use crate::model::GanPair;
use crate::training::{EpochScore, LossType, TrainingState};

/// Paths of one training run
#[derive(Debug, Clone)]
pub struct TrialLayout {
    root: PathBuf,
}

impl TrialLayout {
    /// Create a fresh, timestamped trial folder under `root`
    pub fn create<P: AsRef<Path>>(root: P, datatype: DataType, loss: LossType) -> Result<Self> {
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let dir = root.as_ref().join(format!("{}_{}_{}", datatype, loss, stamp));
        let layout = Self { root: dir };
        layout.ensure_dirs()?;
        info!("Created trial folder {}", layout.root.display());
        Ok(layout)
    }

    /// Use an existing trial folder
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let root = dir.as_ref().to_path_buf();
        if !root.join("models").is_dir() {
            return Err(GanError::config(format!(
                "{} is not a trial folder (no models/ directory)",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    fn ensure_dirs(&self) -> Result<()> {
        for sub in ["models", "images", "samples"] {
            fs::create_dir_all(self.root.join(sub))?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn models_dir(&self) -> PathBuf {
        self.root.join("models")
    }

    pub fn generator_path(&self, epoch: usize) -> PathBuf {
        self.models_dir().join(format!("gen_{}.npz", epoch))
    }

    pub fn critic_path(&self, epoch: usize) -> PathBuf {
        self.models_dir().join(format!("crit_{}.npz", epoch))
    }

    pub fn meta_path(&self, epoch: usize) -> PathBuf {
        self.models_dir().join(format!("meta_{}.json", epoch))
    }

    pub fn image_path(&self, epoch: usize) -> PathBuf {
        self.root.join("images").join(format!("samples_{}.png", epoch))
    }

    pub fn samples_path(&self, epoch: usize) -> PathBuf {
        self.root.join("samples").join(format!("samples_{}.npy", epoch))
    }

    pub fn scores_csv_path(&self) -> PathBuf {
        self.root.join("scores.csv")
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.json")
    }

    /// Record the invoking command line in `args.txt`
    pub fn write_args<I, S>(&self, args: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let line = args
            .into_iter()
            .map(|a| a.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(" ");
        fs::write(self.root.join("args.txt"), line + "\n")?;
        Ok(())
    }
}

/// Metadata stored next to each snapshot pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMeta {
    /// Epoch the snapshot was taken after (1-based)
    pub epoch: usize,
    /// Generator updates performed so far
    pub generator_iterations: usize,
    /// Critic learning rate for the next epoch
    pub critic_rate: f64,
    /// Generator learning rate for the next epoch
    pub generator_rate: f64,
    /// Mean critic score of the epoch
    pub critic_score: f64,
    /// Mean generator score of the epoch
    pub generator_score: f64,
    /// Sample shape (channels, height, width) the networks were built for
    pub sample_shape: [i64; 3],
    /// Condition classes of the generator (0 = unconditional)
    pub num_classes: i64,
    /// Timestamp of snapshot
    pub timestamp: String,
}

impl SnapshotMeta {
    /// Describe the current training state
    pub fn from_state(
        state: &TrainingState,
        gan: &GanPair,
        critic: EpochScore,
        generator: EpochScore,
    ) -> Self {
        let gen_config = gan.generator.config();
        Self {
            epoch: state.epoch,
            generator_iterations: state.generator_iterations,
            critic_rate: state.critic_rate.current(),
            generator_rate: state.generator_rate.current(),
            critic_score: critic.score,
            generator_score: generator.score,
            sample_shape: gen_config.sample_shape,
            num_classes: gen_config.num_classes,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Save generator, critic and metadata for `meta.epoch`
pub fn save_snapshot(layout: &TrialLayout, gan: &GanPair, meta: &SnapshotMeta) -> Result<()> {
    gan.save_snapshot(layout.generator_path(meta.epoch), layout.critic_path(meta.epoch))?;
    meta.save(layout.meta_path(meta.epoch))?;
    info!("Saved snapshot at epoch {}", meta.epoch);
    Ok(())
}

/// Load generator, critic and metadata of `epoch` into `gan`
pub fn load_snapshot(layout: &TrialLayout, gan: &GanPair, epoch: usize) -> Result<SnapshotMeta> {
    gan.load_snapshot(layout.generator_path(epoch), layout.critic_path(epoch))?;
    let meta = SnapshotMeta::load(layout.meta_path(epoch))?;
    info!("Loaded snapshot from {} (epoch {})", layout.root().display(), meta.epoch);
    Ok(meta)
}

/// Epochs with a complete generator / critic pair, ascending
pub fn list_snapshots<P: AsRef<Path>>(models_dir: P) -> Vec<usize> {
    let models_dir = models_dir.as_ref();
    let mut epochs: Vec<usize> = fs::read_dir(models_dir)
        .into_iter()
        .flatten()
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let name = e.file_name();
            let name = name.to_str()?;
            name.strip_prefix("gen_")?.strip_suffix(".npz")?.parse().ok()
        })
        .filter(|epoch| models_dir.join(format!("crit_{}.npz", epoch)).exists())
        .collect();
    epochs.sort_unstable();
    epochs
}

/// Highest epoch with a complete snapshot pair
pub fn find_latest_snapshot<P: AsRef<Path>>(models_dir: P) -> Option<usize> {
    list_snapshots(models_dir).last().copied()
}
