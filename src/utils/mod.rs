//! Utility module with helper functions
//!
//! This module provides:
//! - Configuration handling
//! - Trial folders and snapshot save/load utilities
//! - Sample grid rendering

pub mod checkpoint;
mod config;
pub mod render;

pub use checkpoint::{find_latest_snapshot, SnapshotMeta, TrialLayout};
pub use config::{ensure_config_exists, Config, DataConfig, ModelConfig};
pub use render::save_sample_grid;
