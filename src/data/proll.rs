//! Piano-roll corpus loader
//!
//! A corpus is a directory tree of `.npy` files, each holding one piece as a
//! `(pitches, steps)` matrix. The name of the directory containing a file is
//! used as its label (composer, genre, ...).

use std::fs;
use std::path::{Path, PathBuf};

use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};
use tch::{Kind, Tensor};
use tracing::{debug, info};

use super::dataset::{Item, SequenceDataset};
use crate::error::{GanError, Result};

/// Options for loading piano rolls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PianoRollOptions {
    /// Keep at most this many pieces (0 = all)
    pub n_pieces: usize,
    /// Keep pitch rows `lo..hi` only
    pub pitch_range: Option<(usize, usize)>,
    /// Map active cells to 1 and silent cells to -1
    pub boolean: bool,
}

impl Default for PianoRollOptions {
    fn default() -> Self {
        Self {
            n_pieces: 0,
            pitch_range: None,
            boolean: false,
        }
    }
}

/// Recursively collect `.npy` files below `root`, sorted by path
pub fn collect_npy_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().map_or(false, |e| e == "npy") {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Label of a piece: name of its parent directory
fn label_of(path: &Path) -> String {
    path.parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unlabelled".to_string())
}

/// Turn a raw roll into a frame, applying the pitch crop and boolean mode
pub fn prepare_roll(roll: Array2<f32>, options: &PianoRollOptions) -> Result<Array2<f32>> {
    let roll = match options.pitch_range {
        Some((lo, hi)) => {
            if lo >= hi || hi > roll.nrows() {
                return Err(GanError::shape(format!(
                    "pitch range {}..{} invalid for a roll with {} pitches",
                    lo,
                    hi,
                    roll.nrows()
                )));
            }
            roll.slice(s![lo..hi, ..]).to_owned()
        }
        None => roll,
    };

    if options.boolean {
        Ok(roll.mapv(|v| if v > 0.0 { 1.0 } else { -1.0 }))
    } else {
        Ok(roll)
    }
}

/// Read a single `(pitches, steps)` roll
fn read_roll(path: &Path) -> Result<Array2<f32>> {
    let tensor = Tensor::read_npy(path)?.to_kind(Kind::Float);
    let size = tensor.size();
    if size.len() != 2 {
        return Err(GanError::shape(format!(
            "{} has shape {:?}, expected (pitches, steps)",
            path.display(),
            size
        )));
    }
    let values = Vec::<f32>::try_from(&tensor.flatten(0, -1))?;
    Array2::from_shape_vec((size[0] as usize, size[1] as usize), values)
        .map_err(|e| GanError::shape(e.to_string()))
}

/// Load every piano roll below `root`
pub fn load_piano_rolls<P: AsRef<Path>>(
    root: P,
    options: &PianoRollOptions,
) -> Result<SequenceDataset> {
    let root = root.as_ref();
    let mut files = collect_npy_files(root)?;
    if options.n_pieces > 0 {
        files.truncate(options.n_pieces);
    }
    if files.is_empty() {
        return Err(GanError::shape(format!(
            "no .npy files found under {}",
            root.display()
        )));
    }

    let mut items = Vec::with_capacity(files.len());
    let mut names = Vec::with_capacity(files.len());
    for path in &files {
        debug!("Reading {}", path.display());
        let roll = prepare_roll(read_roll(path)?, options)?;
        items.push(Item::Dense(roll));
        names.push(label_of(path));
    }

    let dataset = SequenceDataset::from_named_labels(items, names)?;
    info!(
        "Loaded {} piano rolls ({} classes, {} pitches) from {}",
        dataset.len(),
        dataset.num_classes(),
        dataset.height(),
        root.display()
    );
    Ok(dataset)
}
