//! In-memory datasets shared by all modalities
//!
//! Every item is a 2D frame of shape (height, width) where width is the time
//! (or column) axis along which batches may be cropped.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{GanError, Result};

/// Kind of data a run trains on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Handwritten digits, 28x28
    Mnist,
    /// Piano rolls, (pitches, steps)
    Proll,
    /// Character-level text, (alphabet, characters)
    Text,
}

impl DataType {
    /// Default crop length along the time axis (0 = no crop)
    pub fn default_length(&self) -> usize {
        match self {
            DataType::Mnist => 0,
            DataType::Proll | DataType::Text => 128,
        }
    }
}

impl FromStr for DataType {
    type Err = GanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "mnist" => Ok(DataType::Mnist),
            "proll" => Ok(DataType::Proll),
            "text" => Ok(DataType::Text),
            other => Err(GanError::config(format!(
                "Datatype {} not supported (expected mnist, proll or text)",
                other
            ))),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Mnist => "mnist",
            DataType::Proll => "proll",
            DataType::Text => "text",
        };
        f.write_str(name)
    }
}

/// A single training example
#[derive(Debug, Clone)]
pub enum Item {
    /// Dense values, (height, width)
    Dense(Array2<f32>),
    /// Symbol codes, one per column, expanded to a one-hot frame of
    /// `alphabet_size` rows on demand
    Encoded { codes: Vec<u8>, alphabet_size: usize },
}

impl Item {
    /// Number of rows of the frame
    pub fn height(&self) -> usize {
        match self {
            Item::Dense(a) => a.nrows(),
            Item::Encoded { alphabet_size, .. } => *alphabet_size,
        }
    }

    /// Number of columns (time steps / characters)
    pub fn width(&self) -> usize {
        match self {
            Item::Dense(a) => a.ncols(),
            Item::Encoded { codes, .. } => codes.len(),
        }
    }

    /// Append columns `start..start + len` of the frame to `out`, row-major
    pub fn write_window(&self, start: usize, len: usize, out: &mut Vec<f32>) {
        match self {
            Item::Dense(a) => {
                let window = a.slice(s![.., start..start + len]);
                out.extend(window.iter().copied());
            }
            Item::Encoded {
                codes,
                alphabet_size,
            } => {
                let window = &codes[start..start + len];
                for row in 0..*alphabet_size {
                    out.extend(
                        window
                            .iter()
                            .map(|&c| if c as usize == row { 1.0 } else { -1.0 }),
                    );
                }
            }
        }
    }
}

/// Labelled collection of frames
#[derive(Debug, Clone)]
pub struct SequenceDataset {
    items: Vec<Item>,
    labels: Vec<usize>,
    class_names: Vec<String>,
}

impl SequenceDataset {
    /// Build a dataset from items and dense class indices
    pub fn new(items: Vec<Item>, labels: Vec<usize>, class_names: Vec<String>) -> Result<Self> {
        if items.len() != labels.len() {
            return Err(GanError::shape(format!(
                "{} inputs but {} labels",
                items.len(),
                labels.len()
            )));
        }
        if items.is_empty() {
            return Err(GanError::shape("dataset is empty"));
        }
        if class_names.is_empty() {
            return Err(GanError::shape("dataset has no classes"));
        }
        if let Some(&bad) = labels.iter().find(|&&l| l >= class_names.len()) {
            return Err(GanError::shape(format!(
                "label {} out of range for {} classes",
                bad,
                class_names.len()
            )));
        }
        let height = items[0].height();
        if items.iter().any(|i| i.height() != height) {
            return Err(GanError::shape("items have different heights"));
        }

        Ok(Self {
            items,
            labels,
            class_names,
        })
    }

    /// Build a dataset from items and string labels; classes are sorted by name
    pub fn from_named_labels(items: Vec<Item>, names: Vec<String>) -> Result<Self> {
        let (labels, class_names) = index_labels(&names);
        Self::new(items, labels, class_names)
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of classes
    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    /// Class names, indexed by class id
    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    /// Frame height shared by all items
    pub fn height(&self) -> usize {
        self.items[0].height()
    }

    /// Shortest item width
    pub fn min_width(&self) -> usize {
        self.items.iter().map(Item::width).min().unwrap_or(0)
    }

    /// Item at index
    pub fn item(&self, idx: usize) -> &Item {
        &self.items[idx]
    }

    /// Class id at index
    pub fn label(&self, idx: usize) -> usize {
        self.labels[idx]
    }
}

/// Map label names to dense indices, with classes sorted by name
pub fn index_labels(names: &[String]) -> (Vec<usize>, Vec<String>) {
    let mut classes: BTreeMap<&str, usize> = BTreeMap::new();
    for name in names {
        classes.entry(name.as_str()).or_insert(0);
    }
    for (idx, value) in classes.values_mut().enumerate() {
        *value = idx;
    }
    let labels = names.iter().map(|n| classes[n.as_str()]).collect();
    let class_names = classes.keys().map(|k| k.to_string()).collect();
    (labels, class_names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_datatype_parse() {
        assert_eq!("MNIST".parse::<DataType>().unwrap(), DataType::Mnist);
        assert_eq!("proll".parse::<DataType>().unwrap(), DataType::Proll);
        let err = "audio".parse::<DataType>().unwrap_err();
        assert!(err.is_fatal_at_startup());
    }

    #[test]
    fn test_label_mismatch_rejected() {
        let items = vec![Item::Dense(Array2::zeros((2, 3)))];
        let err = SequenceDataset::new(items, vec![0, 1], vec!["a".into(), "b".into()]);
        assert!(matches!(err, Err(GanError::DataShape(_))));
    }

    #[test]
    fn test_index_labels_sorted() {
        let names = vec!["jazz".to_string(), "bach".to_string(), "jazz".to_string()];
        let (labels, classes) = index_labels(&names);
        assert_eq!(classes, vec!["bach", "jazz"]);
        assert_eq!(labels, vec![1, 0, 1]);
    }

    #[test]
    fn test_encoded_window_is_one_hot() {
        let item = Item::Encoded {
            codes: vec![0, 2, 1],
            alphabet_size: 3,
        };
        let mut out = Vec::new();
        item.write_window(1, 2, &mut out);
        // rows: symbol 0, 1, 2; columns: codes [2, 1]
        assert_eq!(out, vec![-1.0, -1.0, -1.0, 1.0, 1.0, -1.0]);
    }

    #[test]
    fn test_dense_window() {
        let item = Item::Dense(array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        let mut out = Vec::new();
        item.write_window(1, 2, &mut out);
        assert_eq!(out, vec![2.0, 3.0, 5.0, 6.0]);
    }
}
