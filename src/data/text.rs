//! Character-level text corpus loader
//!
//! Texts come from one column of a CSV file and labels from another. Each
//! character is mapped to a code by [`CharEncoder`]; items are stored as codes
//! and only expanded to one-hot frames when a batch is assembled.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::dataset::{Item, SequenceDataset};
use crate::error::{GanError, Result};

/// Maps characters to codes in `0..alphabet_size`
#[derive(Debug, Clone, Copy)]
pub struct CharEncoder {
    unknown: u8,
}

impl CharEncoder {
    /// ASCII code points below 127 keep their value; everything else is 127
    pub fn ascii() -> Self {
        Self { unknown: 127 }
    }

    /// Number of distinct codes
    pub fn alphabet_size(&self) -> usize {
        self.unknown as usize + 1
    }

    /// Code for a single character
    pub fn encode_char(&self, c: char) -> u8 {
        let code = c as u32;
        if code < self.unknown as u32 {
            code as u8
        } else {
            self.unknown
        }
    }

    /// Encode a text, repeating it until it is at least `min_len` long
    pub fn encode(&self, text: &str, min_len: usize) -> Vec<u8> {
        let mut codes: Vec<u8> = text.chars().map(|c| self.encode_char(c)).collect();
        if codes.is_empty() {
            return codes;
        }
        let original = codes.len();
        let mut i = 0;
        while codes.len() < min_len {
            codes.push(codes[i % original]);
            i += 1;
        }
        codes
    }
}

/// Options for loading a text corpus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextOptions {
    /// Column holding the text
    pub data_col: usize,
    /// Column holding the label
    pub label_col: usize,
    /// Whether the first row is a header
    pub has_headers: bool,
    /// Keep at most this many rows (0 = all)
    pub n_pieces: usize,
    /// Minimum encoded length; shorter texts are padded by repetition
    pub min_length: usize,
}

impl Default for TextOptions {
    fn default() -> Self {
        Self {
            data_col: 2,
            label_col: 0,
            has_headers: false,
            n_pieces: 0,
            min_length: 128,
        }
    }
}

/// Load a CSV text corpus
pub fn load_text_corpus<P: AsRef<Path>>(path: P, options: &TextOptions) -> Result<SequenceDataset> {
    let path = path.as_ref();
    let encoder = CharEncoder::ascii();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(options.has_headers)
        .flexible(true)
        .from_path(path)?;

    let mut items = Vec::new();
    let mut names = Vec::new();
    let mut skipped = 0usize;

    for record in reader.records() {
        if options.n_pieces > 0 && items.len() >= options.n_pieces {
            break;
        }
        let record = record?;
        let (text, label) = match (record.get(options.data_col), record.get(options.label_col)) {
            (Some(text), Some(label)) => (text, label),
            _ => {
                return Err(GanError::shape(format!(
                    "row {} has {} columns, need columns {} and {}",
                    items.len() + skipped + 1,
                    record.len(),
                    options.data_col,
                    options.label_col
                )))
            }
        };
        if text.is_empty() {
            skipped += 1;
            continue;
        }
        items.push(Item::Encoded {
            codes: encoder.encode(text, options.min_length),
            alphabet_size: encoder.alphabet_size(),
        });
        names.push(label.trim().to_string());
    }

    if skipped > 0 {
        warn!("Skipped {} empty texts", skipped);
    }

    let dataset = SequenceDataset::from_named_labels(items, names)?;
    info!(
        "Loaded {} texts ({} classes) from {}",
        dataset.len(),
        dataset.num_classes(),
        path.display()
    );
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_encoder_unknown_slot() {
        let encoder = CharEncoder::ascii();
        assert_eq!(encoder.alphabet_size(), 128);
        assert_eq!(encoder.encode_char('a'), 97);
        assert_eq!(encoder.encode_char('é'), 127);
        assert_eq!(encoder.encode_char('\u{7f}'), 127);
    }

    #[test]
    fn test_encode_pads_by_repetition() {
        let encoder = CharEncoder::ascii();
        assert_eq!(encoder.encode("ab", 5), vec![97, 98, 97, 98, 97]);
        assert_eq!(encoder.encode("abc", 2).len(), 3);
    }

    #[test]
    fn test_load_text_corpus() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "3,\"title\",\"stocks rally\"").unwrap();
        writeln!(file, "1,\"title\",\"world news\"").unwrap();
        writeln!(file, "3,\"title\",\"\"").unwrap();
        writeln!(file, "2,\"title\",\"football\"").unwrap();

        let options = TextOptions {
            min_length: 16,
            ..Default::default()
        };
        let dataset = load_text_corpus(file.path(), &options).unwrap();

        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.height(), 128);
        assert_eq!(dataset.min_width(), 16);
        assert_eq!(dataset.class_names(), &["1", "2", "3"]);
        assert_eq!(dataset.label(0), 2);
    }
}
