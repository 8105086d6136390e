//! Data module for loading training corpora and batching them
//!
//! This module provides:
//! - Labelled in-memory datasets of 2D frames
//! - MNIST, piano-roll and character-level text loaders
//! - Seeded minibatch streams with random crops

mod batches;
mod dataset;
mod mnist;
mod proll;
mod text;

pub use batches::{Batch, BatchSource, MinibatchStream, StreamOptions};
pub use dataset::{index_labels, DataType, Item, SequenceDataset};
pub use mnist::{load_mnist, MNIST_SIDE};
pub use proll::{collect_npy_files, load_piano_rolls, prepare_roll, PianoRollOptions};
pub use text::{load_text_corpus, CharEncoder, TextOptions};
