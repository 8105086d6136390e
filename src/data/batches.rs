//! Minibatch streams for GAN training
//!
//! Provides batching over a [`SequenceDataset`] with support for:
//! - Seeded shuffling, redone each time the dataset is exhausted
//! - Random fixed-width crops along the time axis
//! - Infinite (`forever`) or single-pass iteration
//!
//! The final incomplete batch of every pass is dropped.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tch::{Device, Tensor};

use super::dataset::SequenceDataset;
use crate::error::{GanError, Result};

/// One minibatch
#[derive(Debug)]
pub struct Batch {
    /// Inputs of shape (batch_size, 1, height, width)
    pub input: Tensor,
    /// One-hot labels of shape (batch_size, num_classes)
    pub label: Tensor,
}

impl Batch {
    /// Number of examples in the batch
    pub fn size(&self) -> i64 {
        self.input.size()[0]
    }
}

/// Anything that can feed the training loop with batches
pub trait BatchSource {
    /// Pull the next batch; `Ok(None)` once a bounded source is exhausted
    fn next_batch(&mut self) -> Result<Option<Batch>>;

    /// Shape (channels, height, width) of a single input
    fn sample_shape(&self) -> [i64; 3];

    /// Number of label classes
    fn num_classes(&self) -> i64;

    /// Number of full batches in one pass over the data
    fn batches_per_pass(&self) -> usize;
}

/// Options for [`MinibatchStream`]
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Examples per batch
    pub batch_size: usize,
    /// Reshuffle the index order on every pass
    pub shuffle: bool,
    /// Crop width; 0 keeps full items (which must then share a width)
    pub length: usize,
    /// Restart after the last pass instead of stopping
    pub forever: bool,
    /// Seed for shuffling and crop offsets
    pub seed: u64,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            batch_size: 128,
            shuffle: true,
            length: 0,
            forever: true,
            seed: 1234,
        }
    }
}

/// Stateful batch iterator that owns its shuffle order and cursor
pub struct MinibatchStream {
    dataset: SequenceDataset,
    options: StreamOptions,
    /// Current index permutation
    indices: Vec<usize>,
    /// Position of the next batch in `indices`
    cursor: usize,
    /// Completed passes
    passes: usize,
    rng: StdRng,
    device: Device,
}

impl MinibatchStream {
    /// Create a new stream
    ///
    /// Fails when the dataset cannot produce a single full batch, when an item
    /// is shorter than the crop length, or when uncropped items differ in width.
    pub fn new(dataset: SequenceDataset, options: StreamOptions, device: Device) -> Result<Self> {
        if options.batch_size == 0 {
            return Err(GanError::config("batch size must be > 0"));
        }
        if dataset.len() < options.batch_size {
            return Err(GanError::shape(format!(
                "{} examples cannot fill a batch of {}",
                dataset.len(),
                options.batch_size
            )));
        }
        if options.length > 0 {
            let shortest = dataset.min_width();
            if shortest < options.length {
                return Err(GanError::shape(format!(
                    "requested crop length {} exceeds shortest example ({} steps)",
                    options.length, shortest
                )));
            }
        } else {
            let width = dataset.item(0).width();
            if (0..dataset.len()).any(|i| dataset.item(i).width() != width) {
                return Err(GanError::shape(
                    "examples differ in width; set a crop length",
                ));
            }
        }

        let indices: Vec<usize> = (0..dataset.len()).collect();
        let rng = StdRng::seed_from_u64(options.seed);

        let mut stream = Self {
            dataset,
            options,
            indices,
            cursor: 0,
            passes: 0,
            rng,
            device,
        };

        if stream.options.shuffle {
            stream.shuffle_indices();
        }

        Ok(stream)
    }

    /// Shuffle indices for a new pass
    fn shuffle_indices(&mut self) {
        self.indices.shuffle(&mut self.rng);
    }

    /// Start a new pass
    pub fn reset(&mut self) {
        self.cursor = 0;
        if self.options.shuffle {
            self.shuffle_indices();
        }
    }

    /// Number of completed passes over the data
    pub fn passes(&self) -> usize {
        self.passes
    }

    /// Underlying dataset
    pub fn dataset(&self) -> &SequenceDataset {
        &self.dataset
    }

    fn width(&self) -> usize {
        if self.options.length > 0 {
            self.options.length
        } else {
            self.dataset.item(0).width()
        }
    }

    /// Assemble the batch for `indices[start..start + batch_size]`
    fn gather(&mut self, start: usize) -> Result<Batch> {
        let batch_size = self.options.batch_size;
        let height = self.dataset.height();
        let width = self.width();
        let num_classes = self.dataset.num_classes();

        let mut inputs = Vec::with_capacity(batch_size * height * width);
        let mut labels = vec![0f32; batch_size * num_classes];

        for slot in 0..batch_size {
            let idx = self.indices[start + slot];
            let item = self.dataset.item(idx);
            let item_width = item.width();
            if item_width < width {
                return Err(GanError::shape(format!(
                    "example {} has {} steps, fewer than the crop length {}",
                    idx, item_width, width
                )));
            }
            let offset = if self.options.length > 0 {
                self.rng.gen_range(0..=item_width - width)
            } else {
                0
            };
            item.write_window(offset, width, &mut inputs);
            labels[slot * num_classes + self.dataset.label(idx)] = 1.0;
        }

        let input = Tensor::from_slice(&inputs)
            .view([batch_size as i64, 1, height as i64, width as i64])
            .to_device(self.device);
        let label = Tensor::from_slice(&labels)
            .view([batch_size as i64, num_classes as i64])
            .to_device(self.device);

        Ok(Batch { input, label })
    }
}

impl BatchSource for MinibatchStream {
    fn next_batch(&mut self) -> Result<Option<Batch>> {
        let batch_size = self.options.batch_size;

        if self.cursor + batch_size > self.indices.len() {
            self.passes += 1;
            if !self.options.forever {
                return Ok(None);
            }
            self.reset();
        }

        let start = self.cursor;
        self.cursor += batch_size;
        self.gather(start).map(Some)
    }

    fn sample_shape(&self) -> [i64; 3] {
        [1, self.dataset.height() as i64, self.width() as i64]
    }

    fn num_classes(&self) -> i64 {
        self.dataset.num_classes() as i64
    }

    fn batches_per_pass(&self) -> usize {
        self.dataset.len() / self.options.batch_size
    }
}

impl Iterator for MinibatchStream {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_batch().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::Item;
    use ndarray::Array2;

    fn dataset(n: usize, width: usize) -> SequenceDataset {
        let items = (0..n)
            .map(|i| Item::Dense(Array2::from_elem((4, width), i as f32)))
            .collect();
        let labels = (0..n).map(|i| i % 2).collect();
        SequenceDataset::new(items, labels, vec!["even".into(), "odd".into()]).unwrap()
    }

    fn options(batch_size: usize) -> StreamOptions {
        StreamOptions {
            batch_size,
            shuffle: false,
            length: 0,
            forever: false,
            seed: 7,
        }
    }

    #[test]
    fn test_stream_drops_partial_batch() {
        let mut stream = MinibatchStream::new(dataset(10, 5), options(3), Device::Cpu).unwrap();

        assert_eq!(stream.batches_per_pass(), 3);
        let batches: Vec<_> = stream.by_ref().collect::<Result<_>>().unwrap();
        assert_eq!(batches.len(), 3);
        for batch in &batches {
            assert_eq!(batch.input.size(), vec![3, 1, 4, 5]);
            assert_eq!(batch.label.size(), vec![3, 2]);
        }
        assert_eq!(stream.passes(), 1);
    }

    #[test]
    fn test_stream_forever_wraps() {
        let opts = StreamOptions {
            forever: true,
            shuffle: true,
            ..options(4)
        };
        let mut stream = MinibatchStream::new(dataset(8, 5), opts, Device::Cpu).unwrap();
        for _ in 0..5 {
            assert!(stream.next_batch().unwrap().is_some());
        }
        assert_eq!(stream.passes(), 2);
    }

    #[test]
    fn test_labels_are_one_hot() {
        let mut stream = MinibatchStream::new(dataset(4, 5), options(4), Device::Cpu).unwrap();
        let batch = stream.next_batch().unwrap().unwrap();
        let row_sums = batch.label.sum_dim_intlist(&[1i64][..], false, tch::Kind::Float);
        assert_eq!(Vec::<f32>::try_from(&row_sums).unwrap(), vec![1.0; 4]);
    }

    #[test]
    fn test_crop_longer_than_item_fails() {
        let opts = StreamOptions {
            length: 6,
            ..options(2)
        };
        let err = MinibatchStream::new(dataset(4, 5), opts, Device::Cpu);
        assert!(matches!(err, Err(GanError::DataShape(_))));
    }

    #[test]
    fn test_crop_width() {
        let opts = StreamOptions {
            length: 3,
            ..options(2)
        };
        let mut stream = MinibatchStream::new(dataset(4, 8), opts, Device::Cpu).unwrap();
        assert_eq!(stream.sample_shape(), [1, 4, 3]);
        let batch = stream.next_batch().unwrap().unwrap();
        assert_eq!(batch.input.size(), vec![2, 1, 4, 3]);
    }

    #[test]
    fn test_same_seed_same_order() {
        let opts = StreamOptions {
            shuffle: true,
            ..options(2)
        };
        let mut a = MinibatchStream::new(dataset(6, 2), opts.clone(), Device::Cpu).unwrap();
        let mut b = MinibatchStream::new(dataset(6, 2), opts, Device::Cpu).unwrap();
        let xa = a.next_batch().unwrap().unwrap().input;
        let xb = b.next_batch().unwrap().unwrap().input;
        assert!(xa.equal(&xb));
    }

    #[test]
    fn test_too_small_for_one_batch() {
        let err = MinibatchStream::new(dataset(3, 2), options(4), Device::Cpu);
        assert!(matches!(err, Err(GanError::DataShape(_))));
    }
}
