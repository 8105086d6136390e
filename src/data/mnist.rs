//! MNIST digits as 28x28 frames scaled to [-1, 1]

use std::path::Path;

use ndarray::Array2;
use tch::Tensor;
use tracing::info;

use super::dataset::{Item, SequenceDataset};
use crate::error::{GanError, Result};

/// Image side length
pub const MNIST_SIDE: usize = 28;

/// Load the MNIST training split from a directory holding the IDX files
///
/// # Arguments
///
/// * `dir` - Directory with `train-images-idx3-ubyte` and friends
/// * `n_pieces` - Keep only the first `n_pieces` images (0 = all)
pub fn load_mnist<P: AsRef<Path>>(dir: P, n_pieces: usize) -> Result<SequenceDataset> {
    let mnist = tch::vision::mnist::load_dir(dir.as_ref())?;
    let dataset = from_tensors(&mnist.train_images, &mnist.train_labels, mnist.labels, n_pieces)?;
    info!(
        "Loaded {} MNIST images from {}",
        dataset.len(),
        dir.as_ref().display()
    );
    Ok(dataset)
}

/// Build a dataset from flattened images in [0, 1] and integer labels
pub fn from_tensors(
    images: &Tensor,
    labels: &Tensor,
    num_classes: i64,
    n_pieces: usize,
) -> Result<SequenceDataset> {
    let pixels = MNIST_SIDE * MNIST_SIDE;
    let total = images.size()[0] as usize;
    let keep = if n_pieces == 0 { total } else { n_pieces.min(total) };

    let images = images.narrow(0, 0, keep as i64);
    let labels = labels.narrow(0, 0, keep as i64);

    let values = Vec::<f32>::try_from(&(images.flatten(0, -1) * 2.0 - 1.0))?;
    let classes = Vec::<i64>::try_from(&labels.flatten(0, -1))?;

    if values.len() != keep * pixels {
        return Err(GanError::shape(format!(
            "expected {} pixels per image, got {} values for {} images",
            pixels,
            values.len(),
            keep
        )));
    }

    let items = values
        .chunks(pixels)
        .map(|chunk| {
            Array2::from_shape_vec((MNIST_SIDE, MNIST_SIDE), chunk.to_vec())
                .map(Item::Dense)
                .map_err(|e| GanError::shape(e.to_string()))
        })
        .collect::<Result<Vec<_>>>()?;
    let labels = classes.iter().map(|&c| c as usize).collect();
    let class_names = (0..num_classes).map(|c| c.to_string()).collect();

    SequenceDataset::new(items, labels, class_names)
}
