//! Sample grid images

use std::path::Path;

use tch::{Kind, Tensor};

use crate::error::{GanError, Result};

/// Tile the first `grid * grid` samples into one image tensor
///
/// Input is (n, 1, height, width) with values in [-1, 1]; output is a
/// (3, grid * height, grid * width) `u8` tensor.
pub fn sample_grid(samples: &Tensor, grid: i64) -> Result<Tensor> {
    let size = samples.size();
    let (n, height, width) = match size.as_slice() {
        [n, 1, h, w] => (*n, *h, *w),
        other => {
            return Err(GanError::shape(format!(
                "expected samples of shape (n, 1, height, width), got {:?}",
                other
            )))
        }
    };
    if grid <= 0 || n < grid * grid {
        return Err(GanError::shape(format!(
            "{} samples cannot fill a {}x{} grid",
            n, grid, grid
        )));
    }

    let tiles = samples
        .narrow(0, 0, grid * grid)
        .view([grid, grid, height, width])
        .permute([0, 2, 1, 3])
        .reshape([grid * height, grid * width]);

    let pixels = ((tiles.clamp(-1.0, 1.0) + 1.0) * 127.5)
        .round()
        .to_kind(Kind::Uint8);
    Ok(pixels.unsqueeze(0).repeat([3, 1, 1]))
}

/// Save a sample grid as an image file (format from the extension)
pub fn save_sample_grid<P: AsRef<Path>>(samples: &Tensor, grid: i64, path: P) -> Result<()> {
    let image = sample_grid(&samples.to_device(tch::Device::Cpu), grid)?;
    tch::vision::image::save(&image, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Device;
    use tempfile::tempdir;

    #[test]
    fn test_grid_layout() {
        // sample i is filled with a distinct value
        let values: Vec<f32> = (0..4).map(|i| -1.0 + i as f32 * 2.0 / 3.0).collect();
        let samples = Tensor::from_slice(&values)
            .view([4, 1, 1, 1])
            .expand([4, 1, 2, 3], false)
            .contiguous();

        let image = sample_grid(&samples, 2).unwrap();
        assert_eq!(image.size(), vec![3, 4, 6]);
        // top-left tile is sample 0 (black), bottom-right tile is sample 3 (white)
        assert_eq!(image.int64_value(&[0, 0, 0]), 0);
        assert_eq!(image.int64_value(&[0, 3, 5]), 255);
        // top-right tile is sample 1
        assert_eq!(image.int64_value(&[1, 0, 4]), 85);
    }

    #[test]
    fn test_grid_needs_enough_samples() {
        let samples = Tensor::zeros([3, 1, 2, 2], (Kind::Float, Device::Cpu));
        assert!(sample_grid(&samples, 2).is_err());
    }

    #[test]
    fn test_save_png() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("grid.png");
        let samples = Tensor::rand([4, 1, 4, 4], (Kind::Float, Device::Cpu)) * 2.0 - 1.0;
        save_sample_grid(&samples, 2, &path).unwrap();
        assert!(path.exists());
    }
}
