//! Transposed 2D convolution with "full" output sizing
//!
//! Output spatial size is `i * stride - 2 * padding + kernel - 1`, which for
//! kernel 5, stride 2 and padding 2 exactly doubles the input.

use tch::{nn, nn::Module, Tensor};

/// Configuration for [`Deconv2d`]
#[derive(Debug, Clone, Copy)]
pub struct DeconvConfig {
    pub stride: i64,
    pub padding: i64,
    /// Orthogonal init gain
    pub gain: f64,
}

impl Default for DeconvConfig {
    fn default() -> Self {
        Self {
            stride: 2,
            padding: 2,
            gain: 1.0,
        }
    }
}

/// Transposed convolution layer
#[derive(Debug)]
pub struct Deconv2d {
    /// Weight of shape (in_channels, out_channels, k, k)
    pub ws: Tensor,
    /// Bias of shape (out_channels)
    pub bs: Tensor,
    stride: i64,
    padding: i64,
}

/// Create a [`Deconv2d`] under `vs`
pub fn deconv2d<'a, T: std::borrow::Borrow<nn::Path<'a>>>(
    vs: T,
    in_channels: i64,
    out_channels: i64,
    kernel: i64,
    config: DeconvConfig,
) -> Deconv2d {
    let vs = vs.borrow();
    let ws = vs.var(
        "weight",
        &[in_channels, out_channels, kernel, kernel],
        nn::Init::Orthogonal { gain: config.gain },
    );
    let bs = vs.zeros("bias", &[out_channels]);
    Deconv2d {
        ws,
        bs,
        stride: config.stride,
        padding: config.padding,
    }
}

impl Deconv2d {
    /// Spatial output size for an input of size `input`
    pub fn output_size(&self, input: i64) -> i64 {
        let kernel = self.ws.size()[2];
        input * self.stride - 2 * self.padding + kernel - 1
    }
}

impl Module for Deconv2d {
    fn forward(&self, xs: &Tensor) -> Tensor {
        let s = self.stride;
        let p = self.padding;
        // output_padding of stride - 1 gives i*s - 2p + k - 1
        xs.conv_transpose2d(&self.ws, Some(&self.bs), [s, s], [p, p], [s - 1, s - 1], 1, [1, 1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{nn::VarStore, Device, Kind};

    #[test]
    fn test_deconv_doubles_input() {
        let vs = VarStore::new(Device::Cpu);
        let layer = deconv2d(vs.root() / "deconv", 4, 2, 5, DeconvConfig::default());

        let x = Tensor::randn([3, 4, 7, 7], (Kind::Float, Device::Cpu));
        let y = layer.forward(&x);
        assert_eq!(y.size(), vec![3, 2, 14, 14]);
        assert_eq!(layer.output_size(14), 28);
    }

    #[test]
    fn test_deconv_bias_starts_at_zero() {
        let vs = VarStore::new(Device::Cpu);
        let layer = deconv2d(vs.root(), 3, 5, 5, DeconvConfig::default());
        assert_eq!(layer.bs.abs().sum(Kind::Float).double_value(&[]), 0.0);
        assert_eq!(layer.ws.size(), vec![3, 5, 5, 5]);
    }
}
