//! Critic (discriminator) networks
//!
//! A critic maps frames of shape (batch, 1, height, width), optionally with a
//! one-hot condition, to one unbounded score per example.

use tch::{nn, nn::Module, nn::ModuleT, Tensor};

use super::arch::CriticArch;
use crate::error::{GanError, Result};

/// Critic network configuration
#[derive(Debug, Clone)]
pub struct CriticConfig {
    pub arch: CriticArch,
    /// Width of the hidden dense layers
    pub hidden: i64,
    /// Base number of filters
    pub filters: i64,
    /// Batch norm after the second convolution and the hidden dense layer
    pub batch_norm: bool,
    /// Number of condition classes; 0 for an unconditional critic
    pub num_classes: i64,
    /// Input shape (channels, height, width)
    pub sample_shape: [i64; 3],
}

impl Default for CriticConfig {
    fn default() -> Self {
        Self {
            arch: CriticArch::Dcgan,
            hidden: 1024,
            filters: 64,
            batch_norm: false,
            num_classes: 0,
            sample_shape: [1, 28, 28],
        }
    }
}

/// Convolution with a rectangular kernel and no padding
#[derive(Debug)]
struct RectConv {
    ws: Tensor,
    bs: Tensor,
}

impl RectConv {
    fn new(vs: nn::Path, in_channels: i64, out_channels: i64, kh: i64, kw: i64) -> Self {
        let bound = 1.0 / ((in_channels * kh * kw) as f64).sqrt();
        let ws = vs.var(
            "weight",
            &[out_channels, in_channels, kh, kw],
            nn::Init::Uniform { lo: -bound, up: bound },
        );
        let bs = vs.var("bias", &[out_channels], nn::Init::Uniform { lo: -bound, up: bound });
        Self { ws, bs }
    }
}

impl Module for RectConv {
    fn forward(&self, xs: &Tensor) -> Tensor {
        xs.conv2d(&self.ws, Some(&self.bs), [1, 1], [0, 0], [1, 1], 1)
    }
}

#[derive(Debug)]
struct DcganBody {
    conv1: nn::Conv2D,
    conv2: nn::Conv2D,
    bn2: Option<nn::BatchNorm>,
    fc1: nn::Linear,
    bn3: Option<nn::BatchNorm>,
    fc2: nn::Linear,
}

#[derive(Debug)]
struct CrepeBody {
    convs: Vec<RectConv>,
    fc1: nn::Linear,
    fc2: nn::Linear,
    fc3: nn::Linear,
}

#[derive(Debug)]
enum Body {
    Dcgan(DcganBody),
    Crepe(CrepeBody),
}

/// Critic network
#[derive(Debug)]
pub struct Critic {
    config: CriticConfig,
    body: Body,
    /// Conv and dense kernels; the clipping targets
    regularizable: Vec<Tensor>,
}

/// Leaky ReLU with slope 0.2
fn lrelu(x: &Tensor) -> Tensor {
    x.maximum(&(x * 0.2))
}

/// Output size of a kernel-5, stride-2, pad-2 convolution
fn strided_size(input: i64) -> i64 {
    (input - 1) / 2 + 1
}

/// Pooling steps of the crepe stack (pool after these conv indices)
const CREPE_POOL_AFTER: [usize; 3] = [0, 1, 5];

impl Critic {
    /// Create a new Critic network
    pub fn new(vs: &nn::Path, config: CriticConfig) -> Result<Self> {
        let [channels, height, width] = config.sample_shape;
        if channels != 1 {
            return Err(GanError::config(format!(
                "critic expects single-channel frames, got {} channels",
                channels
            )));
        }
        let f = config.filters;
        let mut regularizable = Vec::new();

        let body = match config.arch {
            CriticArch::Dcgan => {
                let conv_config = nn::ConvConfig {
                    stride: 2,
                    padding: 2,
                    ..Default::default()
                };
                let conv1 = nn::conv2d(vs / "conv1", 1, f, 5, conv_config);
                let conv2 = nn::conv2d(vs / "conv2", f, 2 * f, 5, conv_config);
                let bn2 = config
                    .batch_norm
                    .then(|| nn::batch_norm2d(vs / "bn2", 2 * f, Default::default()));

                let flat = 2 * f * strided_size(strided_size(height)) * strided_size(strided_size(width));
                let fc1 = nn::linear(vs / "fc1", flat + config.num_classes, config.hidden, Default::default());
                let bn3 = config
                    .batch_norm
                    .then(|| nn::batch_norm1d(vs / "bn3", config.hidden, Default::default()));
                let fc2 = nn::linear(vs / "fc2", config.hidden, 1, Default::default());

                regularizable.extend([
                    conv1.ws.shallow_clone(),
                    conv2.ws.shallow_clone(),
                    fc1.ws.shallow_clone(),
                    fc2.ws.shallow_clone(),
                ]);

                Body::Dcgan(DcganBody {
                    conv1,
                    conv2,
                    bn2,
                    fc1,
                    bn3,
                    fc2,
                })
            }
            CriticArch::Crepe => {
                // (in, kh, kw) of each convolution
                let shapes = [
                    (1, height, 7),
                    (f, 1, 7),
                    (f, 1, 3),
                    (f, 1, 3),
                    (f, 1, 3),
                    (f, 1, 3),
                ];
                let mut steps = width;
                let mut convs = Vec::with_capacity(shapes.len());
                for (i, &(in_channels, kh, kw)) in shapes.iter().enumerate() {
                    steps -= kw - 1;
                    if CREPE_POOL_AFTER.contains(&i) {
                        steps /= 3;
                    }
                    if steps < 1 {
                        return Err(GanError::config(format!(
                            "crepe critic needs wider inputs, width {} shrinks to nothing",
                            width
                        )));
                    }
                    let conv = RectConv::new(vs / format!("conv{}", i + 1), in_channels, f, kh, kw);
                    regularizable.push(conv.ws.shallow_clone());
                    convs.push(conv);
                }

                let flat = f * steps;
                let fc1 = nn::linear(vs / "fc1", flat + config.num_classes, config.hidden, Default::default());
                let fc2 = nn::linear(vs / "fc2", config.hidden, config.hidden, Default::default());
                let fc3 = nn::linear(vs / "fc3", config.hidden, 1, Default::default());
                regularizable.extend([
                    fc1.ws.shallow_clone(),
                    fc2.ws.shallow_clone(),
                    fc3.ws.shallow_clone(),
                ]);

                Body::Crepe(CrepeBody { convs, fc1, fc2, fc3 })
            }
        };

        Ok(Self {
            config,
            body,
            regularizable,
        })
    }

    /// Score samples
    ///
    /// # Arguments
    ///
    /// * `input` - Tensor of shape (batch_size, 1, height, width)
    /// * `condition` - One-hot labels (batch_size, num_classes) for conditional models
    /// * `train` - Whether in training mode (affects batch norm)
    ///
    /// # Returns
    ///
    /// Tensor of shape (batch_size, 1) with raw scores
    pub fn forward_t(&self, input: &Tensor, condition: Option<&Tensor>, train: bool) -> Tensor {
        let batch_size = input.size()[0];
        let with_condition = |x: Tensor| match condition {
            Some(c) => Tensor::cat(&[&x, c], 1),
            None => x,
        };

        match &self.body {
            Body::Dcgan(net) => {
                let x = lrelu(&net.conv1.forward(input));
                let x = net.conv2.forward(&x);
                let x = match &net.bn2 {
                    Some(bn) => bn.forward_t(&x, train),
                    None => x,
                };
                let x = with_condition(lrelu(&x).view([batch_size, -1]));
                let x = net.fc1.forward(&x);
                let x = match &net.bn3 {
                    Some(bn) => bn.forward_t(&x, train),
                    None => x,
                };
                net.fc2.forward(&lrelu(&x))
            }
            Body::Crepe(net) => {
                let mut x = input.shallow_clone();
                for (i, conv) in net.convs.iter().enumerate() {
                    x = lrelu(&conv.forward(&x));
                    if CREPE_POOL_AFTER.contains(&i) {
                        x = x.max_pool2d([1, 3], [1, 3], [0, 0], [1, 1], false);
                    }
                }
                let x = with_condition(x.view([batch_size, -1]));
                let x = lrelu(&net.fc1.forward(&x));
                let x = lrelu(&net.fc2.forward(&x));
                net.fc3.forward(&x)
            }
        }
    }

    /// Weights eligible for regularization (conv and dense kernels)
    pub fn regularizable(&self) -> &[Tensor] {
        &self.regularizable
    }

    /// Get configuration
    pub fn config(&self) -> &CriticConfig {
        &self.config
    }
}
