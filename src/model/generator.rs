//! Generator networks
//!
//! Both architectures map noise (optionally concatenated with a one-hot
//! condition) to frames of shape (batch, 1, height, width) in [-1, 1].

use tch::{nn, nn::Module, nn::ModuleT, nn::RNN, Tensor};

use super::arch::GeneratorArch;
use super::deconv::{deconv2d, Deconv2d, DeconvConfig};
use crate::error::{GanError, Result};

/// Generator network configuration
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub arch: GeneratorArch,
    /// Size of the noise vector (per step for the LSTM)
    pub noise_size: i64,
    /// Width of the hidden dense / recurrent layer
    pub hidden: i64,
    /// Base number of filters
    pub filters: i64,
    /// Batch norm after hidden layers
    pub batch_norm: bool,
    /// Number of condition classes; 0 for an unconditional generator
    pub num_classes: i64,
    /// Output shape (channels, height, width)
    pub sample_shape: [i64; 3],
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            arch: GeneratorArch::Dcgan,
            noise_size: 256,
            hidden: 1024,
            filters: 64,
            batch_norm: false,
            num_classes: 0,
            sample_shape: [1, 28, 28],
        }
    }
}

/// Dense projection then two transposed convolutions
#[derive(Debug)]
struct DcganBody {
    fc1: nn::Linear,
    bn1: Option<nn::BatchNorm>,
    fc2: nn::Linear,
    bn2: Option<nn::BatchNorm>,
    deconv1: Deconv2d,
    bn3: Option<nn::BatchNorm>,
    deconv2: Deconv2d,
}

/// LSTM over time steps, one dense projection per step
#[derive(Debug)]
struct LstmBody {
    lstm: nn::LSTM,
    fc: nn::Linear,
}

#[derive(Debug)]
enum Body {
    Dcgan(DcganBody),
    Lstm(LstmBody),
}

/// Generator network
#[derive(Debug)]
pub struct Generator {
    config: GeneratorConfig,
    body: Body,
    /// Weights eligible for regularization
    regularizable: Vec<Tensor>,
}

fn optional_bn(vs: &nn::Path, name: &str, dim: i64, enabled: bool, two_d: bool) -> Option<nn::BatchNorm> {
    if !enabled {
        return None;
    }
    Some(if two_d {
        nn::batch_norm2d(vs / name, dim, Default::default())
    } else {
        nn::batch_norm1d(vs / name, dim, Default::default())
    })
}

fn apply_bn(bn: &Option<nn::BatchNorm>, x: Tensor, train: bool) -> Tensor {
    match bn {
        Some(bn) => bn.forward_t(&x, train),
        None => x,
    }
}

impl Generator {
    /// Create a new Generator network
    ///
    /// The DCGAN body upsamples by 4, so height and width must be multiples of 4.
    pub fn new(vs: &nn::Path, config: GeneratorConfig) -> Result<Self> {
        let [channels, height, width] = config.sample_shape;
        if channels != 1 {
            return Err(GanError::config(format!(
                "generator produces single-channel frames, got {} channels",
                channels
            )));
        }

        let mut regularizable = Vec::new();
        let input = config.noise_size + config.num_classes;

        let body = match config.arch {
            GeneratorArch::Dcgan => {
                if height % 4 != 0 || width % 4 != 0 {
                    return Err(GanError::config(format!(
                        "dcgan generator needs height and width divisible by 4, got {}x{}",
                        height, width
                    )));
                }
                let f = config.filters;
                let projected = 2 * f * (height / 4) * (width / 4);

                let fc1 = nn::linear(vs / "fc1", input, config.hidden, Default::default());
                let bn1 = optional_bn(vs, "bn1", config.hidden, config.batch_norm, false);
                let fc2 = nn::linear(vs / "fc2", config.hidden, projected, Default::default());
                let bn2 = optional_bn(vs, "bn2", projected, config.batch_norm, false);
                let deconv1 = deconv2d(vs / "deconv1", 2 * f, f, 5, DeconvConfig::default());
                let bn3 = optional_bn(vs, "bn3", f, config.batch_norm, true);
                let deconv2 = deconv2d(vs / "deconv2", f, 1, 5, DeconvConfig::default());

                regularizable.extend([
                    fc1.ws.shallow_clone(),
                    fc2.ws.shallow_clone(),
                    deconv1.ws.shallow_clone(),
                    deconv2.ws.shallow_clone(),
                ]);

                Body::Dcgan(DcganBody {
                    fc1,
                    bn1,
                    fc2,
                    bn2,
                    deconv1,
                    bn3,
                    deconv2,
                })
            }
            GeneratorArch::Lstm => {
                let lstm = nn::lstm(vs / "lstm", input, config.hidden, Default::default());
                let fc = nn::linear(vs / "fc", config.hidden, height, Default::default());
                regularizable.push(fc.ws.shallow_clone());
                Body::Lstm(LstmBody { lstm, fc })
            }
        };

        Ok(Self {
            config,
            body,
            regularizable,
        })
    }

    /// Shape of the noise tensor for a batch
    pub fn noise_shape(&self, batch_size: i64) -> Vec<i64> {
        match self.config.arch {
            GeneratorArch::Dcgan => vec![batch_size, self.config.noise_size],
            GeneratorArch::Lstm => vec![batch_size, self.config.sample_shape[2], self.config.noise_size],
        }
    }

    /// Generate samples
    ///
    /// # Arguments
    ///
    /// * `noise` - Tensor of shape [`Generator::noise_shape`]
    /// * `condition` - One-hot labels (batch_size, num_classes) for conditional models
    /// * `train` - Whether in training mode (affects batch norm)
    ///
    /// # Returns
    ///
    /// Tensor of shape (batch_size, 1, height, width)
    pub fn forward_t(&self, noise: &Tensor, condition: Option<&Tensor>, train: bool) -> Tensor {
        let [_, height, width] = self.config.sample_shape;
        let batch_size = noise.size()[0];

        match &self.body {
            Body::Dcgan(net) => {
                let x = match condition {
                    Some(c) => Tensor::cat(&[noise, c], 1),
                    None => noise.shallow_clone(),
                };
                let x = apply_bn(&net.bn1, net.fc1.forward(&x), train).relu();
                let x = apply_bn(&net.bn2, net.fc2.forward(&x), train).relu();
                let x = x.view([batch_size, 2 * self.config.filters, height / 4, width / 4]);
                let x = apply_bn(&net.bn3, net.deconv1.forward(&x), train).relu();
                net.deconv2.forward(&x).tanh()
            }
            Body::Lstm(net) => {
                let x = match condition {
                    Some(c) => {
                        let tiled = c.unsqueeze(1).expand([batch_size, width, c.size()[1]], false);
                        Tensor::cat(&[noise, &tiled], 2)
                    }
                    None => noise.shallow_clone(),
                };
                let (out, _) = net.lstm.seq(&x);
                // (batch, width, height) -> (batch, 1, height, width)
                net.fc.forward(&out).tanh().transpose(1, 2).unsqueeze(1)
            }
        }
    }

    /// Weights eligible for regularization (dense and deconv kernels)
    pub fn regularizable(&self) -> &[Tensor] {
        &self.regularizable
    }

    /// Get configuration
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }
}
