//! Generator / critic pair with their variable stores
//!
//! Provides generation and scoring entry points, parameter snapshots and the
//! noise / condition helpers used by the training loop.

use std::collections::BTreeMap;
use std::path::Path;

use tch::{nn::VarStore, Device, Kind, Tensor};
use tracing::debug;

use super::critic::{Critic, CriticConfig};
use super::generator::{Generator, GeneratorConfig};
use crate::error::{GanError, Result};

/// Which network of the pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Generator,
    Critic,
}

/// Complete GAN model
pub struct GanPair {
    /// Generator network
    pub generator: Generator,
    /// Critic network
    pub critic: Critic,
    gen_vs: VarStore,
    crit_vs: VarStore,
    device: Device,
}

impl GanPair {
    /// Create a new generator / critic pair
    pub fn new(gen_config: GeneratorConfig, crit_config: CriticConfig, device: Device) -> Result<Self> {
        if gen_config.sample_shape != crit_config.sample_shape {
            return Err(GanError::config(format!(
                "generator output {:?} does not match critic input {:?}",
                gen_config.sample_shape, crit_config.sample_shape
            )));
        }

        let gen_vs = VarStore::new(device);
        let crit_vs = VarStore::new(device);

        let generator = Generator::new(&(gen_vs.root() / "gen"), gen_config)?;
        let critic = Critic::new(&(crit_vs.root() / "crit"), crit_config)?;

        debug!(
            "Built generator with {} and critic with {} variables",
            gen_vs.len(),
            crit_vs.len()
        );

        Ok(Self {
            generator,
            critic,
            gen_vs,
            crit_vs,
            device,
        })
    }

    /// Device the pair lives on
    pub fn device(&self) -> Device {
        self.device
    }

    /// Variable store of one network
    pub fn var_store(&self, network: Network) -> &VarStore {
        match network {
            Network::Generator => &self.gen_vs,
            Network::Critic => &self.crit_vs,
        }
    }

    /// Generate samples from noise (and condition, for conditional models)
    pub fn generate(&self, noise: &Tensor, condition: Option<&Tensor>, train: bool) -> Tensor {
        self.generator.forward_t(noise, condition, train)
    }

    /// Score samples with the critic
    pub fn criticize(&self, sample: &Tensor, condition: Option<&Tensor>, train: bool) -> Tensor {
        self.critic.forward_t(sample, condition, train)
    }

    /// Draw standard normal noise for a batch
    pub fn sample_noise(&self, batch_size: i64) -> Tensor {
        let shape = self.generator.noise_shape(batch_size);
        Tensor::randn(shape.as_slice(), (Kind::Float, self.device))
    }

    /// Condition matrix cycling through the classes in contiguous blocks
    ///
    /// Returns `None` for an unconditional generator.
    pub fn fixed_condition(&self, n: i64) -> Option<Tensor> {
        let classes = self.generator.config().num_classes;
        if classes == 0 {
            return None;
        }
        let per_class = (n + classes - 1) / classes;
        let ids: Vec<i64> = (0..n).map(|i| i / per_class).collect();
        let ids = Tensor::from_slice(&ids).to_device(self.device);
        Some(ids.one_hot(classes).to_kind(Kind::Float))
    }

    /// Trainable tensors of one network
    pub fn trainable_parameters(&self, network: Network) -> Vec<Tensor> {
        self.var_store(network).trainable_variables()
    }

    /// Copy of every variable of one network, keyed by name
    pub fn parameter_values(&self, network: Network) -> BTreeMap<String, Tensor> {
        self.var_store(network)
            .variables()
            .into_iter()
            .map(|(name, t)| (name, t.detach().copy()))
            .collect()
    }

    /// Overwrite variables of one network from named values
    ///
    /// Every variable of the network must be present with a matching shape.
    pub fn set_parameter_values(&self, network: Network, values: &BTreeMap<String, Tensor>) -> Result<()> {
        let variables = self.var_store(network).variables();
        for (name, mut var) in variables {
            let value = values
                .get(&name)
                .ok_or_else(|| GanError::shape(format!("missing value for {}", name)))?;
            if value.size() != var.size() {
                return Err(GanError::shape(format!(
                    "{}: expected shape {:?}, got {:?}",
                    name,
                    var.size(),
                    value.size()
                )));
            }
            tch::no_grad(|| var.copy_(&value.to_device(self.device)));
        }
        Ok(())
    }

    /// Write one network's variables to a `.npz` archive
    pub fn save_network<P: AsRef<Path>>(&self, network: Network, path: P) -> Result<()> {
        let values = self.parameter_values(network);
        let named: Vec<(&str, &Tensor)> = values.iter().map(|(k, v)| (k.as_str(), v)).collect();
        Tensor::write_npz(named.as_slice(), path)?;
        Ok(())
    }

    /// Load one network's variables from a `.npz` archive
    pub fn load_network<P: AsRef<Path>>(&self, network: Network, path: P) -> Result<()> {
        let values: BTreeMap<String, Tensor> = Tensor::read_npz(path)?.into_iter().collect();
        self.set_parameter_values(network, &values)
    }

    /// Save both networks
    pub fn save_snapshot<P: AsRef<Path>>(&self, gen_path: P, crit_path: P) -> Result<()> {
        self.save_network(Network::Generator, gen_path)?;
        self.save_network(Network::Critic, crit_path)
    }

    /// Load both networks
    pub fn load_snapshot<P: AsRef<Path>>(&self, gen_path: P, crit_path: P) -> Result<()> {
        self.load_network(Network::Generator, gen_path)?;
        self.load_network(Network::Critic, crit_path)
    }
}
