//! Adversarial training loop
//!
//! Alternates critic and generator updates. Each outer iteration runs a
//! scheduled number of critic updates on fresh batches, then exactly one
//! generator update. At the end of every epoch the mean scores are recorded,
//! a sample grid is rendered, learning rates are decayed and, every
//! `save_every` epochs, both networks are snapshotted.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tch::Tensor;
use tracing::{debug, info, warn};

use super::losses::{critic_score, generator_score, gradient_penalty, LossType, Scores};
use super::metrics::{EmaTracker, EpochScore, ScoreAccumulator, ScoreHistory};
use super::schedule::CriticSchedule;
use super::update::{LearningRate, OptimizerKind, UpdateRule, WeightClip};
use crate::data::BatchSource;
use crate::error::{GanError, Result};
use crate::model::{GanPair, Network};
use crate::utils::checkpoint::{self, SnapshotMeta, TrialLayout};
use crate::utils::render;

/// Training configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Number of training epochs
    pub num_epochs: usize,
    /// Generator updates per epoch (0 = one pass over the data)
    pub epoch_size: usize,
    /// Loss formulation
    pub loss: LossType,
    /// Optimizer; derived from the loss type when unset
    pub optimizer: Option<OptimizerKind>,
    /// Learning rate for the critic
    pub critic_lr: f64,
    /// Learning rate for the generator
    pub generator_lr: f64,
    /// Critic weight clip bound (0 disables clipping)
    pub clip: f64,
    /// Gradient penalty coefficient
    pub lambda: f64,
    /// Critic / generator update ratio
    pub schedule: CriticSchedule,
    /// Linearly decay learning rates over the second half of training
    pub decay: bool,
    /// Snapshot every N epochs (0 disables snapshots)
    pub save_every: usize,
    /// Side length of the sample grid rendered each epoch
    pub grid: i64,
    /// Seed for libtorch's generator
    pub seed: u64,
    /// Device: "cpu" or "cuda"
    pub device: String,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            num_epochs: 100,
            epoch_size: 0,
            loss: LossType::Wgan,
            optimizer: None,
            critic_lr: 1e-4,
            generator_lr: 1e-4,
            clip: 0.01,
            lambda: 10.0,
            schedule: CriticSchedule::default(),
            decay: true,
            save_every: 9,
            grid: 12,
            seed: 1234,
            device: "cpu".to_string(),
        }
    }
}

impl TrainingConfig {
    /// Optimizer in effect
    pub fn optimizer_kind(&self) -> OptimizerKind {
        self.optimizer.unwrap_or_else(|| self.loss.default_optimizer())
    }

    /// Weight clipping in effect for the critic
    pub fn weight_clip(&self) -> Option<WeightClip> {
        if self.loss.uses_clipping() {
            WeightClip::new(self.clip)
        } else {
            None
        }
    }
}

/// Where the loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initializing,
    RunningCriticPhase,
    RunningGeneratorPhase,
    EndOfEpoch,
    Terminal,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Initializing => "initializing",
            Phase::RunningCriticPhase => "critic",
            Phase::RunningGeneratorPhase => "generator",
            Phase::EndOfEpoch => "end of epoch",
            Phase::Terminal => "terminal",
        };
        f.write_str(name)
    }
}

/// Mutable state of a run
#[derive(Debug, Clone)]
pub struct TrainingState {
    pub critic_rate: LearningRate,
    pub generator_rate: LearningRate,
    /// Generator updates performed so far
    pub generator_iterations: usize,
    /// Last completed epoch (1-based, 0 before the first)
    pub epoch: usize,
    pub phase: Phase,
}

impl TrainingState {
    fn new(config: &TrainingConfig) -> Self {
        Self {
            critic_rate: LearningRate::new(config.critic_lr),
            generator_rate: LearningRate::new(config.generator_lr),
            generator_iterations: 0,
            epoch: 0,
            phase: Phase::Initializing,
        }
    }
}

/// Shared flag asking the loop to stop
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// GAN trainer
pub struct Trainer {
    config: TrainingConfig,
    state: TrainingState,
    history: ScoreHistory,
    layout: Option<TrialLayout>,
    cancel: CancelToken,
}

impl Trainer {
    /// Create a new trainer
    ///
    /// Without a [`TrialLayout`] nothing is written to disk.
    pub fn new(config: TrainingConfig, layout: Option<TrialLayout>) -> Self {
        let state = TrainingState::new(&config);
        Self {
            config,
            state,
            history: ScoreHistory::new(),
            layout,
            cancel: CancelToken::new(),
        }
    }

    /// Token that stops the loop when cancelled
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Continue from the latest snapshot in the trial folder
    ///
    /// Restores both networks, the generator iteration counter, the learning
    /// rates and the score history. Returns the epoch resumed from.
    pub fn resume(&mut self, gan: &GanPair) -> Result<usize> {
        let layout = self
            .layout
            .as_ref()
            .ok_or_else(|| GanError::config("resuming needs a trial folder"))?;
        let epoch = checkpoint::find_latest_snapshot(layout.models_dir()).ok_or_else(|| {
            GanError::config(format!("no snapshot found in {}", layout.models_dir().display()))
        })?;

        let meta = checkpoint::load_snapshot(layout, gan, epoch)?;
        let mut history = ScoreHistory::load_npy(layout.root())?;
        history.truncate(meta.epoch);

        self.state.epoch = meta.epoch;
        self.state.generator_iterations = meta.generator_iterations;
        self.state.critic_rate.set(meta.critic_rate);
        self.state.generator_rate.set(meta.generator_rate);
        self.history = history;

        info!(
            "Resuming after epoch {} ({} generator iterations)",
            meta.epoch, meta.generator_iterations
        );
        Ok(meta.epoch)
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.state.phase != phase {
            debug!("Phase: {} -> {}", self.state.phase, phase);
            self.state.phase = phase;
        }
    }

    /// Train the GAN
    ///
    /// # Arguments
    ///
    /// * `gan` - Generator / critic pair to train
    /// * `source` - Endless source of training batches
    ///
    /// # Returns
    ///
    /// Score history of all completed epochs
    pub fn train(&mut self, gan: &GanPair, source: &mut dyn BatchSource) -> Result<&ScoreHistory> {
        self.set_phase(Phase::Initializing);
        tch::manual_seed(self.config.seed as i64);

        let kind = self.config.optimizer_kind();
        let clip = self.config.weight_clip();
        let clip_targets = gan.critic.regularizable().iter().map(Tensor::shallow_clone).collect();
        let mut critic_rule = UpdateRule::new(
            kind,
            gan.var_store(Network::Critic),
            &self.state.critic_rate,
            clip,
            clip_targets,
        )?;
        let mut generator_rule = UpdateRule::new(
            kind,
            gan.var_store(Network::Generator),
            &self.state.generator_rate,
            None,
            Vec::new(),
        )?;

        let epoch_size = match self.config.epoch_size {
            0 => source.batches_per_pass().max(1),
            n => n,
        };
        let conditional = gan.generator.config().num_classes > 0;
        let grid = self.config.grid;
        let fixed_noise = gan.sample_noise(grid * grid);
        let fixed_condition = gan.fixed_condition(grid * grid);

        info!(
            "Starting {} training for {} epochs, {} generator iterations per epoch ({} optimizer{})",
            self.config.loss,
            self.config.num_epochs,
            epoch_size,
            kind,
            clip.map(|c| format!(", clip {}", c.bound())).unwrap_or_default()
        );

        for epoch in self.state.epoch + 1..=self.config.num_epochs {
            if self.cancel.is_cancelled() {
                break;
            }
            let start = Instant::now();
            let mut critic_scores = ScoreAccumulator::new();
            let mut generator_scores = ScoreAccumulator::new();
            let mut critic_ema = EmaTracker::new(0.1);

            // Progress bar for epoch
            let pb = ProgressBar::new(epoch_size as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("##-"),
            );

            let mut completed = true;
            for _ in 0..epoch_size {
                if self.cancel.is_cancelled() {
                    completed = false;
                    break;
                }

                // ========== Train Critic ==========
                self.set_phase(Phase::RunningCriticPhase);
                let runs = self.config.schedule.critic_runs(self.state.generator_iterations);
                let mut condition = None;
                let mut batch_size = 0;
                for _ in 0..runs {
                    let batch = source
                        .next_batch()?
                        .ok_or_else(|| GanError::shape("batch source ran dry"))?;
                    batch_size = batch.size();
                    condition = conditional.then_some(batch.label);

                    let values = self.critic_step(gan, &batch.input, condition.as_ref(), &mut critic_rule, epoch)?;
                    critic_ema.update(values.0);
                    critic_scores.push(values);
                }

                // ========== Train Generator ==========
                self.set_phase(Phase::RunningGeneratorPhase);
                if batch_size == 0 {
                    return Err(GanError::config("critic schedule produced no critic runs"));
                }
                let values = self.generator_step(gan, batch_size, condition.as_ref(), &mut generator_rule, epoch)?;
                generator_scores.push(values);
                self.state.generator_iterations += 1;

                pb.set_message(format!("C: {:.4}, G: {:.4}", critic_ema.value(), values.0));
                pb.inc(1);
            }
            pb.finish_and_clear();

            if !completed {
                info!("Stopped during epoch {}; keeping {} completed epochs", epoch, self.state.epoch);
                break;
            }

            self.set_phase(Phase::EndOfEpoch);
            let critic_mean = critic_scores.mean();
            let generator_mean = generator_scores.mean();
            self.history.record_epoch(critic_mean, generator_mean);

            info!(
                "Epoch {}/{} took {:.3}s: critic {:.4} (penalty {:.4}), generator {:.4}",
                epoch,
                self.config.num_epochs,
                start.elapsed().as_secs_f64(),
                critic_mean.score,
                critic_mean.penalty,
                generator_mean.score
            );

            self.end_of_epoch(gan, epoch, &fixed_noise, fixed_condition.as_ref(), critic_mean, generator_mean)?;
        }

        self.set_phase(Phase::Terminal);
        Ok(&self.history)
    }

    /// One critic update; returns `(score, penalty)`
    ///
    /// Non-finite values abort before the weights are touched.
    fn critic_step(
        &self,
        gan: &GanPair,
        real: &Tensor,
        condition: Option<&Tensor>,
        rule: &mut UpdateRule,
        epoch: usize,
    ) -> Result<(f64, f64)> {
        let noise = gan.sample_noise(real.size()[0]);
        let fake = tch::no_grad(|| gan.generate(&noise, condition, true));

        let real_out = gan.criticize(real, condition, true);
        let fake_out = gan.criticize(&fake, condition, true);
        let score = critic_score(self.config.loss, &real_out, &fake_out);

        let scores = if self.config.loss.uses_gradient_penalty() {
            let penalty = gradient_penalty(
                |x| gan.criticize(x, condition, true),
                real,
                &fake,
                self.config.lambda,
            );
            Scores { score, penalty }
        } else {
            Scores::plain(score)
        };

        let values = scores.values();
        self.check_finite(Network::Critic, values, epoch)?;
        rule.step(&scores.objective(), &self.state.critic_rate);
        Ok(values)
    }

    /// One generator update; returns `(score, penalty)`
    fn generator_step(
        &self,
        gan: &GanPair,
        batch_size: i64,
        condition: Option<&Tensor>,
        rule: &mut UpdateRule,
        epoch: usize,
    ) -> Result<(f64, f64)> {
        let noise = gan.sample_noise(batch_size);
        let fake = gan.generate(&noise, condition, true);
        let fake_out = gan.criticize(&fake, condition, true);
        let scores = Scores::plain(generator_score(self.config.loss, &fake_out));

        let values = scores.values();
        self.check_finite(Network::Generator, values, epoch)?;
        rule.step(&scores.objective(), &self.state.generator_rate);
        Ok(values)
    }

    /// Both the score and the penalty of `network` must be finite
    fn check_finite(&self, network: Network, (score, penalty): (f64, f64), epoch: usize) -> Result<()> {
        let (score_name, penalty_name) = match network {
            Network::Critic => ("critic score", "critic penalty"),
            Network::Generator => ("generator score", "generator penalty"),
        };
        let (what, value) = if !score.is_finite() {
            (score_name, score)
        } else if !penalty.is_finite() {
            (penalty_name, penalty)
        } else {
            return Ok(());
        };
        Err(GanError::NumericalInstability {
            what,
            value,
            epoch,
            iteration: self.state.generator_iterations,
        })
    }

    /// Artifacts, decay and snapshots after `epoch` completes
    fn end_of_epoch(
        &mut self,
        gan: &GanPair,
        epoch: usize,
        fixed_noise: &Tensor,
        fixed_condition: Option<&Tensor>,
        critic_mean: EpochScore,
        generator_mean: EpochScore,
    ) -> Result<()> {
        if let Some(layout) = &self.layout {
            let samples = tch::no_grad(|| gan.generate(fixed_noise, fixed_condition, false));
            if let Err(e) = render::save_sample_grid(&samples, self.config.grid, layout.image_path(epoch)) {
                warn!("Failed to save sample grid: {}", e);
            }
            if let Err(e) = samples.write_npy(layout.samples_path(epoch)) {
                warn!("Failed to save samples: {}", e);
            }
            self.history.save_npy(layout.root())?;
            self.history.save_csv(layout.scores_csv_path())?;
        }

        if self.config.decay {
            let n = self.config.num_epochs;
            self.state.critic_rate.decay(epoch, n);
            self.state.generator_rate.decay(epoch, n);
            debug!(
                "Learning rates: critic {:.3e}, generator {:.3e}",
                self.state.critic_rate.current(),
                self.state.generator_rate.current()
            );
        }

        self.state.epoch = epoch;

        if self.config.save_every > 0 && epoch % self.config.save_every == 0 {
            if let Some(layout) = &self.layout {
                let meta = SnapshotMeta::from_state(&self.state, gan, critic_mean, generator_mean);
                checkpoint::save_snapshot(layout, gan, &meta)?;
            }
        }

        Ok(())
    }

    /// Get score history
    pub fn history(&self) -> &ScoreHistory {
        &self.history
    }

    /// Get training state
    pub fn state(&self) -> &TrainingState {
        &self.state
    }

    /// Get configuration
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_training_config_default() {
        let config = TrainingConfig::default();
        assert_eq!(config.num_epochs, 100);
        assert_eq!(config.save_every, 9);
        assert_eq!(config.optimizer_kind(), OptimizerKind::RmsProp);
        assert!(config.weight_clip().is_some());
    }

    #[test]
    fn test_iwgan_disables_clipping() {
        let config = TrainingConfig {
            loss: LossType::Iwgan,
            ..Default::default()
        };
        assert!(config.weight_clip().is_none());
        assert_eq!(config.optimizer_kind(), OptimizerKind::Adam);
    }

    #[test]
    fn test_vanilla_uses_adam_without_clipping() {
        let config = TrainingConfig {
            loss: LossType::Vanilla,
            ..Default::default()
        };
        assert!(config.weight_clip().is_none());
        assert_eq!(config.optimizer_kind(), OptimizerKind::AdamDcgan);
    }

    #[test]
    fn test_non_finite_penalty_is_reported() {
        let trainer = Trainer::new(TrainingConfig::default(), None);
        assert!(trainer.check_finite(Network::Critic, (0.5, 0.0), 1).is_ok());

        let err = trainer
            .check_finite(Network::Critic, (0.5, f64::INFINITY), 3)
            .unwrap_err();
        match err {
            GanError::NumericalInstability { what, epoch, .. } => {
                assert_eq!(what, "critic penalty");
                assert_eq!(epoch, 3);
            }
            other => panic!("unexpected error: {}", other),
        }

        let err = trainer
            .check_finite(Network::Generator, (f64::NAN, 0.0), 1)
            .unwrap_err();
        assert!(matches!(
            err,
            GanError::NumericalInstability { what: "generator score", .. }
        ));
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let trainer = Trainer::new(TrainingConfig::default(), None);
        let token = trainer.cancel_token();
        assert!(!trainer.cancel.is_cancelled());
        token.cancel();
        assert!(trainer.cancel.is_cancelled());
        assert_eq!(trainer.state().phase, Phase::Initializing);
    }
}
