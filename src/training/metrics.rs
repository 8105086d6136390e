//! Score history for monitoring GAN progress
//!
//! Per-epoch mean `(score, penalty)` pairs for both networks, persisted as
//! `(epochs, 2)` `.npy` arrays and as a CSV table.

use std::path::Path;

use tch::{Kind, Tensor};

use crate::error::{GanError, Result};

/// Mean score and penalty of one network over one epoch
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EpochScore {
    pub score: f64,
    pub penalty: f64,
}

/// Accumulates `(score, penalty)` pairs within an epoch
#[derive(Debug, Clone, Default)]
pub struct ScoreAccumulator {
    score_sum: f64,
    penalty_sum: f64,
    count: usize,
}

impl ScoreAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, (score, penalty): (f64, f64)) {
        self.score_sum += score;
        self.penalty_sum += penalty;
        self.count += 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Mean of everything pushed so far (zeros when empty)
    pub fn mean(&self) -> EpochScore {
        if self.count == 0 {
            return EpochScore::default();
        }
        let n = self.count as f64;
        EpochScore {
            score: self.score_sum / n,
            penalty: self.penalty_sum / n,
        }
    }
}

/// Per-epoch history of critic and generator scores
#[derive(Debug, Clone, Default)]
pub struct ScoreHistory {
    pub critic: Vec<EpochScore>,
    pub generator: Vec<EpochScore>,
}

impl ScoreHistory {
    /// Create new empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// Record epoch means
    pub fn record_epoch(&mut self, critic: EpochScore, generator: EpochScore) {
        self.critic.push(critic);
        self.generator.push(generator);
    }

    /// Get number of recorded epochs
    pub fn num_epochs(&self) -> usize {
        self.critic.len()
    }

    pub fn is_empty(&self) -> bool {
        self.critic.is_empty()
    }

    /// Latest `(critic, generator)` entry
    pub fn latest(&self) -> Option<(EpochScore, EpochScore)> {
        Some((*self.critic.last()?, *self.generator.last()?))
    }

    /// Keep only the first `epochs` entries
    pub fn truncate(&mut self, epochs: usize) {
        self.critic.truncate(epochs);
        self.generator.truncate(epochs);
    }

    /// Write `critic_scores.npy` and `generator_scores.npy` into `dir`
    pub fn save_npy<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        write_pairs(&self.critic, &dir.join("critic_scores.npy"))?;
        write_pairs(&self.generator, &dir.join("generator_scores.npy"))?;
        Ok(())
    }

    /// Read the history written by [`ScoreHistory::save_npy`]
    pub fn load_npy<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let critic = read_pairs(&dir.join("critic_scores.npy"))?;
        let generator = read_pairs(&dir.join("generator_scores.npy"))?;
        if critic.len() != generator.len() {
            return Err(GanError::shape(format!(
                "score history has {} critic but {} generator epochs",
                critic.len(),
                generator.len()
            )));
        }
        Ok(Self { critic, generator })
    }

    /// Save history to CSV file
    pub fn save_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;

        writer.write_record([
            "epoch",
            "critic_score",
            "critic_penalty",
            "generator_score",
            "generator_penalty",
        ])?;

        for (i, (c, g)) in self.critic.iter().zip(&self.generator).enumerate() {
            writer.write_record([
                (i + 1).to_string(),
                c.score.to_string(),
                c.penalty.to_string(),
                g.score.to_string(),
                g.penalty.to_string(),
            ])?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Load history from CSV file
    pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut history = Self::new();

        let parse = |field: &str| -> Result<f64> {
            field
                .parse()
                .map_err(|_| GanError::shape(format!("bad score value {:?}", field)))
        };

        for result in reader.records() {
            let record = result?;
            if record.len() < 5 {
                return Err(GanError::shape(format!("score row has {} columns", record.len())));
            }
            history.record_epoch(
                EpochScore {
                    score: parse(&record[1])?,
                    penalty: parse(&record[2])?,
                },
                EpochScore {
                    score: parse(&record[3])?,
                    penalty: parse(&record[4])?,
                },
            );
        }

        Ok(history)
    }
}

fn write_pairs(scores: &[EpochScore], path: &Path) -> Result<()> {
    let flat: Vec<f64> = scores.iter().flat_map(|s| [s.score, s.penalty]).collect();
    Tensor::from_slice(&flat)
        .view([scores.len() as i64, 2])
        .write_npy(path)?;
    Ok(())
}

fn read_pairs(path: &Path) -> Result<Vec<EpochScore>> {
    let tensor = Tensor::read_npy(path)?.to_kind(Kind::Double);
    let size = tensor.size();
    if size.len() != 2 || size[1] != 2 {
        return Err(GanError::shape(format!(
            "{} has shape {:?}, expected (epochs, 2)",
            path.display(),
            size
        )));
    }
    let flat = Vec::<f64>::try_from(&tensor.flatten(0, -1))?;
    Ok(flat
        .chunks(2)
        .map(|pair| EpochScore {
            score: pair[0],
            penalty: pair[1],
        })
        .collect())
}

/// Exponential moving average tracker
#[derive(Debug)]
pub struct EmaTracker {
    value: f64,
    alpha: f64,
    initialized: bool,
}

impl EmaTracker {
    /// Create new EMA tracker
    ///
    /// # Arguments
    ///
    /// * `alpha` - Smoothing factor (0 < alpha <= 1). Higher = more weight on recent
    pub fn new(alpha: f64) -> Self {
        Self {
            value: 0.0,
            alpha: alpha.clamp(0.001, 1.0),
            initialized: false,
        }
    }

    /// Update with new value
    pub fn update(&mut self, new_value: f64) {
        if !self.initialized {
            self.value = new_value;
            self.initialized = true;
        } else {
            self.value = self.alpha * new_value + (1.0 - self.alpha) * self.value;
        }
    }

    /// Get current EMA value
    pub fn value(&self) -> f64 {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn history() -> ScoreHistory {
        let mut history = ScoreHistory::new();
        history.record_epoch(
            EpochScore { score: -1.5, penalty: 0.25 },
            EpochScore { score: 0.5, penalty: 0.0 },
        );
        history.record_epoch(
            EpochScore { score: -1.25, penalty: 0.5 },
            EpochScore { score: 0.75, penalty: 0.0 },
        );
        history
    }

    #[test]
    fn test_accumulator_mean() {
        let mut acc = ScoreAccumulator::new();
        assert_eq!(acc.mean(), EpochScore::default());
        acc.push((1.0, 0.5));
        acc.push((3.0, 1.5));
        assert_eq!(acc.count(), 2);
        assert_eq!(acc.mean(), EpochScore { score: 2.0, penalty: 1.0 });
    }

    #[test]
    fn test_history_npy_files() {
        let dir = tempdir().unwrap();
        let history = history();
        history.save_npy(dir.path()).unwrap();

        assert!(dir.path().join("critic_scores.npy").exists());
        let loaded = ScoreHistory::load_npy(dir.path()).unwrap();
        assert_eq!(loaded.num_epochs(), 2);
        assert_eq!(loaded.critic[1], history.critic[1]);
        assert_eq!(loaded.latest(), history.latest());
    }

    #[test]
    fn test_history_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scores.csv");
        history().save_csv(&path).unwrap();

        let loaded = ScoreHistory::load_csv(&path).unwrap();
        assert_eq!(loaded.generator, history().generator);
    }

    #[test]
    fn test_ema_tracker() {
        let mut ema = EmaTracker::new(0.5);

        ema.update(10.0);
        assert_eq!(ema.value(), 10.0);

        ema.update(20.0);
        assert_eq!(ema.value(), 15.0); // 0.5 * 20 + 0.5 * 10
    }
}
