//! Critic / generator update ratio

use serde::{Deserialize, Serialize};

/// Number of critic updates to run before each generator update
///
/// The critic gets `large` runs during warm-up and on every `boost_every`-th
/// generator iteration, `regular` runs otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriticSchedule {
    /// Critic runs on ordinary iterations
    pub regular: usize,
    /// Critic runs during warm-up and boosts
    pub large: usize,
    /// Generator iterations that always get `large` runs
    pub warmup: usize,
    /// Boost frequency in generator iterations (0 disables boosts)
    pub boost_every: usize,
}

impl Default for CriticSchedule {
    fn default() -> Self {
        Self {
            regular: 5,
            large: 100,
            warmup: 25,
            boost_every: 500,
        }
    }
}

impl CriticSchedule {
    /// Critic runs before generator iteration `generator_iterations`
    pub fn critic_runs(&self, generator_iterations: usize) -> usize {
        let boosted = self.boost_every > 0 && generator_iterations % self.boost_every == 0;
        if generator_iterations < self.warmup || boosted {
            self.large
        } else {
            self.regular
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_critic_runs() {
        let schedule = CriticSchedule::default();
        assert_eq!(schedule.critic_runs(0), 100);
        assert_eq!(schedule.critic_runs(10), 100);
        assert_eq!(schedule.critic_runs(25), 5);
        assert_eq!(schedule.critic_runs(500), 100);
        assert_eq!(schedule.critic_runs(501), 5);
    }

    #[test]
    fn test_boost_disabled() {
        let schedule = CriticSchedule {
            boost_every: 0,
            warmup: 0,
            ..Default::default()
        };
        assert_eq!(schedule.critic_runs(0), 5);
        assert_eq!(schedule.critic_runs(1000), 5);
    }
}
