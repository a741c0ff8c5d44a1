//! Reward centering and reward tracking.

use serde::{Deserialize, Serialize};

/// Exponential moving average.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExponentialMovingAverage {
    value: f64,
    decay: f64,
    count: usize,
    bias_correction: bool,
}

impl ExponentialMovingAverage {
    /// Bias-corrected average: early readings are not pulled toward zero.
    pub fn new(decay: f64) -> Self {
        Self {
            value: 0.0,
            decay,
            count: 0,
            bias_correction: true,
        }
    }

    pub fn without_bias_correction(decay: f64) -> Self {
        Self {
            bias_correction: false,
            ..Self::new(decay)
        }
    }

    pub fn update(&mut self, value: f64) {
        self.count += 1;
        self.value = self.decay * self.value + (1.0 - self.decay) * value;
    }

    pub fn get(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        if self.bias_correction {
            self.value / (1.0 - self.decay.powi(self.count as i32))
        } else {
            self.value
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn reset(&mut self) {
        self.value = 0.0;
        self.count = 0;
    }
}

/// Running baseline subtracted from continuing-task rewards.
///
/// The first reward seeds the baseline and is returned as is; afterwards
/// `avg' = tau * avg + (1 - tau) * reward` and the result is `reward - avg'`.
/// Centering the seed on itself would report it as 0; it passes through
/// uncentered instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardBaseline {
    tau: f64,
    average: Option<f64>,
}

impl RewardBaseline {
    pub fn new(tau: f64) -> Self {
        Self { tau, average: None }
    }

    pub fn center(&mut self, reward: f64) -> f64 {
        match self.average {
            None => {
                self.average = Some(reward);
                reward
            }
            Some(average) => {
                let updated = self.tau * average + (1.0 - self.tau) * reward;
                self.average = Some(updated);
                reward - updated
            }
        }
    }

    pub fn average(&self) -> Option<f64> {
        self.average
    }
}

/// Snapshot of one reward tracker.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RewardStats {
    pub cumulative: f64,
    pub moving_average: f64,
    pub count: usize,
}

/// Cumulative reward and its moving average.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardTracker {
    cumulative: f64,
    average: ExponentialMovingAverage,
}

impl RewardTracker {
    pub fn new(tau: f64) -> Self {
        Self {
            cumulative: 0.0,
            average: ExponentialMovingAverage::new(tau),
        }
    }

    pub fn record(&mut self, reward: f64) {
        self.cumulative += reward;
        self.average.update(reward);
    }

    pub fn stats(&self) -> RewardStats {
        RewardStats {
            cumulative: self.cumulative,
            moving_average: self.average.get(),
            count: self.average.count(),
        }
    }

    pub fn reset(&mut self) {
        self.cumulative = 0.0;
        self.average.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ema_bias_correction() {
        let mut ema = ExponentialMovingAverage::new(0.9);
        ema.update(10.0);
        assert!((ema.get() - 10.0).abs() < 1e-9);

        let mut raw = ExponentialMovingAverage::without_bias_correction(0.9);
        raw.update(10.0);
        assert!((raw.get() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_ema_converges_and_resets() {
        let mut ema = ExponentialMovingAverage::new(0.9);
        ema.update(10.0);
        for _ in 0..200 {
            ema.update(20.0);
        }
        assert!((ema.get() - 20.0).abs() < 0.01);
        ema.reset();
        assert_eq!(ema.count(), 0);
        assert_eq!(ema.get(), 0.0);
    }

    #[test]
    fn test_baseline_first_reward_is_uncentered() {
        let mut baseline = RewardBaseline::new(0.9);
        assert_eq!(baseline.center(3.0), 3.0);
        assert_eq!(baseline.average(), Some(3.0));
        // avg' = 0.9 * 3 + 0.1 * 13 = 4
        assert!((baseline.center(13.0) - 9.0).abs() < 1e-9);
    }

    #[test]
    fn test_baseline_drives_constant_reward_to_zero() {
        let mut baseline = RewardBaseline::new(0.9);
        baseline.center(0.0);
        let mut centered = f64::MAX;
        for _ in 0..200 {
            centered = baseline.center(5.0);
        }
        assert!((baseline.average().unwrap() - 5.0).abs() < 1e-6);
        assert!(centered.abs() < 1e-6);
    }

    #[test]
    fn test_tracker_stats() {
        let mut tracker = RewardTracker::new(0.5);
        tracker.record(1.0);
        tracker.record(3.0);
        let stats = tracker.stats();
        assert_eq!(stats.cumulative, 4.0);
        assert_eq!(stats.count, 2);
        tracker.reset();
        assert_eq!(tracker.stats(), RewardStats::default());
    }
}
