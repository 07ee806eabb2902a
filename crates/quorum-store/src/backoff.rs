//! Exponential backoff with jitter

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff configuration for conflict retries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Initial backoff delay (milliseconds)
    pub initial_delay_ms: u64,

    /// Maximum backoff delay (milliseconds)
    pub max_delay_ms: u64,

    /// Backoff multiplier
    pub multiplier: f64,

    /// Random extra delay as a fraction of the base delay; 0 disables jitter
    pub jitter: f64,

    /// Attempts before giving up, including the first
    pub max_attempts: u32,

    /// Upper bound on total time spent backing off (milliseconds)
    pub max_elapsed_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 10,
            max_delay_ms: 1_000,
            multiplier: 2.0,
            jitter: 0.1,
            max_attempts: 5,
            max_elapsed_ms: 10_000,
        }
    }
}

impl BackoffConfig {
    pub fn max_elapsed(&self) -> Duration {
        Duration::from_millis(self.max_elapsed_ms)
    }
}

/// Delay sequence for one retry loop
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    base_ms: f64,
}

impl Backoff {
    pub fn new(config: &BackoffConfig) -> Self {
        Self {
            config: config.clone(),
            base_ms: config.initial_delay_ms as f64,
        }
    }

    /// Next delay; never exceeds `max_delay_ms`
    pub fn next_delay(&mut self) -> Duration {
        let max_ms = self.config.max_delay_ms as f64;
        let jitter = if self.config.jitter > 0.0 {
            rand::thread_rng().gen_range(0.0..=self.config.jitter)
        } else {
            0.0
        };
        let delay_ms = (self.base_ms * (1.0 + jitter)).min(max_ms);
        self.base_ms = (self.base_ms * self.config.multiplier.max(1.0)).min(max_ms);
        Duration::from_millis(delay_ms.round() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_grow_without_jitter() {
        let config = BackoffConfig {
            initial_delay_ms: 10,
            max_delay_ms: 1_000,
            multiplier: 2.0,
            jitter: 0.0,
            ..Default::default()
        };
        let mut backoff = Backoff::new(&config);
        let delays: Vec<u64> = (0..4).map(|_| backoff.next_delay().as_millis() as u64).collect();
        assert_eq!(delays, vec![10, 20, 40, 80]);
    }

    #[test]
    fn test_delay_capped() {
        let config = BackoffConfig {
            initial_delay_ms: 400,
            max_delay_ms: 500,
            multiplier: 3.0,
            jitter: 0.5,
            ..Default::default()
        };
        let mut backoff = Backoff::new(&config);
        for _ in 0..10 {
            assert!(backoff.next_delay() <= Duration::from_millis(500));
        }
    }

    #[test]
    fn test_jitter_stays_within_fraction() {
        let config = BackoffConfig {
            initial_delay_ms: 100,
            max_delay_ms: 10_000,
            multiplier: 1.0,
            jitter: 0.2,
            ..Default::default()
        };
        let mut backoff = Backoff::new(&config);
        for _ in 0..50 {
            let delay = backoff.next_delay().as_millis();
            assert!((100..=120).contains(&delay), "delay {delay}");
        }
    }
}
