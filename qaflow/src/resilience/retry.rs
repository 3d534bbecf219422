//! Retry backoff and jitter policy.
//!
//! Delays grow as `base * multiplier^attempt`, capped at a maximum.
//! Jitter randomizes the delay so concurrent fan-out calls that fail
//! together do not retry together.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Jitter strategy to prevent thundering herd.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    None,
    /// Random from 0 to delay
    #[default]
    Full,
    /// Half fixed, half random
    Equal,
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts, including the initial call.
    pub max_attempts: u32,
    /// Base delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Backoff multiplier applied per attempt.
    pub multiplier: f64,
    /// Delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Jitter strategy.
    pub jitter: JitterStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            multiplier: 2.0,
            max_delay_ms: 30_000,
            jitter: JitterStrategy::Full,
        }
    }
}

impl RetryConfig {
    /// Creates a new retry config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the delay cap.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Returns true if `attempt` (0-indexed) was the last allowed one.
    #[must_use]
    pub fn is_last_attempt(&self, attempt: u32) -> bool {
        attempt + 1 >= self.max_attempts
    }
}

/// Computes the jittered delay before retrying after `attempt`
/// (0-indexed: the delay after the first failed call uses attempt 0).
#[must_use]
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let raw = (config.base_delay_ms as f64) * config.multiplier.powi(attempt as i32);
    let capped = raw.min(config.max_delay_ms as f64).max(0.0) as u64;

    let jittered = match config.jitter {
        JitterStrategy::None => capped,
        JitterStrategy::Full => {
            if capped == 0 {
                0
            } else {
                rand::thread_rng().gen_range(0..=capped)
            }
        }
        JitterStrategy::Equal => {
            let half = capped / 2;
            if half == 0 {
                capped
            } else {
                half + rand::thread_rng().gen_range(0..=half)
            }
        }
    };

    Duration::from_millis(jittered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.base_delay_ms, 500);
        assert_eq!(config.jitter, JitterStrategy::Full);
    }

    #[test]
    fn test_exponential_growth_no_jitter() {
        let config = RetryConfig::new()
            .with_base_delay_ms(100)
            .with_multiplier(2.0)
            .with_jitter(JitterStrategy::None);

        assert_eq!(backoff_delay(&config, 0), Duration::from_millis(100));
        assert_eq!(backoff_delay(&config, 1), Duration::from_millis(200));
        assert_eq!(backoff_delay(&config, 2), Duration::from_millis(400));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let config = RetryConfig::new()
            .with_base_delay_ms(1000)
            .with_max_delay_ms(5000)
            .with_jitter(JitterStrategy::None);

        assert_eq!(backoff_delay(&config, 10), Duration::from_millis(5000));
    }

    #[test]
    fn test_full_jitter_bounds() {
        let config = RetryConfig::new()
            .with_base_delay_ms(100)
            .with_jitter(JitterStrategy::Full);

        for _ in 0..100 {
            let delay = backoff_delay(&config, 0);
            assert!(delay <= Duration::from_millis(100));
        }
    }

    #[test]
    fn test_equal_jitter_bounds() {
        let config = RetryConfig::new()
            .with_base_delay_ms(100)
            .with_jitter(JitterStrategy::Equal);

        for _ in 0..100 {
            let delay = backoff_delay(&config, 0);
            assert!(delay >= Duration::from_millis(50));
            assert!(delay <= Duration::from_millis(100));
        }
    }

    #[test]
    fn test_last_attempt() {
        let config = RetryConfig::new().with_max_attempts(3);
        assert!(!config.is_last_attempt(0));
        assert!(!config.is_last_attempt(1));
        assert!(config.is_last_attempt(2));
    }
}
