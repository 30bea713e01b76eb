//! Pool configuration

use std::time::Duration;

use eyre::{Result, eyre};
use serde::{Deserialize, Serialize};

/// Default fraction of `max_queue_size` at which a pool reports backpressure
///
/// With `max_queue_size` 10 this starts at 7 queued; a ratio of 0.6 starts it at 6.
pub const DEFAULT_BACKPRESSURE_RATIO: f64 = 0.7;

/// Tuning for a single pool, fixed at construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Max operations executing at once
    #[serde(rename = "max-concurrent", default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Queue depth at which the pool is overloaded
    #[serde(rename = "max-queue-size", default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// Queue-wait limit for requests submitted without an explicit timeout
    #[serde(rename = "default-timeout-ms", default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    /// Reject `low` submissions outright while overloaded
    #[serde(rename = "drop-low-priority-on-overload", default)]
    pub drop_low_priority_on_overload: bool,

    /// Period of the dispatch/expiry timer
    #[serde(rename = "process-interval-ms", default = "default_process_interval_ms")]
    pub process_interval_ms: u64,

    /// Fraction of `max_queue_size` that counts as backpressure
    #[serde(rename = "backpressure-ratio", default = "default_backpressure_ratio")]
    pub backpressure_ratio: f64,

    /// Buffered pool events per subscriber
    #[serde(rename = "event-capacity", default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_max_concurrent() -> usize {
    4
}

fn default_max_queue_size() -> usize {
    100
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_process_interval_ms() -> u64 {
    100
}

fn default_backpressure_ratio() -> f64 {
    DEFAULT_BACKPRESSURE_RATIO
}

fn default_event_capacity() -> usize {
    256
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            max_queue_size: default_max_queue_size(),
            default_timeout_ms: default_timeout_ms(),
            drop_low_priority_on_overload: false,
            process_interval_ms: default_process_interval_ms(),
            backpressure_ratio: DEFAULT_BACKPRESSURE_RATIO,
            event_capacity: default_event_capacity(),
        }
    }
}

impl PoolConfig {
    /// Many small, droppable, short-lived uploads (screenshots, telemetry)
    pub fn upload() -> Self {
        Self {
            max_concurrent: 3,
            max_queue_size: 50,
            default_timeout_ms: 30_000,
            drop_low_priority_on_overload: true,
            ..Default::default()
        }
    }

    /// Fewer, non-droppable calls that may wait longer (commands, auth)
    pub fn api() -> Self {
        Self {
            max_concurrent: 5,
            max_queue_size: 100,
            default_timeout_ms: 60_000,
            drop_low_priority_on_overload: false,
            ..Default::default()
        }
    }

    /// Get the default request timeout as a Duration
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// Get the timer period as a Duration
    pub fn process_interval(&self) -> Duration {
        Duration::from_millis(self.process_interval_ms)
    }

    /// Queue depth at which backpressure starts
    pub fn backpressure_threshold(&self) -> f64 {
        self.max_queue_size as f64 * self.backpressure_ratio
    }

    /// Reject configurations a pool cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(eyre!("max-concurrent must be at least 1"));
        }
        if self.max_queue_size == 0 {
            return Err(eyre!("max-queue-size must be at least 1"));
        }
        if self.process_interval_ms == 0 {
            return Err(eyre!("process-interval-ms must be at least 1"));
        }
        if !(self.backpressure_ratio > 0.0 && self.backpressure_ratio <= 1.0) {
            return Err(eyre!(
                "backpressure-ratio must be in (0, 1], got {}",
                self.backpressure_ratio
            ));
        }
        if self.event_capacity == 0 {
            return Err(eyre!("event-capacity must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PoolConfig::default();
        assert_eq!(config.max_concurrent, 4);
        assert_eq!(config.max_queue_size, 100);
        assert_eq!(config.default_timeout(), Duration::from_secs(30));
        assert!(!config.drop_low_priority_on_overload);
        assert_eq!(config.process_interval(), Duration::from_millis(100));
        assert_eq!(config.backpressure_ratio, 0.7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets() {
        let upload = PoolConfig::upload();
        assert!(upload.drop_low_priority_on_overload);
        assert!(upload.validate().is_ok());

        let api = PoolConfig::api();
        assert!(!api.drop_low_priority_on_overload);
        assert!(api.default_timeout() > upload.default_timeout());
        assert!(api.max_concurrent > upload.max_concurrent);
        assert!(api.validate().is_ok());
    }

    #[test]
    fn test_backpressure_threshold() {
        let config = PoolConfig {
            max_queue_size: 10,
            ..Default::default()
        };
        assert!((config.backpressure_threshold() - 7.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_validate_rejects_unusable_values() {
        let zero_concurrency = PoolConfig {
            max_concurrent: 0,
            ..Default::default()
        };
        assert!(zero_concurrency.validate().is_err());

        let zero_interval = PoolConfig {
            process_interval_ms: 0,
            ..Default::default()
        };
        assert!(zero_interval.validate().is_err());

        let bad_ratio = PoolConfig {
            backpressure_ratio: 1.5,
            ..Default::default()
        };
        assert!(bad_ratio.validate().is_err());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "max-concurrent: 2\ndrop-low-priority-on-overload: true\n";
        let config: PoolConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.max_concurrent, 2);
        assert!(config.drop_low_priority_on_overload);
        assert_eq!(config.max_queue_size, 100);
        assert_eq!(config.backpressure_ratio, DEFAULT_BACKPRESSURE_RATIO);
    }
}
