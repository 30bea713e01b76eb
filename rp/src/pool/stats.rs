//! Pool health and statistics

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Coarse health of a pool, derived from its current state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PoolStatus {
    #[default]
    Healthy,
    Backpressure,
    Overloaded,
    Paused,
}

impl std::fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Backpressure => write!(f, "backpressure"),
            Self::Overloaded => write!(f, "overloaded"),
            Self::Paused => write!(f, "paused"),
        }
    }
}

/// Classify pool health
///
/// Precedence: paused, then overloaded (`queue_len >= max_queue_size`), then
/// backpressure (`queue_len >= ratio * max_queue_size`), else healthy.
///
/// At the default ratio of 0.7 a queue of 6 out of 10 is still healthy;
/// set `backpressure-ratio: 0.6` to report backpressure from 6 of 10.
pub fn classify(paused: bool, queue_len: usize, max_queue_size: usize, backpressure_ratio: f64) -> PoolStatus {
    if paused {
        PoolStatus::Paused
    } else if queue_len >= max_queue_size {
        PoolStatus::Overloaded
    } else if queue_len as f64 >= max_queue_size as f64 * backpressure_ratio {
        PoolStatus::Backpressure
    } else {
        PoolStatus::Healthy
    }
}

/// Monotonic counters owned by a pool's actor
#[derive(Debug, Clone, Default)]
pub(crate) struct PoolCounters {
    pub completed: u64,
    pub failed: u64,
    pub dropped: u64,
    pub total_latency: Duration,
    pub latency_samples: u64,
    pub peak_queue_depth: usize,
    pub peak_concurrent: usize,
}

impl PoolCounters {
    pub fn record_success(&mut self, elapsed: Duration) {
        self.completed += 1;
        self.total_latency += elapsed;
        self.latency_samples += 1;
    }

    pub fn record_failure(&mut self) {
        self.failed += 1;
    }

    pub fn record_drop(&mut self) {
        self.dropped += 1;
    }

    pub fn observe_depths(&mut self, queued: usize, active: usize) {
        self.peak_queue_depth = self.peak_queue_depth.max(queued);
        self.peak_concurrent = self.peak_concurrent.max(active);
    }

    /// Mean execution time of successful operations
    pub fn average_latency(&self) -> Duration {
        if self.latency_samples == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos((self.total_latency.as_nanos() / self.latency_samples as u128) as u64)
        }
    }
}

/// Read-only snapshot of a pool's state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolStatistics {
    pub pool: String,
    pub status: PoolStatus,
    pub active_requests: usize,
    pub queued_requests: usize,
    pub completed_requests: u64,
    pub failed_requests: u64,
    pub dropped_requests: u64,
    /// Requests that reached a final outcome after admission (completed + failed)
    pub total_processed: u64,
    /// Mean execution time of successful operations, in milliseconds
    pub average_latency_ms: f64,
    pub max_concurrent: usize,
    pub max_queue_size: usize,
    pub peak_queue_depth: usize,
    pub peak_concurrent: usize,
    pub disposed: bool,
}

impl PoolStatistics {
    /// Whether a submission right now would find a free slot (advisory)
    pub fn has_free_slot(&self) -> bool {
        !self.disposed && self.active_requests < self.max_concurrent
    }

    /// Mean execution time of successful operations
    pub fn average_latency(&self) -> Duration {
        Duration::from_secs_f64(self.average_latency_ms / 1000.0)
    }
}
