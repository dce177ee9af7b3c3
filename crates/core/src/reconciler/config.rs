//! Reconciler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::types::ReconcilerError;

/// Configuration for the accrual reconciler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Enable/disable the reconciler.
    /// When disabled, order statuses are never refreshed from the accrual service.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// How often to look for orders that are not final yet (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Number of concurrent accrual workers.
    /// This is also the upper bound on in-flight accrual requests.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Capacity of the job queue between discovery and workers.
    /// Discovery blocks when it is full.
    #[serde(default = "default_queue_capacity")]
    pub job_queue_capacity: usize,

    /// Capacity of the result queue between workers and the collector.
    #[serde(default = "default_queue_capacity")]
    pub result_queue_capacity: usize,

    /// Timeout for a single accrual request (milliseconds).
    #[serde(default = "default_call_timeout")]
    pub request_timeout_ms: u64,

    /// Timeout for a single order store call (milliseconds).
    #[serde(default = "default_call_timeout")]
    pub store_timeout_ms: u64,

    /// How often to log a progress line while running (milliseconds).
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,

    /// How many orders the collector remembers the last written status for.
    #[serde(default = "default_guard_capacity")]
    pub guard_capacity: usize,
}

fn default_enabled() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    1000 // 1 second
}

fn default_worker_count() -> usize {
    3
}

fn default_queue_capacity() -> usize {
    10
}

fn default_call_timeout() -> u64 {
    3000 // 3 seconds
}

fn default_heartbeat_interval() -> u64 {
    5000 // 5 seconds
}

fn default_guard_capacity() -> usize {
    10_000
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            poll_interval_ms: default_poll_interval(),
            worker_count: default_worker_count(),
            job_queue_capacity: default_queue_capacity(),
            result_queue_capacity: default_queue_capacity(),
            request_timeout_ms: default_call_timeout(),
            store_timeout_ms: default_call_timeout(),
            heartbeat_interval_ms: default_heartbeat_interval(),
            guard_capacity: default_guard_capacity(),
        }
    }
}

impl ReconcilerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Reject values the engine cannot run with (zero-sized queues, zero intervals).
    pub fn validate(&self) -> Result<(), ReconcilerError> {
        let checks = [
            (self.worker_count == 0, "worker_count must be at least 1"),
            (self.job_queue_capacity == 0, "job_queue_capacity must be at least 1"),
            (
                self.result_queue_capacity == 0,
                "result_queue_capacity must be at least 1",
            ),
            (self.poll_interval_ms == 0, "poll_interval_ms cannot be 0"),
            (self.request_timeout_ms == 0, "request_timeout_ms cannot be 0"),
            (self.store_timeout_ms == 0, "store_timeout_ms cannot be 0"),
            (self.heartbeat_interval_ms == 0, "heartbeat_interval_ms cannot be 0"),
            (self.guard_capacity == 0, "guard_capacity must be at least 1"),
        ];

        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(ReconcilerError::InvalidConfig(message.to_string())),
            None => Ok(()),
        }
    }
}
