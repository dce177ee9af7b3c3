//! Types for the accrual reconciler.

use std::sync::atomic::{AtomicU64, Ordering};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::order::OrderStatus;

/// Errors raised by the reconciler itself.
///
/// Failures while talking to the accrual service or the store are logged and never surface
/// here.
#[derive(Debug, Error)]
pub enum ReconcilerError {
    /// Configuration the engine cannot run with.
    #[error("invalid reconciler configuration: {0}")]
    InvalidConfig(String),

    /// `run` was called while another run is active.
    #[error("reconciler is already running")]
    AlreadyRunning,

    /// The engine task panicked or was aborted.
    #[error("reconciler task failed: {0}")]
    TaskFailed(String),
}

/// One accrual lookup for one order, created by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Monotonically increasing in discovery order.
    pub id: u64,
    pub order_number: String,
    /// Status the store reported when the order was discovered.
    pub known_status: OrderStatus,
}

/// Successful outcome of a [`Job`].
///
/// Failed lookups produce no result at all, so everything that reaches the collector is a
/// candidate for writing.
#[derive(Debug, Clone, PartialEq)]
pub struct JobResult {
    pub job_id: u64,
    pub order_number: String,
    pub known_status: OrderStatus,
    pub status: OrderStatus,
    pub accrual: Decimal,
}

/// Lifecycle of a reconciler run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    /// Never started.
    #[default]
    Idle,
    /// Discovering, querying and writing.
    Running,
    /// Shutdown requested; in-flight work is being finished.
    Draining,
    /// Every task joined; no further store access.
    Stopped,
}

/// Snapshot of the reconciler's counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconcilerStatus {
    pub phase: LifecyclePhase,
    pub worker_count: usize,
    /// Jobs handed to the worker queue.
    pub jobs_enqueued: u64,
    /// Jobs dropped without a request (shutdown during a rate-limit pause).
    pub jobs_dropped: u64,
    pub queries_in_flight: u64,
    pub queries_succeeded: u64,
    pub queries_failed: u64,
    pub rate_limit_hits: u64,
    pub results_written: u64,
    /// Results not written because they were no change, stale, or after a final status.
    pub writes_skipped: u64,
    pub writes_failed: u64,
    pub polls_failed: u64,
    /// Discovery ticks skipped because of a rate-limit pause.
    pub polls_skipped: u64,
    /// Workers replaced after a panic.
    pub workers_restarted: u64,
    /// Remaining rate-limit pause, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limited_for_ms: Option<u64>,
}

/// Shared counters updated by the poller, workers and collector.
#[derive(Debug, Default)]
pub(crate) struct ReconcilerStats {
    pub jobs_enqueued: AtomicU64,
    pub jobs_dropped: AtomicU64,
    pub queries_in_flight: AtomicU64,
    pub queries_succeeded: AtomicU64,
    pub queries_failed: AtomicU64,
    pub rate_limit_hits: AtomicU64,
    pub results_written: AtomicU64,
    pub writes_skipped: AtomicU64,
    pub writes_failed: AtomicU64,
    pub polls_failed: AtomicU64,
    pub polls_skipped: AtomicU64,
    pub workers_restarted: AtomicU64,
}

impl ReconcilerStats {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn to_status(&self, phase: LifecyclePhase, worker_count: usize) -> ReconcilerStatus {
        ReconcilerStatus {
            phase,
            worker_count,
            jobs_enqueued: self.jobs_enqueued.load(Ordering::Relaxed),
            jobs_dropped: self.jobs_dropped.load(Ordering::Relaxed),
            queries_in_flight: self.queries_in_flight.load(Ordering::Relaxed),
            queries_succeeded: self.queries_succeeded.load(Ordering::Relaxed),
            queries_failed: self.queries_failed.load(Ordering::Relaxed),
            rate_limit_hits: self.rate_limit_hits.load(Ordering::Relaxed),
            results_written: self.results_written.load(Ordering::Relaxed),
            writes_skipped: self.writes_skipped.load(Ordering::Relaxed),
            writes_failed: self.writes_failed.load(Ordering::Relaxed),
            polls_failed: self.polls_failed.load(Ordering::Relaxed),
            polls_skipped: self.polls_skipped.load(Ordering::Relaxed),
            workers_restarted: self.workers_restarted.load(Ordering::Relaxed),
            rate_limited_for_ms: None,
        }
    }
}
