//! Accrual workers.
//!
//! Each worker takes one job at a time from the shared job queue, waits for the rate-limit
//! gate, performs a single accrual request and forwards successes to the collector.
//! The number of workers bounds the number of in-flight requests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::accrual::{AccrualError, AccrualService, ErrorClass, RateLimitGate};
use crate::order::OrderStatus;

use super::types::{Job, JobResult, ReconcilerStats};

/// Job queue receiver shared by all workers.
pub(crate) type SharedJobs = Arc<Mutex<mpsc::Receiver<Job>>>;

pub(crate) struct AccrualWorker {
    pub id: usize,
    pub jobs: SharedJobs,
    pub results: mpsc::Sender<JobResult>,
    pub accrual: Arc<dyn AccrualService>,
    pub gate: Arc<RateLimitGate>,
    pub stats: Arc<ReconcilerStats>,
    pub request_timeout: Duration,
    pub shutdown: CancellationToken,
}

impl AccrualWorker {
    /// Process jobs until the job queue is closed and empty.
    pub async fn run(self) {
        debug!(worker_id = self.id, "Accrual worker started");

        loop {
            let job = {
                let mut jobs = self.jobs.lock().await;
                jobs.recv().await
            };
            let Some(job) = job else {
                break;
            };

            if let Some(result) = self.process(job).await {
                if self.results.send(result).await.is_err() {
                    error!(worker_id = self.id, "Result queue closed, worker exiting");
                    break;
                }
            }
        }

        debug!(worker_id = self.id, "Accrual worker stopped");
    }

    async fn process(&self, job: Job) -> Option<JobResult> {
        if !self.gate.wait_ready(&self.shutdown).await {
            ReconcilerStats::incr(&self.stats.jobs_dropped);
            debug!(
                worker_id = self.id,
                job_id = job.id,
                order = %job.order_number,
                "Shutdown during rate-limit pause, dropping job"
            );
            return None;
        }

        let outcome = {
            let _in_flight = InFlight::enter(&self.stats.queries_in_flight);
            tokio::time::timeout(
                self.request_timeout,
                self.accrual.get_order_accrual(&job.order_number),
            )
            .await
        };

        match outcome {
            Ok(Ok(accrual)) => {
                ReconcilerStats::incr(&self.stats.queries_succeeded);
                debug!(
                    worker_id = self.id,
                    job_id = job.id,
                    order = %job.order_number,
                    status = %accrual.status,
                    accrual = %accrual.accrual,
                    "Got order accrual"
                );
                Some(JobResult {
                    job_id: job.id,
                    order_number: job.order_number,
                    known_status: job.known_status,
                    status: OrderStatus::from(accrual.status),
                    accrual: accrual.accrual,
                })
            }
            Ok(Err(e)) => {
                ReconcilerStats::incr(&self.stats.queries_failed);
                self.handle_error(&job, e).await;
                None
            }
            Err(_) => {
                ReconcilerStats::incr(&self.stats.queries_failed);
                warn!(
                    worker_id = self.id,
                    job_id = job.id,
                    order = %job.order_number,
                    timeout_ms = self.request_timeout.as_millis() as u64,
                    "Accrual request timed out"
                );
                None
            }
        }
    }

    async fn handle_error(&self, job: &Job, e: AccrualError) {
        if let AccrualError::RateLimited { retry_after } = e {
            ReconcilerStats::incr(&self.stats.rate_limit_hits);
            let resume_at = self.gate.pause_for(retry_after).await;
            let paused_for = resume_at.saturating_duration_since(tokio::time::Instant::now());
            warn!(
                worker_id = self.id,
                job_id = job.id,
                order = %job.order_number,
                retry_after_secs = retry_after.as_secs(),
                paused_for_ms = paused_for.as_millis() as u64,
                "Accrual system rate limit hit, pausing all workers"
            );
            return;
        }

        match e.class() {
            ErrorClass::Protocol => error!(
                worker_id = self.id,
                job_id = job.id,
                order = %job.order_number,
                error = %e,
                "Accrual system returned a response we cannot use"
            ),
            _ => warn!(
                worker_id = self.id,
                job_id = job.id,
                order = %job.order_number,
                error = %e,
                "Getting order accrual failed"
            ),
        }
    }
}

/// Counts a request as in flight until dropped, including on unwind.
struct InFlight<'a>(&'a AtomicU64);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicU64) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}
