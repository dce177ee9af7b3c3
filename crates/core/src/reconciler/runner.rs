//! Accrual reconciler.
//!
//! Wires the pipeline together:
//! - Discovery: one poller lists orders that are not final and fills the job queue
//! - Query: a fixed pool of workers asks the accrual service, one request per worker
//! - Write: a single collector applies results to the store
//!
//! A worker that panics is replaced with a fresh one under the same id; its job is picked up
//! again by a later discovery pass.
//!
//! Shutdown stops discovery first. Workers finish the queued jobs, the collector writes
//! every result that reaches it, then the run returns.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::accrual::{AccrualService, RateLimitGate};
use crate::order::OrderStore;

use super::collector::ResultCollector;
use super::config::ReconcilerConfig;
use super::poller::DiscoveryPoller;
use super::types::{JobResult, LifecyclePhase, ReconcilerError, ReconcilerStats, ReconcilerStatus};
use super::worker::{AccrualWorker, SharedJobs};

/// Worker tasks report their id and whether they panicked.
type WorkerSet = JoinSet<(usize, bool)>;

/// Background engine that keeps order statuses in sync with the accrual service.
#[derive(Clone)]
pub struct AccrualReconciler {
    config: ReconcilerConfig,
    store: Arc<dyn OrderStore>,
    accrual: Arc<dyn AccrualService>,
    gate: Arc<RateLimitGate>,
    stats: Arc<ReconcilerStats>,
    phase: Arc<watch::Sender<LifecyclePhase>>,
    running: Arc<AtomicBool>,
}

impl AccrualReconciler {
    pub fn new(
        config: ReconcilerConfig,
        store: Arc<dyn OrderStore>,
        accrual: Arc<dyn AccrualService>,
    ) -> Result<Self, ReconcilerError> {
        config.validate()?;
        let (phase, _) = watch::channel(LifecyclePhase::Idle);

        Ok(Self {
            config,
            store,
            accrual,
            gate: Arc::new(RateLimitGate::new()),
            stats: Arc::new(ReconcilerStats::default()),
            phase: Arc::new(phase),
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> LifecyclePhase {
        *self.phase.borrow()
    }

    /// Subscribe to lifecycle phase changes.
    pub fn subscribe(&self) -> watch::Receiver<LifecyclePhase> {
        self.phase.subscribe()
    }

    /// Rate-limit state shared by the workers.
    pub fn rate_limit_gate(&self) -> Arc<RateLimitGate> {
        Arc::clone(&self.gate)
    }

    pub async fn status(&self) -> ReconcilerStatus {
        let mut status = self.stats.to_status(self.phase(), self.config.worker_count);
        status.rate_limited_for_ms = self
            .gate
            .resume_at()
            .await
            .map(|until| until.saturating_duration_since(Instant::now()).as_millis() as u64);
        status
    }

    /// Spawn [`run`](Self::run) on the runtime.
    pub fn start(&self) -> ReconcilerHandle {
        let shutdown = CancellationToken::new();
        let this = self.clone();
        let token = shutdown.clone();
        let join = tokio::spawn(async move { this.run(token).await });

        ReconcilerHandle { shutdown, join }
    }

    /// Run until `shutdown` is cancelled and every in-flight job has been drained.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), ReconcilerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Reconciler already running");
            return Err(ReconcilerError::AlreadyRunning);
        }

        let started = Instant::now();
        info!(
            workers = self.config.worker_count,
            poll_interval_ms = self.config.poll_interval_ms,
            "Starting accrual reconciler"
        );
        self.phase.send_replace(LifecyclePhase::Running);

        let (job_tx, job_rx) = mpsc::channel(self.config.job_queue_capacity);
        let (result_tx, result_rx) = mpsc::channel(self.config.result_queue_capacity);
        let job_rx = Arc::new(Mutex::new(job_rx));

        let collector = tokio::spawn(
            ResultCollector::new(
                result_rx,
                Arc::clone(&self.store),
                Arc::clone(&self.stats),
                self.config.store_timeout(),
                self.config.guard_capacity,
            )
            .run(),
        );

        let mut workers = WorkerSet::new();
        for id in 1..=self.config.worker_count {
            self.spawn_worker(&mut workers, id, &job_rx, &result_tx, &shutdown);
        }

        let poller = tokio::spawn(
            DiscoveryPoller::new(
                Arc::clone(&self.store),
                job_tx,
                Arc::clone(&self.gate),
                Arc::clone(&self.stats),
                self.config.poll_interval(),
                self.config.store_timeout(),
            )
            .run(shutdown.clone()),
        );

        info!("Accrual reconciler started");

        let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval());
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        heartbeat.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(joined) = workers.join_next(), if !workers.is_empty() => {
                    match joined {
                        Ok((id, true)) => {
                            ReconcilerStats::incr(&self.stats.workers_restarted);
                            error!(worker_id = id, "Accrual worker panicked, restarting it");
                            self.spawn_worker(&mut workers, id, &job_rx, &result_tx, &shutdown);
                        }
                        Ok((id, false)) => {
                            warn!(worker_id = id, "Accrual worker exited before shutdown");
                        }
                        Err(e) => error!(error = %e, "Accrual worker task failed"),
                    }
                }
                _ = heartbeat.tick() => {
                    let status = self.status().await;
                    debug!(
                        enqueued = status.jobs_enqueued,
                        in_flight = status.queries_in_flight,
                        written = status.results_written,
                        rate_limited_for_ms = status.rate_limited_for_ms,
                        "Accrual reconciler working"
                    );
                }
            }
        }

        info!("Stopping accrual reconciler, draining in-flight jobs");
        self.phase.send_replace(LifecyclePhase::Draining);

        // Workers own the remaining queue ends; the queues close once they are gone.
        drop(job_rx);
        drop(result_tx);

        if let Err(e) = poller.await {
            error!(error = %e, "Discovery poller task failed");
        }
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((id, true)) => error!(worker_id = id, "Accrual worker panicked while draining"),
                Ok(_) => {}
                Err(e) => error!(error = %e, "Accrual worker task failed"),
            }
        }
        if let Err(e) = collector.await {
            error!(error = %e, "Result collector task failed");
        }

        self.phase.send_replace(LifecyclePhase::Stopped);
        self.running.store(false, Ordering::SeqCst);

        let status = self.status().await;
        info!(
            duration_ms = started.elapsed().as_millis() as u64,
            jobs = status.jobs_enqueued,
            written = status.results_written,
            "Accrual reconciler stopped"
        );
        Ok(())
    }

    fn spawn_worker(
        &self,
        workers: &mut WorkerSet,
        id: usize,
        jobs: &SharedJobs,
        results: &mpsc::Sender<JobResult>,
        shutdown: &CancellationToken,
    ) {
        let worker = AccrualWorker {
            id,
            jobs: Arc::clone(jobs),
            results: results.clone(),
            accrual: Arc::clone(&self.accrual),
            gate: Arc::clone(&self.gate),
            stats: Arc::clone(&self.stats),
            request_timeout: self.config.request_timeout(),
            shutdown: shutdown.clone(),
        };
        workers.spawn(async move {
            let panicked = AssertUnwindSafe(worker.run()).catch_unwind().await.is_err();
            (id, panicked)
        });
    }
}

/// Handle to a reconciler spawned with [`AccrualReconciler::start`].
pub struct ReconcilerHandle {
    shutdown: CancellationToken,
    join: JoinHandle<Result<(), ReconcilerError>>,
}

impl ReconcilerHandle {
    /// Token that stops the reconciler when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Request shutdown and wait for the drain to complete.
    pub async fn stop(self) -> Result<(), ReconcilerError> {
        self.shutdown.cancel();
        self.join
            .await
            .map_err(|e| ReconcilerError::TaskFailed(e.to_string()))?
    }
}
