//! Discovery poller.
//!
//! On every tick, asks the store for orders that are not final and enqueues one job per
//! order. Owns the only job queue sender, so returning closes the queue and lets the
//! workers drain.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::accrual::RateLimitGate;
use crate::order::OrderStore;

use super::types::{Job, ReconcilerStats};

pub(crate) struct DiscoveryPoller {
    store: Arc<dyn OrderStore>,
    jobs: mpsc::Sender<Job>,
    gate: Arc<RateLimitGate>,
    stats: Arc<ReconcilerStats>,
    poll_interval: Duration,
    store_timeout: Duration,
    next_job_id: u64,
}

impl DiscoveryPoller {
    pub fn new(
        store: Arc<dyn OrderStore>,
        jobs: mpsc::Sender<Job>,
        gate: Arc<RateLimitGate>,
        stats: Arc<ReconcilerStats>,
        poll_interval: Duration,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            jobs,
            gate,
            stats,
            poll_interval,
            store_timeout,
            next_job_id: 1,
        }
    }

    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Discovery poller started"
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Discovery poller received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    if !self.discover(&shutdown).await {
                        break;
                    }
                }
            }
        }

        info!(
            jobs_created = self.next_job_id - 1,
            "Discovery poller stopped"
        );
    }

    /// One discovery pass. Returns `false` when the poller should stop.
    async fn discover(&mut self, shutdown: &CancellationToken) -> bool {
        if let Some(resume_at) = self.gate.resume_at().await {
            ReconcilerStats::incr(&self.stats.polls_skipped);
            debug!(
                resume_in_ms = resume_at.saturating_duration_since(Instant::now()).as_millis() as u64,
                "Rate limit active, skipping discovery"
            );
            return true;
        }

        let fetched = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return false,
            fetched = tokio::time::timeout(self.store_timeout, self.store.get_not_processed_orders()) => fetched,
        };

        let orders = match fetched {
            Ok(Ok(orders)) => orders,
            Ok(Err(e)) => {
                ReconcilerStats::incr(&self.stats.polls_failed);
                error!(error = %e, "Getting not processed orders failed");
                return true;
            }
            Err(_) => {
                ReconcilerStats::incr(&self.stats.polls_failed);
                error!(
                    timeout_ms = self.store_timeout.as_millis() as u64,
                    "Getting not processed orders timed out"
                );
                return true;
            }
        };

        if orders.is_empty() {
            return true;
        }
        debug!(count = orders.len(), "Discovered orders to reconcile");

        for order in orders {
            let job = Job {
                id: self.next_job_id,
                order_number: order.number,
                known_status: order.status,
            };

            // Blocks while the queue is full.
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return false,
                sent = self.jobs.send(job) => {
                    if sent.is_err() {
                        warn!("Job queue closed, stopping discovery");
                        return false;
                    }
                }
            }

            self.next_job_id += 1;
            ReconcilerStats::incr(&self.stats.jobs_enqueued);
        }

        true
    }
}
