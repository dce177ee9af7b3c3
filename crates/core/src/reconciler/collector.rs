//! Result collector.
//!
//! The only component that writes to the order store. Consumes results until every worker
//! has dropped its sender, so in-flight results are persisted during shutdown.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::order::{OrderError, OrderStatus, OrderStore};

use super::guard::{TransitionGuard, WriteDecision};
use super::types::{JobResult, ReconcilerStats};

pub(crate) struct ResultCollector {
    results: mpsc::Receiver<JobResult>,
    store: Arc<dyn OrderStore>,
    stats: Arc<ReconcilerStats>,
    store_timeout: Duration,
    guard: TransitionGuard,
}

impl ResultCollector {
    pub fn new(
        results: mpsc::Receiver<JobResult>,
        store: Arc<dyn OrderStore>,
        stats: Arc<ReconcilerStats>,
        store_timeout: Duration,
        guard_capacity: usize,
    ) -> Self {
        Self {
            results,
            store,
            stats,
            store_timeout,
            guard: TransitionGuard::new(guard_capacity),
        }
    }

    pub async fn run(mut self) {
        info!("Result collector started");

        while let Some(result) = self.results.recv().await {
            self.apply(result).await;
        }

        info!("Result collector stopped");
    }

    async fn apply(&mut self, result: JobResult) {
        match self
            .guard
            .decide(&result.order_number, result.known_status, result.status)
        {
            WriteDecision::Write => {}
            WriteDecision::Unchanged => {
                ReconcilerStats::incr(&self.stats.writes_skipped);
                debug!(
                    job_id = result.job_id,
                    order = %result.order_number,
                    status = %result.status,
                    "Order status unchanged"
                );
                return;
            }
            WriteDecision::Regression { current } => {
                ReconcilerStats::incr(&self.stats.writes_skipped);
                warn!(
                    job_id = result.job_id,
                    order = %result.order_number,
                    current = %current,
                    status = %result.status,
                    "Ignoring stale result"
                );
                return;
            }
            WriteDecision::Terminal { current } => {
                ReconcilerStats::incr(&self.stats.writes_skipped);
                debug!(
                    job_id = result.job_id,
                    order = %result.order_number,
                    current = %current,
                    "Order already final, ignoring result"
                );
                return;
            }
        }

        // Only a processed order carries points.
        let accrual = if result.status == OrderStatus::Processed {
            result.accrual
        } else {
            Decimal::ZERO
        };

        let written = tokio::time::timeout(
            self.store_timeout,
            self.store
                .update_order(&result.order_number, result.status, accrual),
        )
        .await;

        match written {
            Ok(Ok(())) => {
                self.guard.record(&result.order_number, result.status);
                ReconcilerStats::incr(&self.stats.results_written);
                info!(
                    job_id = result.job_id,
                    order = %result.order_number,
                    status = %result.status,
                    accrual = %accrual,
                    "Order updated"
                );
            }
            Ok(Err(OrderError::InvalidTransition { from, .. })) => {
                // The store is already ahead of this result.
                self.guard.record(&result.order_number, from);
                ReconcilerStats::incr(&self.stats.writes_skipped);
                warn!(
                    job_id = result.job_id,
                    order = %result.order_number,
                    current = %from,
                    status = %result.status,
                    "Store rejected backwards transition"
                );
            }
            Ok(Err(e)) => {
                ReconcilerStats::incr(&self.stats.writes_failed);
                error!(
                    job_id = result.job_id,
                    order = %result.order_number,
                    error = %e,
                    "Updating order in storage failed"
                );
            }
            Err(_) => {
                ReconcilerStats::incr(&self.stats.writes_failed);
                error!(
                    job_id = result.job_id,
                    order = %result.order_number,
                    timeout_ms = self.store_timeout.as_millis() as u64,
                    "Updating order in storage timed out"
                );
            }
        }
    }
}
