//! Periodic store health check.
//!
//! Pings the order store on a fixed interval and logs the outcome. A failing check is only
//! reported; the reconciler keeps retrying its own store calls.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::OrderStore;

/// Background task that pings an [`OrderStore`].
pub struct StoreHealthCheck {
    store: Arc<dyn OrderStore>,
    interval: Duration,
    timeout: Duration,
}

impl StoreHealthCheck {
    pub fn new(store: Arc<dyn OrderStore>, interval: Duration, timeout: Duration) -> Self {
        Self {
            store,
            interval,
            timeout,
        }
    }

    /// Check the store on every tick until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Store health check started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.check().await;
                }
            }
        }

        info!("Store health check stopped");
    }

    /// One check. Returns whether the store answered in time.
    pub async fn check(&self) -> bool {
        match tokio::time::timeout(self.timeout, self.store.health_check()).await {
            Ok(Ok(())) => {
                debug!("Store connection ok");
                true
            }
            Ok(Err(e)) => {
                error!(error = %e, "Store health check failed");
                false
            }
            Err(_) => {
                error!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Store health check timed out"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockOrderStore;

    fn health_check(store: &Arc<MockOrderStore>) -> StoreHealthCheck {
        StoreHealthCheck::new(
            Arc::clone(store) as Arc<dyn OrderStore>,
            Duration::from_secs(10),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn test_check_reports_failure() {
        let store = Arc::new(MockOrderStore::new());
        let check = health_check(&store);
        assert!(check.check().await);

        store.set_healthy(false);
        assert!(!check.check().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_on_interval_until_cancelled() {
        let store = Arc::new(MockOrderStore::new());
        store.set_healthy(false);

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(health_check(&store).run(shutdown.clone()));

        // Ticks at 0s, 10s, 20s and 30s; failures do not stop the loop.
        tokio::time::sleep(Duration::from_secs(35)).await;
        shutdown.cancel();
        task.await.unwrap();
        assert_eq!(store.health_check_count(), 4);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(store.health_check_count(), 4);
    }
}
