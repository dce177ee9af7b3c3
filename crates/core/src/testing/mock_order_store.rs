//! Mock order store for testing.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::order::{
    is_valid_order_number, Order, OrderError, OrderStatus, OrderStore, PendingOrder,
};

/// A recorded `update_order` call, including rejected ones.
#[derive(Debug, Clone)]
pub struct RecordedUpdate {
    pub number: String,
    pub status: OrderStatus,
    pub accrual: Decimal,
    pub at: Instant,
    /// Whether the store accepted the write.
    pub applied: bool,
}

/// In-memory implementation of the OrderStore trait.
///
/// Discovery returns every order that is not `PROCESSED`, `INVALID` included, so callers
/// must cope with terminal statuses showing up. Updates are checked for forward transitions
/// like the SQLite store does.
#[derive(Debug, Clone, Default)]
pub struct MockOrderStore {
    orders: Arc<RwLock<Vec<Order>>>,
    updates: Arc<RwLock<Vec<RecordedUpdate>>>,
    update_delay: Arc<RwLock<Duration>>,
    failing_updates: Arc<AtomicUsize>,
    failing_discoveries: Arc<AtomicUsize>,
    discoveries: Arc<AtomicUsize>,
    unhealthy: Arc<AtomicBool>,
    health_checks: Arc<AtomicUsize>,
}

impl MockOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an order directly, bypassing number validation.
    pub async fn insert(&self, number: &str, status: OrderStatus) {
        let now = Utc::now();
        self.orders.write().await.push(Order {
            number: number.to_string(),
            login: "test-user".to_string(),
            status,
            accrual: Decimal::ZERO,
            uploaded_at: now,
            updated_at: now,
        });
    }

    pub async fn order(&self, number: &str) -> Option<Order> {
        self.orders
            .read()
            .await
            .iter()
            .find(|o| o.number == number)
            .cloned()
    }

    pub async fn status_of(&self, number: &str) -> Option<OrderStatus> {
        self.order(number).await.map(|o| o.status)
    }

    pub async fn recorded_updates(&self) -> Vec<RecordedUpdate> {
        self.updates.read().await.clone()
    }

    pub async fn updates_for(&self, number: &str) -> Vec<RecordedUpdate> {
        self.updates
            .read()
            .await
            .iter()
            .filter(|u| u.number == number)
            .cloned()
            .collect()
    }

    /// Number of discovery calls made so far.
    pub fn discovery_count(&self) -> usize {
        self.discoveries.load(Ordering::SeqCst)
    }

    /// Fail the next `count` update calls with a database error.
    pub fn fail_next_updates(&self, count: usize) {
        self.failing_updates.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` discovery calls with a database error.
    pub fn fail_next_discoveries(&self, count: usize) {
        self.failing_discoveries.store(count, Ordering::SeqCst);
    }

    /// Make health checks fail until set back to healthy.
    pub fn set_healthy(&self, healthy: bool) {
        self.unhealthy.store(!healthy, Ordering::SeqCst);
    }

    /// Number of health checks made so far.
    pub fn health_check_count(&self) -> usize {
        self.health_checks.load(Ordering::SeqCst)
    }

    /// Simulated latency for update calls.
    pub async fn set_update_delay(&self, delay: Duration) {
        *self.update_delay.write().await = delay;
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl OrderStore for MockOrderStore {
    async fn add_order(&self, login: &str, number: &str) -> Result<Order, OrderError> {
        if !is_valid_order_number(number) {
            return Err(OrderError::InvalidNumber(number.to_string()));
        }

        let mut orders = self.orders.write().await;
        if let Some(existing) = orders.iter().find(|o| o.number == number) {
            return Err(if existing.login == login {
                OrderError::AlreadyUploaded(number.to_string())
            } else {
                OrderError::UploadedByOtherUser(number.to_string())
            });
        }

        let now = Utc::now();
        let order = Order {
            number: number.to_string(),
            login: login.to_string(),
            status: OrderStatus::New,
            accrual: Decimal::ZERO,
            uploaded_at: now,
            updated_at: now,
        };
        orders.push(order.clone());
        Ok(order)
    }

    async fn get_order(&self, number: &str) -> Result<Option<Order>, OrderError> {
        Ok(self.order(number).await)
    }

    async fn get_orders(&self, login: &str) -> Result<Vec<Order>, OrderError> {
        Ok(self
            .orders
            .read()
            .await
            .iter()
            .filter(|o| o.login == login)
            .cloned()
            .collect())
    }

    async fn get_not_processed_orders(&self) -> Result<Vec<PendingOrder>, OrderError> {
        self.discoveries.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.failing_discoveries) {
            return Err(OrderError::Database("simulated discovery failure".to_string()));
        }

        Ok(self
            .orders
            .read()
            .await
            .iter()
            .filter(|o| o.status != OrderStatus::Processed)
            .map(|o| PendingOrder::new(o.number.clone(), o.status))
            .collect())
    }

    async fn update_order(
        &self,
        number: &str,
        status: OrderStatus,
        accrual: Decimal,
    ) -> Result<(), OrderError> {
        let delay = *self.update_delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let outcome = if Self::take_failure(&self.failing_updates) {
            Err(OrderError::Database("simulated update failure".to_string()))
        } else {
            let mut orders = self.orders.write().await;
            match orders.iter_mut().find(|o| o.number == number) {
                None => Err(OrderError::NotFound(number.to_string())),
                Some(order) if !order.status.can_transition_to(status) => {
                    Err(OrderError::InvalidTransition {
                        number: number.to_string(),
                        from: order.status,
                        to: status,
                    })
                }
                Some(order) => {
                    order.status = status;
                    order.accrual = accrual;
                    order.updated_at = Utc::now();
                    Ok(())
                }
            }
        };

        self.updates.write().await.push(RecordedUpdate {
            number: number.to_string(),
            status,
            accrual,
            at: Instant::now(),
            applied: outcome.is_ok(),
        });
        outcome
    }

    async fn health_check(&self) -> Result<(), OrderError> {
        self.health_checks.fetch_add(1, Ordering::SeqCst);
        if self.unhealthy.load(Ordering::SeqCst) {
            return Err(OrderError::Database("simulated connection failure".to_string()));
        }
        Ok(())
    }
}
