//! Mock accrual service for testing.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::accrual::{AccrualError, AccrualService, AccrualStatus, OrderAccrual};

/// What the mock answers for an order.
#[derive(Debug, Clone, PartialEq)]
pub enum MockResponse {
    /// `200` with the given status and accrual.
    Status(AccrualStatus, Decimal),
    /// `204`.
    NotRegistered,
    /// `429` with the given `Retry-After`.
    RateLimited(Duration),
    /// `200` with a status the client does not recognise.
    UnknownStatus(String),
    /// Any other HTTP status.
    ServerError(u16),
    /// The call panics, taking the calling task down with it.
    Panic,
}

impl MockResponse {
    pub fn registered() -> Self {
        Self::Status(AccrualStatus::Registered, Decimal::ZERO)
    }

    pub fn processing() -> Self {
        Self::Status(AccrualStatus::Processing, Decimal::ZERO)
    }

    pub fn invalid() -> Self {
        Self::Status(AccrualStatus::Invalid, Decimal::ZERO)
    }

    pub fn processed(accrual: Decimal) -> Self {
        Self::Status(AccrualStatus::Processed, accrual)
    }

    fn into_result(self, number: &str) -> Result<OrderAccrual, AccrualError> {
        match self {
            MockResponse::Status(status, accrual) => Ok(OrderAccrual::new(number, status, accrual)),
            MockResponse::NotRegistered => Err(AccrualError::NotRegistered(number.to_string())),
            MockResponse::RateLimited(retry_after) => Err(AccrualError::RateLimited { retry_after }),
            MockResponse::UnknownStatus(status) => Err(AccrualError::UnknownStatus(status)),
            MockResponse::ServerError(status) => Err(AccrualError::ApiError {
                status,
                message: "mock server error".to_string(),
            }),
            MockResponse::Panic => panic!("mock accrual service panicked for order {}", number),
        }
    }
}

/// A recorded accrual query for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedQuery {
    pub order: String,
    /// Runtime clock, so paused-time tests can assert on it.
    pub at: Instant,
}

/// Mock implementation of the AccrualService trait.
///
/// Answers are looked up per order: queued one-shot responses first, then the sticky
/// response, then the default (`204`). Tracks how many queries overlap so tests can check
/// the worker pool bound.
///
/// # Example
///
/// ```rust,ignore
/// use gophermart_core::testing::{MockAccrualService, MockResponse};
///
/// let accrual = MockAccrualService::new();
/// accrual.push_response("9278923470", MockResponse::RateLimited(Duration::from_secs(60))).await;
/// accrual.set_response("9278923470", MockResponse::processed(dec!(500))).await;
/// ```
#[derive(Debug, Clone)]
pub struct MockAccrualService {
    sticky: Arc<RwLock<HashMap<String, MockResponse>>>,
    queued: Arc<RwLock<HashMap<String, VecDeque<MockResponse>>>>,
    default_response: Arc<RwLock<MockResponse>>,
    delay: Arc<RwLock<Duration>>,
    order_delays: Arc<RwLock<HashMap<String, Duration>>>,
    queries: Arc<RwLock<Vec<RecordedQuery>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl Default for MockAccrualService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAccrualService {
    pub fn new() -> Self {
        Self {
            sticky: Arc::new(RwLock::new(HashMap::new())),
            queued: Arc::new(RwLock::new(HashMap::new())),
            default_response: Arc::new(RwLock::new(MockResponse::NotRegistered)),
            delay: Arc::new(RwLock::new(Duration::ZERO)),
            order_delays: Arc::new(RwLock::new(HashMap::new())),
            queries: Arc::new(RwLock::new(Vec::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Answer every query for `order` with `response`.
    pub async fn set_response(&self, order: &str, response: MockResponse) {
        self.sticky
            .write()
            .await
            .insert(order.to_string(), response);
    }

    /// Answer the next query for `order` with `response`, ahead of the sticky response.
    pub async fn push_response(&self, order: &str, response: MockResponse) {
        self.queued
            .write()
            .await
            .entry(order.to_string())
            .or_default()
            .push_back(response);
    }

    /// Answer for orders without a configured response.
    pub async fn set_default_response(&self, response: MockResponse) {
        *self.default_response.write().await = response;
    }

    /// Simulated latency for every query.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = delay;
    }

    /// Simulated latency for queries about `order`, overriding the global delay.
    pub async fn set_order_delay(&self, order: &str, delay: Duration) {
        self.order_delays
            .write()
            .await
            .insert(order.to_string(), delay);
    }

    pub async fn recorded_queries(&self) -> Vec<RecordedQuery> {
        self.queries.read().await.clone()
    }

    pub async fn query_count(&self) -> usize {
        self.queries.read().await.len()
    }

    pub async fn queries_for(&self, order: &str) -> usize {
        self.queries
            .read()
            .await
            .iter()
            .filter(|q| q.order == order)
            .count()
    }

    /// Highest number of queries that were in progress at the same time.
    pub fn max_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    async fn next_response(&self, order: &str) -> MockResponse {
        if let Some(response) = self
            .queued
            .write()
            .await
            .get_mut(order)
            .and_then(|queue| queue.pop_front())
        {
            return response;
        }

        if let Some(response) = self.sticky.read().await.get(order) {
            return response.clone();
        }

        self.default_response.read().await.clone()
    }
}

/// Decrements the in-flight counter even when the query future is dropped.
struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AccrualService for MockAccrualService {
    async fn get_order_accrual(&self, number: &str) -> Result<OrderAccrual, AccrualError> {
        self.queries.write().await.push(RecordedQuery {
            order: number.to_string(),
            at: Instant::now(),
        });

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _in_flight = InFlight(Arc::clone(&self.in_flight));
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let delay = match self.order_delays.read().await.get(number) {
            Some(delay) => *delay,
            None => *self.delay.read().await,
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.next_response(number).await.into_result(number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_default_is_not_registered() {
        let accrual = MockAccrualService::new();
        let err = accrual.get_order_accrual("1").await.unwrap_err();
        assert!(matches!(err, AccrualError::NotRegistered(_)));
        assert_eq!(accrual.query_count().await, 1);
    }

    #[tokio::test]
    async fn test_queued_before_sticky() {
        let accrual = MockAccrualService::new();
        accrual
            .set_response("1", MockResponse::processed(dec!(10)))
            .await;
        accrual
            .push_response("1", MockResponse::RateLimited(Duration::from_secs(5)))
            .await;

        let first = accrual.get_order_accrual("1").await.unwrap_err();
        assert!(matches!(first, AccrualError::RateLimited { .. }));

        let second = accrual.get_order_accrual("1").await.unwrap();
        assert_eq!(second.status, AccrualStatus::Processed);
        assert_eq!(second.accrual, dec!(10));
        assert_eq!(accrual.queries_for("1").await, 2);
    }

    #[tokio::test]
    #[should_panic(expected = "mock accrual service panicked")]
    async fn test_panic_response() {
        let accrual = MockAccrualService::new();
        accrual.push_response("1", MockResponse::Panic).await;
        let _ = accrual.get_order_accrual("1").await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracks_concurrency() {
        let accrual = MockAccrualService::new();
        accrual.set_delay(Duration::from_millis(100)).await;

        let calls = (0..4).map(|i| {
            let accrual = accrual.clone();
            async move { accrual.get_order_accrual(&i.to_string()).await }
        });
        futures::future::join_all(calls).await;

        assert_eq!(accrual.max_concurrency(), 4);
        assert_eq!(accrual.in_flight(), 0);
    }
}
