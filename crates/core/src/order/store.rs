//! Order storage trait and errors.

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use super::{Order, OrderStatus, PendingOrder};

/// Error type for order storage operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Order not found.
    #[error("order not found: {0}")]
    NotFound(String),

    /// Order number fails validation.
    #[error("invalid order number: {0}")]
    InvalidNumber(String),

    /// The same user already uploaded this order.
    #[error("order {0} already uploaded by this user")]
    AlreadyUploaded(String),

    /// Another user already uploaded this order.
    #[error("order {0} already uploaded by another user")]
    UploadedByOtherUser(String),

    /// The requested status change is not a forward transition.
    #[error("invalid status transition for order {number}: {from} -> {to}")]
    InvalidTransition {
        number: String,
        from: OrderStatus,
        to: OrderStatus,
    },

    /// A stored status string is not recognised.
    #[error("unknown order status: {0}")]
    UnknownStatus(String),

    /// Database error.
    #[error("database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for OrderError {
    fn from(e: rusqlite::Error) -> Self {
        OrderError::Database(e.to_string())
    }
}

/// Trait for order storage backends.
///
/// The reconciler only uses [`get_not_processed_orders`](OrderStore::get_not_processed_orders)
/// and [`update_order`](OrderStore::update_order). Callers bound every call with a timeout and
/// drop the future on cancellation, so implementations must not rely on running to completion.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Register a new order in `NEW` status for `login`.
    async fn add_order(&self, login: &str, number: &str) -> Result<Order, OrderError>;

    /// Get a single order by number.
    async fn get_order(&self, number: &str) -> Result<Option<Order>, OrderError>;

    /// List the orders uploaded by `login`, newest first.
    async fn get_orders(&self, login: &str) -> Result<Vec<Order>, OrderError>;

    /// Orders whose status is not `PROCESSED`.
    ///
    /// Implementations may also leave out `INVALID` orders.
    async fn get_not_processed_orders(&self) -> Result<Vec<PendingOrder>, OrderError>;

    /// Move an order to `status` with the given accrual.
    ///
    /// Fails with [`OrderError::InvalidTransition`] unless the change is a forward transition.
    async fn update_order(
        &self,
        number: &str,
        status: OrderStatus,
        accrual: Decimal,
    ) -> Result<(), OrderError>;

    /// Round trip to the backend confirming it is reachable.
    async fn health_check(&self) -> Result<(), OrderError>;
}
