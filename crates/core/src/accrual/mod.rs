//! Accrual service integration.
//!
//! The accrual service computes reward points for an order number and reports where the
//! order is in its processing lifecycle. It is rate limited: a `429` tells every caller to
//! back off, which [`RateLimitGate`] shares across workers.

mod client;
mod rate_limit;
mod types;

pub use client::{AccrualConfig, HttpAccrualClient};
pub use rate_limit::RateLimitGate;
pub use types::{AccrualStatus, ErrorClass, OrderAccrual};

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur when querying the accrual service.
#[derive(Debug, Error)]
pub enum AccrualError {
    /// The service does not know the order (204).
    #[error("order {0} is not registered in the accrual system")]
    NotRegistered(String),

    /// Request limit exceeded (429).
    #[error("accrual system request limit exceeded, retry after {}s", .retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    /// A 200 response carried a status we do not recognise.
    #[error("unknown accrual status: {0}")]
    UnknownStatus(String),

    /// A 200 response describes a different order than the one requested.
    #[error("accrual response for order {requested} names order {returned}")]
    OrderMismatch { requested: String, returned: String },

    /// Any other HTTP status.
    #[error("accrual system error: {status} - {message}")]
    ApiError { status: u16, message: String },

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Failed to parse response.
    #[error("failed to parse response: {0}")]
    ParseError(String),

    /// Client not configured.
    #[error("client not configured: {0}")]
    NotConfigured(String),
}

impl AccrualError {
    /// Classify the error for logging and pausing decisions.
    pub fn class(&self) -> ErrorClass {
        match self {
            AccrualError::RateLimited { .. } => ErrorClass::RateLimit,
            AccrualError::UnknownStatus(_)
            | AccrualError::OrderMismatch { .. }
            | AccrualError::ParseError(_) => ErrorClass::Protocol,
            AccrualError::NotRegistered(_)
            | AccrualError::ApiError { .. }
            | AccrualError::HttpError(_)
            | AccrualError::NotConfigured(_) => ErrorClass::TransientRemote,
        }
    }
}

/// Looks up the reward status of a single order.
#[async_trait]
pub trait AccrualService: Send + Sync {
    async fn get_order_accrual(&self, number: &str) -> Result<OrderAccrual, AccrualError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert_eq!(
            AccrualError::RateLimited {
                retry_after: Duration::from_secs(60)
            }
            .class(),
            ErrorClass::RateLimit
        );
        assert_eq!(
            AccrualError::UnknownStatus("DONE".to_string()).class(),
            ErrorClass::Protocol
        );
        assert_eq!(
            AccrualError::NotRegistered("9278923470".to_string()).class(),
            ErrorClass::TransientRemote
        );
        assert_eq!(
            AccrualError::ApiError {
                status: 500,
                message: String::new()
            }
            .class(),
            ErrorClass::TransientRemote
        );
    }

    #[test]
    fn test_error_display() {
        let err = AccrualError::RateLimited {
            retry_after: Duration::from_secs(60),
        };
        assert_eq!(
            err.to_string(),
            "accrual system request limit exceeded, retry after 60s"
        );

        let err = AccrualError::NotRegistered("9278923470".to_string());
        assert_eq!(
            err.to_string(),
            "order 9278923470 is not registered in the accrual system"
        );
    }
}
