//! Testing utilities and mock implementations.
//!
//! Mocks for the accrual service and the order store, so the reconciler can be driven
//! end to end without a database or network. Both record what was asked of them and
//! read the tokio clock, which makes them usable under paused time.
//!
//! # Example
//!
//! ```rust,ignore
//! use gophermart_core::testing::{MockAccrualService, MockOrderStore, MockResponse};
//!
//! let store = MockOrderStore::new();
//! store.insert("9278923470", OrderStatus::New).await;
//!
//! let accrual = MockAccrualService::new();
//! accrual.set_response("9278923470", MockResponse::processed(dec!(500))).await;
//! ```

mod mock_accrual;
mod mock_order_store;

pub use mock_accrual::{MockAccrualService, MockResponse, RecordedQuery};
pub use mock_order_store::{MockOrderStore, RecordedUpdate};

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::order::luhn_sum;
    use crate::reconciler::ReconcilerConfig;

    /// Build a Luhn-valid order number from `seed`.
    pub fn order_number(seed: u64) -> String {
        let body = format!("{:09}", seed);
        // A trailing zero puts the body digits at the positions they take with the check digit.
        let sum = luhn_sum(&format!("{}0", body));
        let check = (10 - sum % 10) % 10;
        format!("{}{}", body, check)
    }

    /// Reconciler settings with short intervals for fast tests.
    pub fn reconciler_config() -> ReconcilerConfig {
        ReconcilerConfig {
            poll_interval_ms: 100,
            heartbeat_interval_ms: 1000,
            ..Default::default()
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::order::is_valid_order_number;

        #[test]
        fn test_generated_numbers_are_valid() {
            for seed in [0, 1, 42, 927892347, 999_999_999] {
                let number = order_number(seed);
                assert!(is_valid_order_number(&number), "{} should be valid", number);
            }
            assert_eq!(order_number(927892347), "9278923470");
        }
    }
}
