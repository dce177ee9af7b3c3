//! Orders and their storage.
//!
//! The reconciler reads pending orders and writes status updates through [`OrderStore`];
//! order submission creates orders in `NEW` status.

mod health;
mod sqlite_store;
mod store;
mod types;

pub use health::StoreHealthCheck;
pub use sqlite_store::SqliteOrderStore;
pub use store::{OrderError, OrderStore};
pub use types::{is_valid_order_number, Order, OrderStatus, PendingOrder};
pub(crate) use types::luhn_sum;
