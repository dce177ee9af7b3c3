//! Accrual reconciliation engine.
//!
//! Periodically finds orders whose status is not final, asks the accrual service about
//! each of them through a bounded worker pool, and writes forward status changes back to
//! the order store.

mod collector;
mod config;
mod guard;
mod poller;
mod runner;
mod types;
mod worker;

pub use config::ReconcilerConfig;
pub use runner::{AccrualReconciler, ReconcilerHandle};
pub use types::{Job, JobResult, LifecyclePhase, ReconcilerError, ReconcilerStatus};
