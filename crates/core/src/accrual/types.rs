//! Accrual service types.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::AccrualError;
use crate::order::OrderStatus;

/// Order status as reported by the accrual service.
///
/// The service never reports `NEW`; that status only exists on our side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccrualStatus {
    Registered,
    Processing,
    Invalid,
    Processed,
}

impl AccrualStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccrualStatus::Registered => "REGISTERED",
            AccrualStatus::Processing => "PROCESSING",
            AccrualStatus::Invalid => "INVALID",
            AccrualStatus::Processed => "PROCESSED",
        }
    }
}

impl fmt::Display for AccrualStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccrualStatus {
    type Err = AccrualError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "REGISTERED" => Ok(AccrualStatus::Registered),
            "PROCESSING" => Ok(AccrualStatus::Processing),
            "INVALID" => Ok(AccrualStatus::Invalid),
            "PROCESSED" => Ok(AccrualStatus::Processed),
            other => Err(AccrualError::UnknownStatus(other.to_string())),
        }
    }
}

impl From<AccrualStatus> for OrderStatus {
    fn from(status: AccrualStatus) -> Self {
        match status {
            AccrualStatus::Registered => OrderStatus::Registered,
            AccrualStatus::Processing => OrderStatus::Processing,
            AccrualStatus::Invalid => OrderStatus::Invalid,
            AccrualStatus::Processed => OrderStatus::Processed,
        }
    }
}

/// A successful accrual lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAccrual {
    pub order: String,
    pub status: AccrualStatus,
    /// Reward amount; zero when the service omits it.
    pub accrual: Decimal,
}

impl OrderAccrual {
    pub fn new(order: impl Into<String>, status: AccrualStatus, accrual: Decimal) -> Self {
        Self {
            order: order.into(),
            status,
            accrual,
        }
    }
}

/// Category of an accrual failure, used to decide how loudly to log and whether to pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// 204, 5xx, transport errors, timeouts. Retried by rediscovery.
    TransientRemote,
    /// 429. Pauses every worker.
    RateLimit,
    /// The service answered with data we cannot interpret.
    Protocol,
}
