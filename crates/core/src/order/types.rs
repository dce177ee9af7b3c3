//! Order domain types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::OrderError;

/// Reward status of an order.
///
/// Statuses only move forward along
/// `NEW -> REGISTERED -> PROCESSING -> {INVALID | PROCESSED}`.
/// `INVALID` and `PROCESSED` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    Registered,
    Processing,
    Invalid,
    Processed,
}

impl OrderStatus {
    /// Wire/storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::Registered => "REGISTERED",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Invalid => "INVALID",
            OrderStatus::Processed => "PROCESSED",
        }
    }

    /// Whether no further status change is permitted.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Invalid | OrderStatus::Processed)
    }

    /// Position along the lifecycle. Both terminal statuses share the last rank.
    pub fn rank(&self) -> u8 {
        match self {
            OrderStatus::New => 0,
            OrderStatus::Registered => 1,
            OrderStatus::Processing => 2,
            OrderStatus::Invalid | OrderStatus::Processed => 3,
        }
    }

    /// Whether moving from `self` to `next` is a forward state change.
    ///
    /// Staying in the same status is not a change and returns `false`.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        !self.is_terminal() && next != *self && next.rank() > self.rank()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(OrderStatus::New),
            "REGISTERED" => Ok(OrderStatus::Registered),
            "PROCESSING" => Ok(OrderStatus::Processing),
            "INVALID" => Ok(OrderStatus::Invalid),
            "PROCESSED" => Ok(OrderStatus::Processed),
            other => Err(OrderError::UnknownStatus(other.to_string())),
        }
    }
}

/// A purchase tracked until its reward points are final.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Order number (digits, Luhn-valid).
    pub number: String,
    /// Login of the user who uploaded the order.
    pub login: String,
    pub status: OrderStatus,
    /// Reward amount. Zero unless the status is `PROCESSED`.
    pub accrual: Decimal,
    pub uploaded_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An order whose reward status is not final yet, as returned by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOrder {
    pub number: String,
    pub status: OrderStatus,
}

impl PendingOrder {
    pub fn new(number: impl Into<String>, status: OrderStatus) -> Self {
        Self {
            number: number.into(),
            status,
        }
    }
}

/// Checks an order number with the Luhn checksum.
///
/// Only ASCII digits are accepted; an empty string is invalid.
pub fn is_valid_order_number(number: &str) -> bool {
    if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }

    luhn_sum(number) % 10 == 0
}

/// Luhn sum of an ASCII digit string, doubling every second digit from the right.
pub(crate) fn luhn_sum(digits: &str) -> u32 {
    digits
        .bytes()
        .rev()
        .enumerate()
        .map(|(idx, b)| {
            let digit = u32::from(b - b'0');
            if idx % 2 == 1 {
                let doubled = digit * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                digit
            }
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(OrderStatus::Invalid.is_terminal());
        assert!(OrderStatus::Processed.is_terminal());
        assert!(!OrderStatus::New.is_terminal());
        assert!(!OrderStatus::Registered.is_terminal());
        assert!(!OrderStatus::Processing.is_terminal());
    }

    #[test]
    fn test_forward_transitions() {
        assert!(OrderStatus::New.can_transition_to(OrderStatus::Registered));
        assert!(OrderStatus::New.can_transition_to(OrderStatus::Processed));
        assert!(OrderStatus::Registered.can_transition_to(OrderStatus::Processing));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Invalid));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Processed));
    }

    #[test]
    fn test_rejected_transitions() {
        // same status is not a change
        assert!(!OrderStatus::Processing.can_transition_to(OrderStatus::Processing));
        // backwards
        assert!(!OrderStatus::Processing.can_transition_to(OrderStatus::Registered));
        assert!(!OrderStatus::Registered.can_transition_to(OrderStatus::New));
        // out of a terminal status
        assert!(!OrderStatus::Processed.can_transition_to(OrderStatus::Invalid));
        assert!(!OrderStatus::Invalid.can_transition_to(OrderStatus::Processed));
    }

    #[test]
    fn test_status_parse_and_display() {
        for status in [
            OrderStatus::New,
            OrderStatus::Registered,
            OrderStatus::Processing,
            OrderStatus::Invalid,
            OrderStatus::Processed,
        ] {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }

        let err = "DONE".parse::<OrderStatus>().unwrap_err();
        assert!(matches!(err, OrderError::UnknownStatus(ref s) if s == "DONE"));
    }

    #[test]
    fn test_status_serde_uses_upper_case() {
        let json = serde_json::to_string(&OrderStatus::Processed).unwrap();
        assert_eq!(json, "\"PROCESSED\"");
    }

    #[test]
    fn test_luhn() {
        assert!(is_valid_order_number("9278923470"));
        assert!(is_valid_order_number("12345678903"));
        assert!(is_valid_order_number("79927398713"));
        assert!(!is_valid_order_number("79927398710"));
        assert!(!is_valid_order_number("12345678900"));
        assert!(!is_valid_order_number(""));
        assert!(!is_valid_order_number("1234-5678"));
        assert_eq!(luhn_sum("79927398713"), 70);
    }
}
