//! Monotonic write guard used by the result collector.
//!
//! Results can arrive out of order: two jobs for the same order may be in flight across
//! poll cycles, and the older one can finish last. The guard remembers the last status
//! written per order so a late result never moves an order backwards, and nothing is
//! written once an order is final.

use std::collections::{HashMap, VecDeque};

use crate::order::OrderStatus;

/// What the collector should do with a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteDecision {
    Write,
    /// Same status as already stored.
    Unchanged,
    /// The result is older than what is stored.
    Regression { current: OrderStatus },
    /// The order is already final.
    Terminal { current: OrderStatus },
}

/// Bounded map of order number to last written status, evicting the oldest entry first.
#[derive(Debug)]
pub(crate) struct TransitionGuard {
    last_written: HashMap<String, OrderStatus>,
    insertion_order: VecDeque<String>,
    capacity: usize,
}

impl TransitionGuard {
    pub fn new(capacity: usize) -> Self {
        Self {
            last_written: HashMap::new(),
            insertion_order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Decide whether moving `number` to `next` is a forward change.
    ///
    /// The current status is the more advanced of the remembered write and the status the
    /// order had when it was discovered.
    pub fn decide(&self, number: &str, known: OrderStatus, next: OrderStatus) -> WriteDecision {
        let current = match self.last_written.get(number) {
            Some(&written) if written.rank() >= known.rank() => written,
            _ => known,
        };

        if current.is_terminal() {
            WriteDecision::Terminal { current }
        } else if next == current {
            WriteDecision::Unchanged
        } else if next.rank() < current.rank() {
            WriteDecision::Regression { current }
        } else {
            WriteDecision::Write
        }
    }

    /// Remember `status` as the latest stored status of `number`.
    pub fn record(&mut self, number: &str, status: OrderStatus) {
        if let Some(entry) = self.last_written.get_mut(number) {
            *entry = status;
            return;
        }

        self.last_written.insert(number.to_string(), status);
        self.insertion_order.push_back(number.to_string());

        while self.last_written.len() > self.capacity {
            match self.insertion_order.pop_front() {
                Some(oldest) => {
                    self.last_written.remove(&oldest);
                }
                None => break,
            }
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.last_written.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_change_is_written() {
        let guard = TransitionGuard::new(10);
        assert_eq!(
            guard.decide("1", OrderStatus::New, OrderStatus::Processing),
            WriteDecision::Write
        );
        assert_eq!(
            guard.decide("1", OrderStatus::Registered, OrderStatus::Processed),
            WriteDecision::Write
        );
    }

    #[test]
    fn test_same_status_is_unchanged() {
        let guard = TransitionGuard::new(10);
        assert_eq!(
            guard.decide("1", OrderStatus::Processing, OrderStatus::Processing),
            WriteDecision::Unchanged
        );
    }

    #[test]
    fn test_late_result_does_not_regress() {
        let mut guard = TransitionGuard::new(10);
        guard.record("1", OrderStatus::Processing);

        // Discovered as NEW before the PROCESSING write landed.
        assert_eq!(
            guard.decide("1", OrderStatus::New, OrderStatus::Registered),
            WriteDecision::Regression {
                current: OrderStatus::Processing
            }
        );
    }

    #[test]
    fn test_nothing_after_terminal() {
        let mut guard = TransitionGuard::new(10);
        guard.record("1", OrderStatus::Processed);

        assert_eq!(
            guard.decide("1", OrderStatus::Processing, OrderStatus::Processed),
            WriteDecision::Terminal {
                current: OrderStatus::Processed
            }
        );
        assert_eq!(
            guard.decide("1", OrderStatus::New, OrderStatus::Invalid),
            WriteDecision::Terminal {
                current: OrderStatus::Processed
            }
        );
    }

    #[test]
    fn test_terminal_known_status() {
        let guard = TransitionGuard::new(10);
        assert_eq!(
            guard.decide("1", OrderStatus::Invalid, OrderStatus::Processed),
            WriteDecision::Terminal {
                current: OrderStatus::Invalid
            }
        );
    }

    #[test]
    fn test_known_status_ahead_of_record() {
        let mut guard = TransitionGuard::new(10);
        guard.record("1", OrderStatus::Registered);

        assert_eq!(
            guard.decide("1", OrderStatus::Processing, OrderStatus::Registered),
            WriteDecision::Regression {
                current: OrderStatus::Processing
            }
        );
    }

    #[test]
    fn test_evicts_oldest() {
        let mut guard = TransitionGuard::new(2);
        guard.record("1", OrderStatus::Processing);
        guard.record("2", OrderStatus::Processing);
        guard.record("1", OrderStatus::Processed);
        guard.record("3", OrderStatus::Processing);

        assert_eq!(guard.len(), 2);
        // "1" was inserted first, so it is gone even though it was updated later.
        assert_eq!(
            guard.decide("1", OrderStatus::New, OrderStatus::Registered),
            WriteDecision::Write
        );
        assert_eq!(
            guard.decide("3", OrderStatus::New, OrderStatus::Registered),
            WriteDecision::Regression {
                current: OrderStatus::Processing
            }
        );
    }
}
