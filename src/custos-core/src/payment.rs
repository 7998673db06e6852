//! Payment-driven lock policy.
//!
//! The loan/payment ledger is an external collaborator behind
//! [`LoanLedger`]; the engine only consumes a point-in-time
//! [`LoanSnapshot`]. The policy mapping loan state to a lock demand is a
//! pure function so it composes with the tamper demand under the
//! strictest-wins rule.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::lock::{LockReason, LockType};

/// Loan lifecycle status as the ledger reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoanStatus {
    /// Loan is active and being repaid.
    Active,
    /// At least one installment is past due.
    Overdue,
    /// The loan has been declared defaulted.
    Defaulted,
    /// The loan is fully repaid.
    Paid,
}

/// Point-in-time loan state for one device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanSnapshot {
    /// Loan identifier.
    pub loan_number: String,
    /// Lifecycle status.
    pub status: LoanStatus,
    /// Next installment due date (Unix seconds), if any remains.
    pub next_due_at: Option<i64>,
    /// Days past due on the oldest unpaid installment.
    pub overdue_days: u32,
}

/// External loan/payment ledger.
#[async_trait]
pub trait LoanLedger: Send + Sync {
    /// Current loan state for a device, `None` when no loan is attached.
    async fn loan_status(&self, device_id: &str) -> Result<Option<LoanSnapshot>, EngineError>;
}

/// A static ledger for tests and bring-up.
pub struct StaticLoanLedger {
    snapshot: std::sync::RwLock<Option<LoanSnapshot>>,
}

impl StaticLoanLedger {
    /// Create a ledger serving the given snapshot.
    #[must_use]
    pub fn new(snapshot: Option<LoanSnapshot>) -> Self {
        Self {
            snapshot: std::sync::RwLock::new(snapshot),
        }
    }

    /// Replace the served snapshot.
    pub fn set(&self, snapshot: Option<LoanSnapshot>) {
        if let Ok(mut current) = self.snapshot.write() {
            *current = snapshot;
        }
    }
}

#[async_trait]
impl LoanLedger for StaticLoanLedger {
    async fn loan_status(&self, _device_id: &str) -> Result<Option<LoanSnapshot>, EngineError> {
        Ok(self.snapshot.read().map(|s| s.clone()).unwrap_or(None))
    }
}

/// Map loan state to a lock demand.
///
/// - ACTIVE, due within `due_soon_days` → SOFT reminder
/// - ACTIVE past due, or OVERDUE below `default_threshold_days` → HARD
/// - OVERDUE at/above the threshold, or DEFAULTED → PERMANENT
/// - PAID → no demand (the engine releases any payment-origin lock)
#[must_use]
pub fn payment_demand(
    loan: &LoanSnapshot,
    now: i64,
    config: &EngineConfig,
) -> Option<(LockType, LockReason)> {
    const DAY_SECS: i64 = 86_400;

    match loan.status {
        LoanStatus::Paid => None,
        LoanStatus::Defaulted => Some((LockType::Permanent, LockReason::PaymentDefault)),
        LoanStatus::Overdue => {
            if loan.overdue_days >= config.default_threshold_days {
                Some((LockType::Permanent, LockReason::PaymentDefault))
            } else {
                Some((LockType::Hard, LockReason::PaymentOverdue))
            }
        },
        LoanStatus::Active => {
            let due_at = loan.next_due_at?;
            if due_at < now {
                Some((LockType::Hard, LockReason::PaymentOverdue))
            } else if due_at - now <= i64::from(config.due_soon_days) * DAY_SECS {
                Some((LockType::Soft, LockReason::PaymentOverdue))
            } else {
                None
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;
    const DAY: i64 = 86_400;

    fn loan(status: LoanStatus, next_due_at: Option<i64>, overdue_days: u32) -> LoanSnapshot {
        LoanSnapshot {
            loan_number: "LN-1".to_string(),
            status,
            next_due_at,
            overdue_days,
        }
    }

    #[test]
    fn test_active_not_due_soon_is_clean() {
        let config = EngineConfig::default();
        let demand = payment_demand(&loan(LoanStatus::Active, Some(NOW + 10 * DAY), 0), NOW, &config);
        assert_eq!(demand, None);
    }

    #[test]
    fn test_due_soon_arms_soft_reminder() {
        let config = EngineConfig::default();
        let demand = payment_demand(&loan(LoanStatus::Active, Some(NOW + 2 * DAY), 0), NOW, &config);
        assert_eq!(demand, Some((LockType::Soft, LockReason::PaymentOverdue)));
    }

    #[test]
    fn test_past_due_arms_hard_lock() {
        let config = EngineConfig::default();
        let demand = payment_demand(&loan(LoanStatus::Active, Some(NOW - DAY), 0), NOW, &config);
        assert_eq!(demand, Some((LockType::Hard, LockReason::PaymentOverdue)));
    }

    #[test]
    fn test_overdue_below_threshold_is_hard() {
        let config = EngineConfig::default();
        let demand = payment_demand(&loan(LoanStatus::Overdue, None, 10), NOW, &config);
        assert_eq!(demand, Some((LockType::Hard, LockReason::PaymentOverdue)));
    }

    #[test]
    fn test_overdue_at_threshold_is_permanent() {
        let config = EngineConfig::default();
        let demand = payment_demand(&loan(LoanStatus::Overdue, None, 30), NOW, &config);
        assert_eq!(demand, Some((LockType::Permanent, LockReason::PaymentDefault)));
    }

    #[test]
    fn test_defaulted_is_permanent() {
        let config = EngineConfig::default();
        let demand = payment_demand(&loan(LoanStatus::Defaulted, None, 0), NOW, &config);
        assert_eq!(demand, Some((LockType::Permanent, LockReason::PaymentDefault)));
    }

    #[test]
    fn test_paid_has_no_demand() {
        let config = EngineConfig::default();
        let demand = payment_demand(&loan(LoanStatus::Paid, None, 0), NOW, &config);
        assert_eq!(demand, None);
    }
}
