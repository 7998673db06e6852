//! Lock enforcement.
//!
//! Owns the authoritative lock state for a device. Tamper-driven and
//! payment-driven demands merge under strictest-wins (PERMANENT > HARD >
//! SOFT); both demands are recorded for audit, only the maximum is
//! enforced. For a given reason category the only automatic direction is
//! escalation - a weaker automatic decision never silently replaces a
//! stronger active lock, and de-escalation happens only through the
//! explicit unlock paths.
//!
//! `apply` is idempotent and restartable: re-applying an identical,
//! already-enforced decision is a success no-op, and a cycle cancelled
//! mid-apply converges on the next attempt.

use std::sync::Arc;

use custos_platform::PrivilegeController;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};

use crate::audit::{AuditKind, AuditLog, AuditSeverity};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::escalation::EscalationState;
use crate::payment::{payment_demand, LoanSnapshot};
use crate::severity::TamperSeverity;
use crate::store::{self, keys, StateStore};

/// Lock strictness, ordered `Soft < Hard < Permanent`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockType {
    /// Dismissible reminder.
    Soft,
    /// PIN-gated block.
    Hard,
    /// Backend-authorization-only block.
    Permanent,
}

/// Why a lock was demanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockReason {
    /// Device integrity deviation.
    Tamper,
    /// Installment past due or due imminently.
    PaymentOverdue,
    /// Loan defaulted or overdue past the default threshold.
    PaymentDefault,
}

impl LockReason {
    /// Whether this reason belongs to the payment category.
    #[must_use]
    pub fn is_payment(&self) -> bool {
        matches!(self, Self::PaymentOverdue | Self::PaymentDefault)
    }
}

/// Lifecycle status of a lock record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockStatus {
    /// Lock is in force.
    Active,
    /// Lock has been released.
    Released,
    /// PIN attempts exhausted; only backend unlock remains.
    PinExhausted,
}

/// The authoritative lock record for a device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRecord {
    /// Unique lock identifier.
    pub lock_id: String,
    /// Device this lock applies to.
    pub device_id: String,
    /// Lock strictness.
    pub lock_type: LockType,
    /// Winning reason.
    pub reason: LockReason,
    /// Message shown on the lock surface.
    pub message: String,
    /// Salted SHA-256 of the unlock PIN, if one is set.
    pub pin_hash: Option<String>,
    /// Salt for the PIN hash.
    pub pin_salt: Option<String>,
    /// PIN attempts allowed before exhaustion.
    pub max_attempts: u32,
    /// PIN attempts consumed so far.
    pub attempts_used: u32,
    /// Expiry for SOFT reminders, if any.
    pub expires_at: Option<i64>,
    /// Lifecycle status.
    pub status: LockStatus,
    /// Whether the platform lock call has succeeded for this record.
    pub enforced: bool,
    /// Creation timestamp.
    pub created_at: i64,
    /// Last update timestamp.
    pub updated_at: i64,
}

/// The effective lock a decision demands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveLock {
    /// Strictness to enforce.
    pub lock_type: LockType,
    /// Winning reason.
    pub reason: LockReason,
    /// Message for the lock surface.
    pub message: String,
    /// Whether a PIN can clear this lock.
    pub pin_required: bool,
}

/// Outcome of `evaluate`: both demands recorded, the maximum enforced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockDecision {
    /// Device the decision is for.
    pub device_id: String,
    /// Tamper-path demand, if any.
    pub tamper_demand: Option<LockType>,
    /// Payment-path demand, if any.
    pub payment_demand: Option<(LockType, LockReason)>,
    /// The lock to enforce, if either path demands one.
    pub effective: Option<EffectiveLock>,
}

/// Outcome of a PIN unlock attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PinUnlockOutcome {
    /// PIN accepted; the lock is released.
    Accepted,
    /// PIN rejected; this many attempts remain.
    Rejected {
        /// Attempts remaining before exhaustion.
        remaining: u32,
    },
    /// Attempts exhausted; only backend unlock remains.
    Exhausted,
    /// The active lock cannot be cleared by PIN (PERMANENT or no PIN set).
    NotPinUnlockable,
}

/// Constant-time byte comparison for PIN hashes.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Salted SHA-256 of a PIN, hex-encoded.
fn hash_pin(salt: &str, pin: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(pin.as_bytes());
    hex::encode(hasher.finalize())
}

fn generate_salt() -> String {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn generate_lock_id() -> String {
    let mut bytes = [0u8; 8];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    format!("lock-{}", hex::encode(bytes))
}

/// Owns lock evaluation and enforcement for managed devices.
pub struct LockEnforcementManager {
    store: Arc<dyn StateStore>,
    privileges: Arc<dyn PrivilegeController>,
    audit: Arc<AuditLog>,
    config: EngineConfig,
}

impl LockEnforcementManager {
    /// Create a manager with injected collaborators.
    pub fn new(
        store: Arc<dyn StateStore>,
        privileges: Arc<dyn PrivilegeController>,
        audit: Arc<AuditLog>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            privileges,
            audit,
            config,
        }
    }

    /// Evaluate the current lock demand.
    ///
    /// Pure over the escalation state and the loan snapshot: no side
    /// effects, no reads of the active record. Tamper severity HIGH or
    /// above demands a HARD lock; the payment policy contributes its own
    /// demand; strictest-wins picks the effective lock.
    #[must_use]
    pub fn evaluate(
        &self,
        device_id: &str,
        escalation: &EscalationState,
        loan: Option<&LoanSnapshot>,
        now: i64,
    ) -> LockDecision {
        let tamper_demand = (escalation.last_severity >= TamperSeverity::High)
            .then_some(LockType::Hard);

        let payment = loan.and_then(|l| payment_demand(l, now, &self.config));

        let effective = match (tamper_demand, payment) {
            (None, None) => None,
            (Some(t), None) => Some(self.effective_for(t, LockReason::Tamper)),
            (None, Some((p, reason))) => Some(self.effective_for(p, reason)),
            (Some(t), Some((p, payment_reason))) => {
                // Strictest wins; on a tie the tamper reason takes the
                // record since its unlock path is narrower.
                if p > t {
                    Some(self.effective_for(p, payment_reason))
                } else {
                    Some(self.effective_for(t, LockReason::Tamper))
                }
            },
        };

        LockDecision {
            device_id: device_id.to_string(),
            tamper_demand,
            payment_demand: payment,
            effective,
        }
    }

    fn effective_for(&self, lock_type: LockType, reason: LockReason) -> EffectiveLock {
        let message = match reason {
            LockReason::Tamper => {
                "Device integrity check failed. Contact your provider.".to_string()
            },
            LockReason::PaymentOverdue => {
                "A payment on this device is due. Unlock with your payment PIN.".to_string()
            },
            LockReason::PaymentDefault => {
                "This device has been locked for non-payment. Contact your provider.".to_string()
            },
        };

        EffectiveLock {
            lock_type,
            reason,
            message,
            pin_required: lock_type != LockType::Permanent,
        }
    }

    /// The active lock record, if any.
    pub fn active_lock(&self, device_id: &str) -> Result<Option<LockRecord>, EngineError> {
        let record: Option<LockRecord> =
            store::load_json(self.store.as_ref(), &keys::lock(device_id))?;
        Ok(record.filter(|r| r.status != LockStatus::Released))
    }

    /// Apply a lock decision.
    ///
    /// Idempotent: an identical, already-enforced active lock returns
    /// success without touching the platform. A weaker demand never
    /// replaces a stricter active lock. A platform failure persists the
    /// record un-enforced so the decision is not masked and the next cycle
    /// retries.
    #[instrument(skip(self, decision, pin), fields(device_id = %decision.device_id))]
    pub async fn apply(
        &self,
        decision: &LockDecision,
        pin: Option<&str>,
    ) -> Result<bool, EngineError> {
        let effective = match &decision.effective {
            Some(e) => e,
            None => return Ok(false),
        };

        if decision.tamper_demand.is_some() && decision.payment_demand.is_some() {
            self.audit.append_soft(
                AuditKind::LockApplied,
                AuditSeverity::Info,
                format!(
                    "concurrent demands: tamper={:?} payment={:?}, enforcing {:?}",
                    decision.tamper_demand, decision.payment_demand, effective.lock_type
                ),
            );
        }

        let now = chrono::Utc::now().timestamp();
        let existing = self.active_lock(&decision.device_id)?;

        let record = match existing {
            Some(current)
                if current.lock_type == effective.lock_type
                    && current.reason == effective.reason
                    && current.enforced =>
            {
                // Identical and already enforced.
                return Ok(true);
            },
            Some(current) if current.lock_type > effective.lock_type => {
                // Never downgrade automatically.
                self.audit.append_soft(
                    AuditKind::LockApplied,
                    AuditSeverity::Info,
                    format!(
                        "demand {:?} below active {:?}, keeping stricter lock",
                        effective.lock_type, current.lock_type
                    ),
                );
                return Ok(true);
            },
            Some(mut current) => {
                // Escalate the existing record in place; PIN state carries
                // over unless exhaustion already fired.
                current.lock_type = effective.lock_type;
                current.reason = effective.reason;
                current.message = effective.message.clone();
                current.updated_at = now;
                current.enforced = false;
                if current.pin_hash.is_none() && effective.pin_required {
                    if let Some(p) = pin {
                        let salt = generate_salt();
                        current.pin_hash = Some(hash_pin(&salt, p));
                        current.pin_salt = Some(salt);
                    }
                }
                current
            },
            None => {
                let (pin_hash, pin_salt) = match pin {
                    Some(p) if effective.pin_required => {
                        let salt = generate_salt();
                        (Some(hash_pin(&salt, p)), Some(salt))
                    },
                    _ => (None, None),
                };

                LockRecord {
                    lock_id: generate_lock_id(),
                    device_id: decision.device_id.clone(),
                    lock_type: effective.lock_type,
                    reason: effective.reason,
                    message: effective.message.clone(),
                    pin_hash,
                    pin_salt,
                    max_attempts: self.config.pin_max_attempts,
                    attempts_used: 0,
                    expires_at: None,
                    status: LockStatus::Active,
                    enforced: false,
                    created_at: now,
                    updated_at: now,
                }
            },
        };

        // Persist the demand before touching the platform so a failed or
        // cancelled call is retried from durable state.
        store::save_json(self.store.as_ref(), &keys::lock(&decision.device_id), &record)?;

        match self.privileges.lock_device(&record.message).await {
            Ok(()) => {
                let mut enforced = record;
                enforced.enforced = true;
                enforced.updated_at = chrono::Utc::now().timestamp();
                store::save_json(
                    self.store.as_ref(),
                    &keys::lock(&decision.device_id),
                    &enforced,
                )?;

                info!(
                    lock_id = %enforced.lock_id,
                    lock_type = ?enforced.lock_type,
                    reason = ?enforced.reason,
                    "Lock enforced"
                );
                self.audit.append_soft(
                    AuditKind::LockApplied,
                    AuditSeverity::High,
                    format!("{:?} lock enforced ({:?})", enforced.lock_type, enforced.reason),
                );
                Ok(true)
            },
            Err(e) => {
                warn!(error = %e, "Platform lock call failed, retrying next cycle");
                self.audit.append_soft(
                    AuditKind::PrivilegeFailure,
                    AuditSeverity::High,
                    format!("lock_device failed: {e}"),
                );
                Err(EngineError::from_privilege("lock_device", e))
            },
        }
    }

    /// Attempt a PIN unlock.
    ///
    /// Valid only for SOFT/HARD locks with a PIN set. Attempts are bounded;
    /// exhaustion is terminal and survives a subsequent correct PIN.
    #[instrument(skip(self, pin))]
    pub async fn unlock_with_pin(
        &self,
        device_id: &str,
        pin: &str,
    ) -> Result<PinUnlockOutcome, EngineError> {
        let mut record = self
            .active_lock(device_id)?
            .ok_or_else(|| EngineError::LockNotFound {
                device_id: device_id.to_string(),
            })?;

        if record.status == LockStatus::PinExhausted {
            self.audit.append_soft(
                AuditKind::PinAttempt,
                AuditSeverity::High,
                "pin attempt on exhausted lock",
            );
            return Ok(PinUnlockOutcome::Exhausted);
        }

        let (pin_hash, pin_salt) = match (&record.pin_hash, &record.pin_salt) {
            (Some(h), Some(s)) if record.lock_type != LockType::Permanent => (h, s),
            _ => return Ok(PinUnlockOutcome::NotPinUnlockable),
        };

        let presented = hash_pin(pin_salt, pin);
        if constant_time_eq(presented.as_bytes(), pin_hash.as_bytes()) {
            self.release(&mut record, "pin accepted").await?;
            return Ok(PinUnlockOutcome::Accepted);
        }

        record.attempts_used += 1;
        record.updated_at = chrono::Utc::now().timestamp();

        let outcome = if record.attempts_used >= record.max_attempts {
            record.status = LockStatus::PinExhausted;
            self.audit.append_soft(
                AuditKind::PinAttempt,
                AuditSeverity::High,
                format!("pin attempts exhausted after {}", record.attempts_used),
            );
            PinUnlockOutcome::Exhausted
        } else {
            let remaining = record.max_attempts - record.attempts_used;
            self.audit.append_soft(
                AuditKind::PinAttempt,
                AuditSeverity::Info,
                format!("pin rejected, {remaining} attempts remain"),
            );
            PinUnlockOutcome::Rejected { remaining }
        };

        store::save_json(self.store.as_ref(), &keys::lock(device_id), &record)?;
        Ok(outcome)
    }

    /// Backend-authorized unlock.
    ///
    /// Valid for any lock type including PERMANENT and PIN-exhausted
    /// records; always succeeds locally once called. A platform release
    /// failure is audited but does not undo the local release.
    #[instrument(skip(self))]
    pub async fn unlock_from_backend(
        &self,
        device_id: &str,
        authorization_reason: &str,
    ) -> Result<bool, EngineError> {
        let mut record = match self.active_lock(device_id)? {
            Some(r) => r,
            None => return Ok(true),
        };

        // PinExhausted records release through here as well.
        self.release(&mut record, authorization_reason).await?;
        Ok(true)
    }

    /// Release a payment-origin lock after the loan is PAID.
    ///
    /// A tamper-origin lock is unaffected.
    pub async fn release_payment_lock(&self, device_id: &str) -> Result<bool, EngineError> {
        let mut record = match self.active_lock(device_id)? {
            Some(r) if r.reason.is_payment() => r,
            _ => return Ok(false),
        };

        self.release(&mut record, "loan paid").await?;
        Ok(true)
    }

    async fn release(&self, record: &mut LockRecord, why: &str) -> Result<(), EngineError> {
        record.status = LockStatus::Released;
        record.updated_at = chrono::Utc::now().timestamp();
        store::save_json(self.store.as_ref(), &keys::lock(&record.device_id), record)?;

        if let Err(e) = self.privileges.release_lock().await {
            warn!(error = %e, "Platform release call failed");
            self.audit.append_soft(
                AuditKind::PrivilegeFailure,
                AuditSeverity::High,
                format!("release_lock failed: {e}"),
            );
        }

        info!(lock_id = %record.lock_id, why = why, "Lock released");
        self.audit.append_soft(
            AuditKind::LockReleased,
            AuditSeverity::Info,
            format!("lock released: {why}"),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use custos_platform::software::SoftwarePrivilegeController;

    use super::*;
    use crate::payment::LoanStatus;
    use crate::store::MemoryStore;

    const NOW: i64 = 1_700_000_000;

    struct Fixture {
        manager: LockEnforcementManager,
        privileges: Arc<SoftwarePrivilegeController>,
    }

    fn make_fixture() -> Fixture {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
        let privileges = Arc::new(SoftwarePrivilegeController::new());
        let audit = Arc::new(AuditLog::new(Arc::clone(&store), "d1", 100).unwrap());
        let manager = LockEnforcementManager::new(
            store,
            Arc::clone(&privileges) as Arc<dyn PrivilegeController>,
            audit,
            EngineConfig::default(),
        );
        Fixture {
            manager,
            privileges,
        }
    }

    fn escalated(severity: TamperSeverity) -> EscalationState {
        EscalationState {
            consecutive_incidents: 1,
            last_severity: severity,
            ..EscalationState::default()
        }
    }

    fn defaulted_loan() -> LoanSnapshot {
        LoanSnapshot {
            loan_number: "LN-1".to_string(),
            status: LoanStatus::Defaulted,
            next_due_at: None,
            overdue_days: 45,
        }
    }

    #[test]
    fn test_evaluate_no_demands() {
        let fixture = make_fixture();
        let decision =
            fixture
                .manager
                .evaluate("d1", &EscalationState::default(), None, NOW);
        assert!(decision.effective.is_none());
    }

    #[test]
    fn test_evaluate_tamper_high_demands_hard() {
        let fixture = make_fixture();
        let decision =
            fixture
                .manager
                .evaluate("d1", &escalated(TamperSeverity::High), None, NOW);

        assert_eq!(decision.tamper_demand, Some(LockType::Hard));
        let effective = decision.effective.unwrap();
        assert_eq!(effective.lock_type, LockType::Hard);
        assert_eq!(effective.reason, LockReason::Tamper);
        assert!(effective.pin_required);
    }

    #[test]
    fn test_evaluate_defaulted_loan_is_permanent_no_pin() {
        let fixture = make_fixture();
        let decision = fixture.manager.evaluate(
            "d1",
            &EscalationState::default(),
            Some(&defaulted_loan()),
            NOW,
        );

        let effective = decision.effective.unwrap();
        assert_eq!(effective.lock_type, LockType::Permanent);
        assert_eq!(effective.reason, LockReason::PaymentDefault);
        assert!(!effective.pin_required);
    }

    #[test]
    fn test_strictest_wins_records_both_demands() {
        let fixture = make_fixture();
        let decision = fixture.manager.evaluate(
            "d1",
            &escalated(TamperSeverity::Critical),
            Some(&defaulted_loan()),
            NOW,
        );

        assert_eq!(decision.tamper_demand, Some(LockType::Hard));
        assert_eq!(
            decision.payment_demand,
            Some((LockType::Permanent, LockReason::PaymentDefault))
        );
        assert_eq!(decision.effective.unwrap().lock_type, LockType::Permanent);
    }

    #[tokio::test]
    async fn test_apply_is_idempotent() {
        let fixture = make_fixture();
        let decision =
            fixture
                .manager
                .evaluate("d1", &escalated(TamperSeverity::High), None, NOW);

        assert!(fixture.manager.apply(&decision, None).await.unwrap());
        let first = fixture.manager.active_lock("d1").unwrap().unwrap();

        assert!(fixture.manager.apply(&decision, None).await.unwrap());
        let second = fixture.manager.active_lock("d1").unwrap().unwrap();

        assert_eq!(first.lock_id, second.lock_id);
        assert_eq!(first.updated_at, second.updated_at);
        // Only one platform lock call for the two applies.
        let locks = fixture
            .privileges
            .recorded()
            .iter()
            .filter(|a| matches!(a, custos_platform::software::RecordedAction::Lock(_)))
            .count();
        assert_eq!(locks, 1);
    }

    #[tokio::test]
    async fn test_apply_never_downgrades() {
        let fixture = make_fixture();

        let permanent = fixture.manager.evaluate(
            "d1",
            &EscalationState::default(),
            Some(&defaulted_loan()),
            NOW,
        );
        fixture.manager.apply(&permanent, None).await.unwrap();

        let weaker =
            fixture
                .manager
                .evaluate("d1", &escalated(TamperSeverity::High), None, NOW);
        assert!(fixture.manager.apply(&weaker, None).await.unwrap());

        let active = fixture.manager.active_lock("d1").unwrap().unwrap();
        assert_eq!(active.lock_type, LockType::Permanent);
    }

    #[tokio::test]
    async fn test_apply_failure_persists_demand_for_retry() {
        let fixture = make_fixture();
        fixture.privileges.fail_action("lock_device");

        let decision =
            fixture
                .manager
                .evaluate("d1", &escalated(TamperSeverity::High), None, NOW);
        let err = fixture.manager.apply(&decision, None).await.unwrap_err();
        assert!(err.is_audit_incident());

        // Demand persisted un-enforced; the retry enforces it.
        let record = fixture.manager.active_lock("d1").unwrap().unwrap();
        assert!(!record.enforced);

        fixture.privileges.clear_failures();
        assert!(fixture.manager.apply(&decision, None).await.unwrap());
        assert!(fixture.manager.active_lock("d1").unwrap().unwrap().enforced);
    }

    #[tokio::test]
    async fn test_pin_unlock_accepts_correct_pin() {
        let fixture = make_fixture();
        let decision =
            fixture
                .manager
                .evaluate("d1", &escalated(TamperSeverity::High), None, NOW);
        fixture.manager.apply(&decision, Some("4821")).await.unwrap();

        let outcome = fixture.manager.unlock_with_pin("d1", "4821").await.unwrap();
        assert_eq!(outcome, PinUnlockOutcome::Accepted);
        assert!(fixture.manager.active_lock("d1").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pin_exhaustion_is_terminal() {
        let fixture = make_fixture();
        let decision =
            fixture
                .manager
                .evaluate("d1", &escalated(TamperSeverity::High), None, NOW);
        fixture.manager.apply(&decision, Some("4821")).await.unwrap();

        // max_attempts defaults to 3; four wrong attempts.
        for attempt in 0..4 {
            let outcome = fixture.manager.unlock_with_pin("d1", "0000").await.unwrap();
            match attempt {
                0 => assert_eq!(outcome, PinUnlockOutcome::Rejected { remaining: 2 }),
                1 => assert_eq!(outcome, PinUnlockOutcome::Rejected { remaining: 1 }),
                _ => assert_eq!(outcome, PinUnlockOutcome::Exhausted),
            }
        }

        // Correct PIN after exhaustion still fails.
        let outcome = fixture.manager.unlock_with_pin("d1", "4821").await.unwrap();
        assert_eq!(outcome, PinUnlockOutcome::Exhausted);

        // Only the backend can clear it now.
        assert!(fixture
            .manager
            .unlock_from_backend("d1", "support ticket 42")
            .await
            .unwrap());
        assert!(fixture.manager.active_lock("d1").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_permanent_lock_rejects_pin() {
        let fixture = make_fixture();
        let decision = fixture.manager.evaluate(
            "d1",
            &EscalationState::default(),
            Some(&defaulted_loan()),
            NOW,
        );
        fixture.manager.apply(&decision, Some("4821")).await.unwrap();

        let outcome = fixture.manager.unlock_with_pin("d1", "4821").await.unwrap();
        assert_eq!(outcome, PinUnlockOutcome::NotPinUnlockable);
    }

    #[tokio::test]
    async fn test_release_payment_lock_leaves_tamper_lock() {
        let fixture = make_fixture();
        let decision =
            fixture
                .manager
                .evaluate("d1", &escalated(TamperSeverity::High), None, NOW);
        fixture.manager.apply(&decision, None).await.unwrap();

        assert!(!fixture.manager.release_payment_lock("d1").await.unwrap());
        assert!(fixture.manager.active_lock("d1").unwrap().is_some());
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }
}
