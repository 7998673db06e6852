//! End-to-end scenarios over the full engine with software doubles.

use custos_core::{
    BackendCommand, CommandKind, LoanSnapshot, LoanStatus, LockReason, LockType,
    PinUnlockOutcome, PlatformEvent, TamperSeverity,
};
use custos_platform::software::RecordedAction;

use crate::common::Harness;

/// Rooted device: one HIGH finding drives hard lock, feature disables, and
/// a queued HIGH alert.
#[tokio::test]
async fn scenario_root_detection_full_response() {
    let harness = Harness::new(true);
    harness.engine.enroll().await.unwrap();

    harness.info.update(|f| f.posture.rooted = true);
    let report = harness.engine.run_cycle().await.unwrap();

    assert_eq!(report.status.severity, TamperSeverity::High);
    assert_eq!(report.status.flags, vec!["rooted".to_string()]);
    assert!(report.locked);

    let lock = harness
        .engine
        .lock_manager()
        .active_lock("dev-0001")
        .unwrap()
        .unwrap();
    assert_eq!(lock.lock_type, LockType::Hard);
    assert_eq!(lock.reason, LockReason::Tamper);

    let recorded = harness.privileges.recorded();
    assert!(recorded.contains(&RecordedAction::Camera(true)));
    assert!(recorded.contains(&RecordedAction::Usb(true)));
    assert!(recorded.contains(&RecordedAction::DeveloperOptions(true)));

    // The HIGH alert reached the backend (online harness drains on
    // heartbeat).
    let alerts = harness.transport.alerts.read().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].attempt_number, 1);
}

/// Clean device: empty findings, NONE severity, no actions, counter
/// resets.
#[tokio::test]
async fn scenario_clean_cycle_resets_counter() {
    let harness = Harness::new(true);
    harness.engine.enroll().await.unwrap();

    // One incident first.
    harness.info.update(|f| f.posture.usb_debugging = true);
    let report = harness.engine.run_cycle().await.unwrap();
    assert_eq!(report.status.severity, TamperSeverity::Medium);

    // Back to clean.
    harness.info.update(|f| f.posture.usb_debugging = false);
    let report = harness.engine.run_cycle().await.unwrap();

    assert_eq!(report.status.severity, TamperSeverity::None);
    assert!(!report.locked);

    // A third clean cycle queues no alert and takes no action.
    let before = harness.privileges.recorded().len();
    harness.engine.run_cycle().await.unwrap();
    assert_eq!(harness.privileges.recorded().len(), before);
}

/// Defaulted loan, no tamper: PERMANENT lock for PAYMENT_DEFAULT, no PIN.
#[tokio::test]
async fn scenario_defaulted_loan_permanent_lock() {
    let harness = Harness::new(true);
    harness.engine.enroll().await.unwrap();

    harness.loans.set(Some(LoanSnapshot {
        loan_number: "LN-77".to_string(),
        status: LoanStatus::Defaulted,
        next_due_at: None,
        overdue_days: 90,
    }));

    let report = harness.engine.run_cycle().await.unwrap();
    assert_eq!(report.status.severity, TamperSeverity::None);
    assert!(report.locked);

    let lock = harness
        .engine
        .lock_manager()
        .active_lock("dev-0001")
        .unwrap()
        .unwrap();
    assert_eq!(lock.lock_type, LockType::Permanent);
    assert_eq!(lock.reason, LockReason::PaymentDefault);
    assert!(lock.pin_hash.is_none());

    // PIN unlock is refused; backend unlock clears it.
    let outcome = harness.engine.unlock_with_pin("123456").await.unwrap();
    assert_eq!(outcome, PinUnlockOutcome::NotPinUnlockable);
    assert!(harness
        .engine
        .unlock_from_backend("payment plan renegotiated")
        .await
        .unwrap());
    assert!(harness
        .engine
        .lock_manager()
        .active_lock("dev-0001")
        .unwrap()
        .is_none());
}

/// Offline alerts keep FIFO order across reconnect, and a stuck head
/// blocks everything behind it.
#[tokio::test]
async fn scenario_offline_queue_fifo_across_reconnect() {
    let harness = Harness::new(false);
    harness.engine.enroll().await.unwrap();

    // Attempt #1: HIGH (removal attempt), attempt #2: CRITICAL (admin
    // disabled). Both queued while offline.
    harness
        .engine
        .handle_platform_event(PlatformEvent::PackageRemovalAttempt)
        .await
        .unwrap();
    harness
        .engine
        .handle_platform_event(PlatformEvent::AdminDisabled)
        .await
        .unwrap();

    assert!(harness.transport.alerts.read().unwrap().is_empty());

    harness.transport.set_online(true);
    let delivered = harness.engine.notify_connectivity_restored().await.unwrap();
    assert_eq!(delivered, 2);

    let alerts = harness.transport.alerts.read().unwrap();
    assert_eq!(alerts.len(), 2);
    assert!(alerts[0].attempt_number < alerts[1].attempt_number);
    assert_eq!(alerts[0].attempt_number, 1);
    assert_eq!(alerts[1].attempt_number, 2);
}

/// PIN exhaustion is terminal: a later correct PIN fails, only the backend
/// clears the lock.
#[tokio::test]
async fn scenario_pin_exhaustion_terminal() {
    let harness = Harness::new(true);
    harness.engine.enroll().await.unwrap();

    // Arm the backend-delivered unlock password, then trip a HARD lock.
    harness.transport.response.write().unwrap().next_payment =
        Some(custos_core::NextPayment {
            due_at: 1_900_000_000,
            unlock_password: "4821".to_string(),
        });
    harness.engine.run_cycle().await.unwrap();

    harness.info.update(|f| f.posture.rooted = true);
    harness.engine.run_cycle().await.unwrap();

    // maxAttempts defaults to 3; four wrong PINs.
    for attempt in 0..4 {
        let outcome = harness.engine.unlock_with_pin("0000").await.unwrap();
        match attempt {
            0 | 1 => assert!(matches!(outcome, PinUnlockOutcome::Rejected { .. })),
            _ => assert_eq!(outcome, PinUnlockOutcome::Exhausted),
        }
    }

    // The correct PIN no longer works.
    let outcome = harness.engine.unlock_with_pin("4821").await.unwrap();
    assert_eq!(outcome, PinUnlockOutcome::Exhausted);

    assert!(harness
        .engine
        .unlock_from_backend("support override")
        .await
        .unwrap());
}

/// Replayed backend commands execute at most once.
#[tokio::test]
async fn scenario_command_replay_is_no_op() {
    let harness = Harness::new(true);
    harness.engine.enroll().await.unwrap();

    harness.transport.response.write().unwrap().command = Some(BackendCommand {
        command_id: "cmd-lock-9".to_string(),
        kind: CommandKind::LockDevice,
        message: Some("Administrative lock".to_string()),
    });

    // The backend replays the same command on both heartbeats.
    harness.engine.run_cycle().await.unwrap();
    harness.engine.run_cycle().await.unwrap();

    let locks = harness
        .privileges
        .recorded()
        .iter()
        .filter(|a| matches!(a, RecordedAction::Lock(_)))
        .count();
    assert_eq!(locks, 1);
}

/// A backend-verified snapshot becomes the new baseline, clearing drift
/// that had been flagged against the old one.
#[tokio::test]
async fn scenario_backend_verified_baseline_commit() {
    let harness = Harness::new(true);
    harness.engine.enroll().await.unwrap();

    // Inventory drift: MEDIUM finding.
    harness.info.update(|f| f.apps.push("com.newapp".to_string()));
    let report = harness.engine.run_cycle().await.unwrap();
    assert_eq!(report.status.severity, TamperSeverity::Medium);

    // The backend verifies the drifted snapshot.
    let verified = harness.transport.heartbeats.read().unwrap().last().unwrap().snapshot.clone();
    harness.transport.response.write().unwrap().verified_snapshot = Some(verified);
    harness.engine.run_cycle().await.unwrap();
    harness.transport.response.write().unwrap().verified_snapshot = None;

    // Next cycle compares against the committed baseline: clean.
    let report = harness.engine.run_cycle().await.unwrap();
    assert_eq!(report.status.severity, TamperSeverity::None);
}

/// Persistence failure aborts the cycle; the next cycle recovers from
/// durable state.
#[tokio::test]
async fn scenario_persistence_failure_is_cycle_scoped() {
    let harness = Harness::new(true);
    harness.engine.enroll().await.unwrap();

    harness.store.set_failing(true);
    assert!(harness.engine.run_cycle().await.is_err());

    harness.store.set_failing(false);
    let report = harness.engine.run_cycle().await.unwrap();
    assert_eq!(report.status.severity, TamperSeverity::None);
}

/// Loan paid: the payment lock releases while a tamper lock would stay.
#[tokio::test]
async fn scenario_paid_loan_releases_payment_lock() {
    let harness = Harness::new(true);
    harness.engine.enroll().await.unwrap();

    harness.loans.set(Some(LoanSnapshot {
        loan_number: "LN-77".to_string(),
        status: LoanStatus::Overdue,
        next_due_at: None,
        overdue_days: 5,
    }));
    let report = harness.engine.run_cycle().await.unwrap();
    assert!(report.locked);

    harness.loans.set(Some(LoanSnapshot {
        loan_number: "LN-77".to_string(),
        status: LoanStatus::Paid,
        next_due_at: None,
        overdue_days: 0,
    }));
    let report = harness.engine.run_cycle().await.unwrap();
    assert!(!report.locked);
}

/// The audit chain stays intact across a realistic sequence of cycles and
/// events.
#[tokio::test]
async fn scenario_audit_chain_intact_after_activity() {
    let harness = Harness::new(true);
    harness.engine.enroll().await.unwrap();

    harness.engine.run_cycle().await.unwrap();
    harness.info.update(|f| f.posture.rooted = true);
    harness.engine.run_cycle().await.unwrap();
    harness
        .engine
        .handle_platform_event(PlatformEvent::ProtectionSettingChanged)
        .await
        .unwrap();

    let verification = harness.engine.audit().verify_chain().unwrap();
    assert!(verification.valid, "chain errors: {:?}", verification.errors);
    assert!(verification.entries_verified > 5);
}
