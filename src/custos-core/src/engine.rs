//! The trust engine.
//!
//! Orchestrates one verification cycle: capture → compare → classify →
//! escalate → enforce → sync, with the payment path feeding lock
//! enforcement in parallel. All collaborators are injected - persistence,
//! platform privilege, device info, loan ledger, transport - so the engine
//! runs unchanged against software doubles.
//!
//! ## Concurrency
//!
//! Escalation state and the active lock are the only exclusive-mutation
//! state. Both the poll cycle and asynchronous platform events acquire the
//! same per-device mutex before transitioning, so state transitions within
//! one device are totally ordered. Network and privilege calls run under
//! short per-call timeouts; a slow collaborator costs one cycle, never the
//! loop.
//!
//! ## Failure posture
//!
//! Every response step is independently fail-soft: a failed feature
//! disable never prevents the lock, a failed lock is persisted un-enforced
//! and retried next cycle, and only a persistence failure aborts a cycle
//! (that cycle only - the next one re-reads durable state).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use custos_platform::{
    DeviceInfoProvider, PlatformError, PrivilegeController, ProtectionProbe,
};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::alerts::OfflineAlertQueue;
use crate::audit::{AuditKind, AuditLog, AuditSeverity};
use crate::baseline::{BaselineOrigin, BaselineStore};
use crate::commands::CommandExecutor;
use crate::comparison::ComparisonEngine;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::escalation::{
    EscalationState, EscalationStateMachine, IncidentLedger, IncidentOrigin, IncidentTicket,
    ResponsePlan,
};
use crate::lock::{LockEnforcementManager, PinUnlockOutcome};
use crate::payment::{LoanLedger, LoanSnapshot, LoanStatus};
use crate::protection::{ProtectionChecker, ProtectionState};
use crate::severity::{SeverityClassifier, TamperSeverity, TamperStatus};
use crate::snapshot::{DeviceSnapshot, SnapshotCollector};
use crate::store::{self, keys, StateStore};
use crate::transport::BackendTransport;
use crate::types::{AlertSeverity, HeartbeatPayload, RemovalAlertPayload, SyncStatus};

/// Injected collaborators for a [`TrustEngine`].
pub struct Collaborators {
    /// Persistent state store.
    pub store: Arc<dyn StateStore>,
    /// Device information provider.
    pub info: Arc<dyn DeviceInfoProvider>,
    /// Privileged action controller.
    pub privileges: Arc<dyn PrivilegeController>,
    /// Protection self-check probe.
    pub probe: Arc<dyn ProtectionProbe>,
    /// Loan/payment ledger.
    pub loans: Arc<dyn LoanLedger>,
    /// Backend transport.
    pub transport: Arc<dyn BackendTransport>,
}

/// Asynchronous platform notification feeding the escalation machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformEvent {
    /// The user or another app attempted to remove the agent package.
    PackageRemovalAttempt,
    /// Device-admin privilege was revoked.
    AdminDisabled,
    /// A protection-relevant setting changed.
    ProtectionSettingChanged,
}

impl PlatformEvent {
    fn slug(&self) -> &'static str {
        match self {
            Self::PackageRemovalAttempt => "package_removal_attempt",
            Self::AdminDisabled => "admin_disabled",
            Self::ProtectionSettingChanged => "protection_setting_changed",
        }
    }

    fn severity(&self) -> TamperSeverity {
        match self {
            Self::AdminDisabled => TamperSeverity::Critical,
            Self::PackageRemovalAttempt => TamperSeverity::High,
            Self::ProtectionSettingChanged => TamperSeverity::Medium,
        }
    }
}

/// Outcome of one verification cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// Classified status for the cycle.
    pub status: TamperStatus,
    /// Comparison was skipped for lack of a baseline.
    pub inconclusive: bool,
    /// Whether a lock is active after the cycle.
    pub locked: bool,
    /// Protection self-check outcome.
    pub protection: ProtectionState,
    /// Whether the heartbeat reached the backend.
    pub synced: bool,
    /// Queued alerts delivered this cycle.
    pub alerts_delivered: usize,
}

/// Persisted escalation domain: machine state plus incident ledger.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct PersistedDomain {
    escalation: EscalationState,
    ledger: IncidentLedger,
}

/// The per-device mutual-exclusion domain.
struct DeviceDomain {
    machine: EscalationStateMachine,
    ledger: IncidentLedger,
}

/// Device trust verification and lock enforcement engine for one device.
pub struct TrustEngine {
    config: EngineConfig,
    device_id: String,
    collector: SnapshotCollector,
    baselines: BaselineStore,
    lock_manager: LockEnforcementManager,
    queue: OfflineAlertQueue,
    audit: Arc<AuditLog>,
    commands: CommandExecutor,
    protection: ProtectionChecker,
    loans: Arc<dyn LoanLedger>,
    transport: Arc<dyn BackendTransport>,
    privileges: Arc<dyn PrivilegeController>,
    store: Arc<dyn StateStore>,
    domain: Mutex<DeviceDomain>,
    cadence_raised: AtomicBool,
}

impl TrustEngine {
    /// Create an engine for one device, loading persisted state.
    pub fn new(
        device_id: &str,
        config: EngineConfig,
        collaborators: Collaborators,
    ) -> Result<Self, EngineError> {
        let Collaborators {
            store,
            info,
            privileges,
            probe,
            loans,
            transport,
        } = collaborators;

        let audit = Arc::new(AuditLog::new(Arc::clone(&store), device_id, config.audit_cap)?);
        let baselines = BaselineStore::new(Arc::clone(&store), device_id)?;
        let lock_manager = LockEnforcementManager::new(
            Arc::clone(&store),
            Arc::clone(&privileges),
            Arc::clone(&audit),
            config.clone(),
        );
        let queue = OfflineAlertQueue::new(
            Arc::clone(&store),
            Arc::clone(&audit),
            device_id,
            config.alert_queue_cap,
        );
        let commands = CommandExecutor::new(
            Arc::clone(&store),
            Arc::clone(&privileges),
            Arc::clone(&audit),
            device_id,
        );
        let collector = SnapshotCollector::new(info, config.snapshot_budget);
        let protection = ProtectionChecker::new(probe);

        let persisted: PersistedDomain =
            store::load_json(store.as_ref(), &keys::incidents(device_id))?.unwrap_or_default();

        info!(
            device_id = %device_id,
            incidents = persisted.escalation.consecutive_incidents,
            attempts = persisted.ledger.attempt_counter,
            "TrustEngine: initialized"
        );

        Ok(Self {
            config,
            device_id: device_id.to_string(),
            collector,
            baselines,
            lock_manager,
            queue,
            audit,
            commands,
            protection,
            loans,
            transport,
            privileges,
            store,
            domain: Mutex::new(DeviceDomain {
                machine: EscalationStateMachine::from_state(persisted.escalation),
                ledger: persisted.ledger,
            }),
            cadence_raised: AtomicBool::new(false),
        })
    }

    /// The poll interval to use for the next cycle.
    #[must_use]
    pub fn current_poll_interval(&self) -> std::time::Duration {
        if self.cadence_raised.load(Ordering::Relaxed) {
            self.config.raised_poll_interval
        } else {
            self.config.poll_interval
        }
    }

    /// The audit log, for inspection.
    #[must_use]
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// The lock manager, for the unlock surfaces.
    #[must_use]
    pub fn lock_manager(&self) -> &LockEnforcementManager {
        &self.lock_manager
    }

    /// Capture a snapshot and establish the enrollment baseline.
    ///
    /// Enrollment refuses a snapshot whose identity read degraded: a
    /// baseline without identifiers would blind every later comparison.
    pub async fn enroll(&self) -> Result<DeviceSnapshot, EngineError> {
        let snapshot = self.collector.capture().await;
        if snapshot.device_id.is_empty() {
            return Err(EngineError::Collection {
                source_name: "identity".to_string(),
            });
        }
        self.baselines.establish_enrollment(snapshot.clone())?;
        self.audit.append_soft(
            AuditKind::BaselineCommitted,
            AuditSeverity::Info,
            "enrollment baseline established",
        );
        Ok(snapshot)
    }

    /// Run one verification cycle.
    #[instrument(skip(self), fields(device_id = %self.device_id))]
    pub async fn run_cycle(&self) -> Result<CycleReport, EngineError> {
        let snapshot = self.collector.capture().await;
        let now = chrono::Utc::now().timestamp();

        let (status, inconclusive) = match self.baselines.active() {
            Some(baseline) => {
                let report = ComparisonEngine::compare(&snapshot, &baseline.snapshot);
                for warning in &report.warnings {
                    warn!(warning = %warning, "Comparison warning");
                }
                let status = SeverityClassifier::classify(&report.findings, now);
                self.audit.append_soft(
                    AuditKind::VerificationResult,
                    if status.is_tampered {
                        AuditSeverity::High
                    } else {
                        AuditSeverity::Info
                    },
                    format!(
                        "cycle verified: severity={} findings={}",
                        status.severity,
                        report.findings.len()
                    ),
                );
                (status, false)
            },
            None => {
                // Logged distinctly from a true clean result.
                let missing = EngineError::BaselineMissing {
                    device_id: self.device_id.clone(),
                };
                debug!(error = %missing, "Comparison inconclusive");
                self.audit.append_soft(
                    AuditKind::ComparisonInconclusive,
                    AuditSeverity::Low,
                    format!("{missing}, comparison skipped"),
                );
                (TamperStatus::clean(now), true)
            },
        };

        let loan = self.fetch_loan().await;

        // --- exclusive section: escalation + lock ---
        let mut domain = self.domain.lock().await;

        let ticket = if status.is_tampered {
            let fingerprint = status.flags.join("+");
            Some(domain.ledger.register(
                &fingerprint,
                IncidentOrigin::Poll,
                now,
                self.config.dedup_window.as_secs() as i64,
            ))
        } else {
            None
        };

        let duplicate = ticket.as_ref().is_some_and(|t| t.duplicate);
        let plan = domain.machine.transition(&status, duplicate);

        self.execute_plan(&mut domain, &plan, &status, ticket.as_ref(), loan.as_ref(), now)
            .await;

        // Escalation state must land durably; failure here is the one
        // cycle-fatal path.
        self.persist_domain(&domain)?;
        drop(domain);
        // --- end exclusive section ---

        let locked = self
            .lock_manager
            .active_lock(&self.device_id)
            .unwrap_or(None)
            .is_some();

        let protection = self.protection.check().await;
        self.audit.append_soft(
            AuditKind::ProtectionCheck,
            if protection.is_intact() {
                AuditSeverity::Info
            } else {
                AuditSeverity::High
            },
            if protection.is_intact() {
                "protection self-check passed".to_string()
            } else {
                format!("protection degraded: {}", protection.failing().join(", "))
            },
        );

        let (synced, alerts_delivered) = self.sync_with_backend(&snapshot, &status, locked).await;

        Ok(CycleReport {
            status,
            inconclusive,
            locked,
            protection,
            synced,
            alerts_delivered,
        })
    }

    /// Handle an asynchronous platform notification.
    ///
    /// Routes through the same dedup and mutual-exclusion section as the
    /// poll cycle, so an event and the next poll reporting the same
    /// incident count once.
    #[instrument(skip(self), fields(device_id = %self.device_id, event = ?event))]
    pub async fn handle_platform_event(&self, event: PlatformEvent) -> Result<(), EngineError> {
        let now = chrono::Utc::now().timestamp();
        let status = TamperStatus {
            is_tampered: true,
            severity: event.severity(),
            flags: vec![event.slug().to_string()],
            timestamp: now,
        };

        let loan = self.fetch_loan().await;

        let mut domain = self.domain.lock().await;
        let ticket = domain.ledger.register(
            event.slug(),
            IncidentOrigin::Event,
            now,
            self.config.dedup_window.as_secs() as i64,
        );
        let plan = domain.machine.transition(&status, ticket.duplicate);

        self.audit.append_soft(
            AuditKind::StateTransition,
            AuditSeverity::High,
            format!(
                "platform event {} -> severity {} (attempt {})",
                event.slug(),
                status.severity,
                ticket.attempt_number
            ),
        );

        self.execute_plan(&mut domain, &plan, &status, Some(&ticket), loan.as_ref(), now)
            .await;
        self.persist_domain(&domain)?;
        Ok(())
    }

    /// Connectivity-restored notification: drain queued alerts now.
    #[instrument(skip(self), fields(device_id = %self.device_id))]
    pub async fn notify_connectivity_restored(&self) -> Result<usize, EngineError> {
        self.queue.drain(self.transport.as_ref()).await
    }

    /// PIN unlock surface.
    pub async fn unlock_with_pin(&self, pin: &str) -> Result<PinUnlockOutcome, EngineError> {
        self.lock_manager.unlock_with_pin(&self.device_id, pin).await
    }

    /// Backend unlock surface.
    pub async fn unlock_from_backend(&self, reason: &str) -> Result<bool, EngineError> {
        self.lock_manager
            .unlock_from_backend(&self.device_id, reason)
            .await
    }

    // ========================================================================
    // Private helpers
    // ========================================================================

    async fn fetch_loan(&self) -> Option<LoanSnapshot> {
        match self.loans.loan_status(&self.device_id).await {
            Ok(loan) => loan,
            Err(e) => {
                warn!(error = %e, "Loan ledger unavailable, payment path skipped");
                None
            },
        }
    }

    /// Execute a response plan, each step independently fail-soft.
    ///
    /// Ordering: alert durably queued first, then the lock (the stronger
    /// invariant), then feature disables, then the wipe.
    async fn execute_plan(
        &self,
        domain: &mut DeviceDomain,
        plan: &ResponsePlan,
        status: &TamperStatus,
        ticket: Option<&IncidentTicket>,
        loan: Option<&LoanSnapshot>,
        now: i64,
    ) {
        if plan.raise_cadence {
            self.cadence_raised.store(true, Ordering::Relaxed);
        } else if plan.restore_cadence {
            self.cadence_raised.store(false, Ordering::Relaxed);
        }

        if let (Some(alert_severity), Some(ticket)) = (plan.queue_alert, ticket) {
            let locked_now = self
                .lock_manager
                .active_lock(&self.device_id)
                .unwrap_or(None)
                .is_some();
            let payload = RemovalAlertPayload {
                device_id: self.device_id.clone(),
                attempt_number: ticket.attempt_number,
                severity: AlertSeverity::from(alert_severity),
                escalation_level: domain.machine.escalation_level(),
                device_locked: locked_now,
                timestamp: now,
            };
            if let Err(e) = self.queue.enqueue(payload) {
                warn!(error = %e, "Alert enqueue failed");
            }
        }

        // Lock before feature disables: enforcement is the invariant the
        // rest of the plan must not be able to block.
        let decision =
            self.lock_manager
                .evaluate(&self.device_id, domain.machine.state(), loan, now);
        if decision.effective.is_some() {
            let pin = self.stored_unlock_pin();
            if let Err(e) = self.lock_manager.apply(&decision, pin.as_deref()).await {
                warn!(error = %e, "Lock apply failed, retrying next cycle");
            }
        } else if loan.is_some_and(|l| l.status == LoanStatus::Paid) {
            match self.lock_manager.release_payment_lock(&self.device_id).await {
                Ok(true) => info!("Payment lock released, loan paid"),
                Ok(false) => {},
                Err(e) => warn!(error = %e, "Payment lock release failed"),
            }
        }

        if plan.disable_features {
            self.privileged("disable_camera", self.privileges.disable_camera(true))
                .await;
            self.privileged("disable_usb", self.privileges.disable_usb(true))
                .await;
            self.privileged(
                "disable_developer_options",
                self.privileges.disable_developer_options(true),
            )
            .await;
        }

        if plan.wipe_sensitive {
            // Wipe failures are logged but never block lock enforcement.
            self.privileged("wipe_sensitive_data", self.privileges.wipe_sensitive_data())
                .await;
        }

        if status.severity.is_incident() {
            self.audit.append_soft(
                AuditKind::ResponseAction,
                AuditSeverity::Info,
                format!(
                    "severity {} handled: action={:?} incidents={}",
                    status.severity,
                    domain.machine.state().last_action,
                    domain.machine.state().consecutive_incidents
                ),
            );
        }
    }

    /// Run one privileged call under the per-call timeout, fail-soft.
    async fn privileged<F>(&self, action: &str, fut: F)
    where
        F: std::future::Future<Output = Result<(), PlatformError>>,
    {
        let result = tokio::time::timeout(self.config.call_timeout, fut).await;
        let failure = match result {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some("timed out".to_string()),
        };

        if let Some(reason) = failure {
            warn!(action = action, reason = %reason, "Privileged action failed");
            self.audit.append_soft(
                AuditKind::PrivilegeFailure,
                AuditSeverity::High,
                format!("{action} failed: {reason}"),
            );
        }
    }

    fn persist_domain(&self, domain: &DeviceDomain) -> Result<(), EngineError> {
        let persisted = PersistedDomain {
            escalation: domain.machine.state().clone(),
            ledger: domain.ledger.clone(),
        };
        store::save_json(self.store.as_ref(), &keys::incidents(&self.device_id), &persisted)
    }

    fn stored_unlock_pin(&self) -> Option<String> {
        store::load_json(self.store.as_ref(), &keys::unlock_pin(&self.device_id)).ok()?
    }

    /// Post the heartbeat and process the backend's response.
    ///
    /// Returns `(synced, alerts_delivered)`.
    async fn sync_with_backend(
        &self,
        snapshot: &DeviceSnapshot,
        status: &TamperStatus,
        locked: bool,
    ) -> (bool, usize) {
        let pending = self.queue.pending().unwrap_or(0);
        let sync_status = if pending > 0 {
            SyncStatus::PendingAlerts
        } else if !snapshot.is_complete() {
            SyncStatus::Degraded
        } else {
            SyncStatus::Current
        };

        let payload = HeartbeatPayload {
            device_id: self.device_id.clone(),
            timestamp: chrono::Utc::now().timestamp(),
            snapshot: snapshot.clone(),
            tamper_severity: status.severity,
            tamper_flags: status.flags.clone(),
            is_locked: locked,
            sync_status,
        };

        let response = match tokio::time::timeout(
            self.config.call_timeout,
            self.transport.post_heartbeat(&payload),
        )
        .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                debug!(error = %e, "Heartbeat failed, alerts stay queued");
                return (false, 0);
            },
            Err(_) => {
                debug!("Heartbeat timed out, alerts stay queued");
                return (false, 0);
            },
        };

        // Opportunistic drain after every successful heartbeat.
        let delivered = match self.queue.drain(self.transport.as_ref()).await {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "Queue drain failed");
                0
            },
        };

        if let Some(verified) = response.verified_snapshot {
            if let Err(e) = self
                .baselines
                .commit_verified(verified, BaselineOrigin::BackendVerified)
            {
                warn!(error = %e, "Baseline commit failed");
            } else {
                self.audit.append_soft(
                    AuditKind::BaselineCommitted,
                    AuditSeverity::Info,
                    "backend-verified baseline committed",
                );
            }
        }

        if let Some(next_payment) = response.next_payment {
            if let Err(e) = store::save_json(
                self.store.as_ref(),
                &keys::unlock_pin(&self.device_id),
                &next_payment.unlock_password,
            ) {
                warn!(error = %e, "Unlock PIN persistence failed");
            }
        }

        if let Some(command) = response.command {
            if let Err(e) = self.commands.execute(&command).await {
                warn!(error = %e, "Backend command failed");
            }
        }

        if response.clearance_confirmed {
            let mut domain = self.domain.lock().await;
            domain
                .machine
                .clear_confirmed(chrono::Utc::now().timestamp());
            if let Err(e) = self.persist_domain(&domain) {
                warn!(error = %e, "Escalation clearance persistence failed");
            }
            self.audit.append_soft(
                AuditKind::StateTransition,
                AuditSeverity::Info,
                "backend-confirmed clearance applied",
            );
        }

        if response.deactivate_requested {
            info!("Backend requested protection wind-down (loan completed)");
            self.audit.append_soft(
                AuditKind::ResponseAction,
                AuditSeverity::Info,
                "deactivation requested by backend after loan completion",
            );
        }

        (true, delivered)
    }
}
