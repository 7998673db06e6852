//! Escalation state machine.
//!
//! Consumes each cycle's [`TamperStatus`] and decides the protective
//! response. There is no cool-down: every cycle re-evaluates independently,
//! but `consecutive_incidents` increments whenever severity is LOW or above
//! and resets to zero on a NONE result. The counter survives restarts and
//! is otherwise cleared only by a backend-confirmed clearance or a manual
//! reset.
//!
//! The machine itself is pure: `transition` mutates the state object and
//! returns a [`ResponsePlan`] describing what the engine must do. The
//! engine executes each plan step independently fail-soft - a failed
//! feature disable never prevents the lock, and a failed lock is retried
//! next cycle.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::severity::{TamperSeverity, TamperStatus};

/// Summary of the response taken in the last transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseAction {
    /// No action.
    #[default]
    None,
    /// Finding recorded, nothing else.
    RecordOnly,
    /// Backend alert queued and monitoring cadence raised.
    AlertAndMonitor,
    /// Features disabled and a HARD lock requested.
    HardLockdown,
    /// HardLockdown plus sensitive-data wipe.
    CriticalLockdown,
}

/// Per-device escalation state, persisted across restarts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EscalationState {
    /// Incidents observed without an intervening clean cycle.
    pub consecutive_incidents: u32,
    /// Severity of the last evaluation.
    pub last_severity: TamperSeverity,
    /// Response taken on the last transition.
    pub last_action: ResponseAction,
    /// Unix timestamp of the last transition.
    pub last_updated: i64,
}

/// What the engine must execute after a transition.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResponsePlan {
    /// Queue a backend alert at this severity.
    pub queue_alert: Option<TamperSeverity>,
    /// Shorten the poll interval.
    pub raise_cadence: bool,
    /// Restore the normal poll interval.
    pub restore_cadence: bool,
    /// Disable camera, USB, and developer options.
    pub disable_features: bool,
    /// Request a HARD lock from the lock manager.
    pub request_hard_lock: bool,
    /// Trigger the sensitive-data wipe collaborator.
    pub wipe_sensitive: bool,
}

/// Drives escalation decisions for one device.
#[derive(Debug, Clone, Default)]
pub struct EscalationStateMachine {
    state: EscalationState,
}

impl EscalationStateMachine {
    /// Create a machine from persisted state.
    #[must_use]
    pub fn from_state(state: EscalationState) -> Self {
        Self { state }
    }

    /// Current state, for persistence.
    #[must_use]
    pub fn state(&self) -> &EscalationState {
        &self.state
    }

    /// Apply one evaluation result.
    ///
    /// `duplicate` marks a status already counted through the incident
    /// ledger (an async trigger and the following poll reporting the same
    /// incident): the counter does not increment and no new alert is
    /// queued, but lock and feature demands still come back so enforcement
    /// converges.
    pub fn transition(&mut self, status: &TamperStatus, duplicate: bool) -> ResponsePlan {
        let was_raised = self.state.last_severity.raises_cadence();

        if status.severity.is_incident() && !duplicate {
            self.state.consecutive_incidents += 1;
        } else if !status.severity.is_incident() {
            if self.state.consecutive_incidents > 0 {
                info!(
                    previous = self.state.consecutive_incidents,
                    "Clean cycle, incident counter reset"
                );
            }
            self.state.consecutive_incidents = 0;
        }

        let plan = match status.severity {
            TamperSeverity::None => ResponsePlan {
                restore_cadence: was_raised,
                ..ResponsePlan::default()
            },
            TamperSeverity::Low => ResponsePlan::default(),
            TamperSeverity::Medium => ResponsePlan {
                queue_alert: (!duplicate).then_some(TamperSeverity::Medium),
                raise_cadence: true,
                ..ResponsePlan::default()
            },
            TamperSeverity::High => ResponsePlan {
                queue_alert: (!duplicate).then_some(TamperSeverity::High),
                raise_cadence: true,
                disable_features: true,
                request_hard_lock: true,
                ..ResponsePlan::default()
            },
            TamperSeverity::Critical => ResponsePlan {
                queue_alert: (!duplicate).then_some(TamperSeverity::Critical),
                raise_cadence: true,
                disable_features: true,
                request_hard_lock: true,
                wipe_sensitive: true,
                restore_cadence: false,
            },
        };

        self.state.last_severity = status.severity;
        self.state.last_action = match status.severity {
            TamperSeverity::None => ResponseAction::None,
            TamperSeverity::Low => ResponseAction::RecordOnly,
            TamperSeverity::Medium => ResponseAction::AlertAndMonitor,
            TamperSeverity::High => ResponseAction::HardLockdown,
            TamperSeverity::Critical => ResponseAction::CriticalLockdown,
        };
        self.state.last_updated = status.timestamp;

        debug!(
            severity = %status.severity,
            incidents = self.state.consecutive_incidents,
            duplicate = duplicate,
            "Escalation transition"
        );

        plan
    }

    /// Backend-confirmed clearance: the incident history is wiped.
    pub fn clear_confirmed(&mut self, timestamp: i64) {
        info!("Backend-confirmed clearance, escalation state reset");
        self.state = EscalationState {
            last_updated: timestamp,
            ..EscalationState::default()
        };
    }

    /// Manual reset (support/administrative action).
    pub fn manual_reset(&mut self, timestamp: i64) {
        self.clear_confirmed(timestamp);
    }

    /// Escalation level for removal alerts, capped at 3.
    #[must_use]
    pub fn escalation_level(&self) -> u8 {
        self.state.consecutive_incidents.min(3) as u8
    }
}

/// Which trigger path reported an incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncidentOrigin {
    /// The periodic poll cycle.
    Poll,
    /// An asynchronous platform notification.
    Event,
}

/// Persisted dedup state for incident triggers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncidentLedger {
    /// Monotonically increasing attempt counter, never reused.
    pub attempt_counter: u64,
    /// Fingerprint, timestamp, and origin of the last registered incident.
    pub last_incident: Option<(String, i64, IncidentOrigin)>,
}

/// Ticket returned when an incident is registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncidentTicket {
    /// Attempt number assigned to this incident.
    pub attempt_number: u64,
    /// Whether this incident duplicates one already counted in the window.
    pub duplicate: bool,
}

impl IncidentLedger {
    /// Register an incident from either trigger path.
    ///
    /// Each poll cycle re-evaluates independently, so a poll detection
    /// always counts - unless the same fingerprint arrived via an
    /// asynchronous event within `window_secs`, in which case the poll is
    /// the second report of one incident. Events are deduplicated against
    /// any registration of the fingerprint inside the window (notification
    /// storms collapse to one attempt).
    pub fn register(
        &mut self,
        fingerprint: &str,
        origin: IncidentOrigin,
        now: i64,
        window_secs: i64,
    ) -> IncidentTicket {
        let duplicate = match &self.last_incident {
            Some((last_fp, last_at, last_origin)) => {
                let within = last_fp == fingerprint && now - last_at <= window_secs;
                match origin {
                    IncidentOrigin::Event => within,
                    IncidentOrigin::Poll => within && *last_origin == IncidentOrigin::Event,
                }
            },
            None => false,
        };

        if duplicate {
            self.last_incident = Some((fingerprint.to_string(), now, origin));
            return IncidentTicket {
                attempt_number: self.attempt_counter,
                duplicate: true,
            };
        }

        self.attempt_counter += 1;
        self.last_incident = Some((fingerprint.to_string(), now, origin));
        IncidentTicket {
            attempt_number: self.attempt_counter,
            duplicate: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(severity: TamperSeverity) -> TamperStatus {
        TamperStatus {
            is_tampered: severity != TamperSeverity::None,
            severity,
            flags: vec!["rooted".to_string()],
            timestamp: 1_700_000_000,
        }
    }

    #[test]
    fn test_counter_increments_and_resets() {
        let mut machine = EscalationStateMachine::default();

        machine.transition(&status(TamperSeverity::Low), false);
        machine.transition(&status(TamperSeverity::Medium), false);
        assert_eq!(machine.state().consecutive_incidents, 2);

        machine.transition(&status(TamperSeverity::None), false);
        assert_eq!(machine.state().consecutive_incidents, 0);
    }

    #[test]
    fn test_none_plan_is_empty() {
        let mut machine = EscalationStateMachine::default();
        let plan = machine.transition(&status(TamperSeverity::None), false);
        assert_eq!(plan, ResponsePlan::default());
        assert_eq!(machine.state().last_action, ResponseAction::None);
    }

    #[test]
    fn test_medium_queues_alert_and_raises_cadence() {
        let mut machine = EscalationStateMachine::default();
        let plan = machine.transition(&status(TamperSeverity::Medium), false);

        assert_eq!(plan.queue_alert, Some(TamperSeverity::Medium));
        assert!(plan.raise_cadence);
        assert!(!plan.disable_features);
        assert!(!plan.request_hard_lock);
    }

    #[test]
    fn test_high_demands_lock_and_feature_disable() {
        let mut machine = EscalationStateMachine::default();
        let plan = machine.transition(&status(TamperSeverity::High), false);

        assert_eq!(plan.queue_alert, Some(TamperSeverity::High));
        assert!(plan.disable_features);
        assert!(plan.request_hard_lock);
        assert!(!plan.wipe_sensitive);
        assert_eq!(machine.state().last_action, ResponseAction::HardLockdown);
    }

    #[test]
    fn test_critical_adds_wipe() {
        let mut machine = EscalationStateMachine::default();
        let plan = machine.transition(&status(TamperSeverity::Critical), false);

        assert!(plan.request_hard_lock);
        assert!(plan.wipe_sensitive);
        assert_eq!(machine.state().last_action, ResponseAction::CriticalLockdown);
    }

    #[test]
    fn test_duplicate_keeps_counter_but_still_demands_lock() {
        let mut machine = EscalationStateMachine::default();
        machine.transition(&status(TamperSeverity::High), false);
        assert_eq!(machine.state().consecutive_incidents, 1);

        let plan = machine.transition(&status(TamperSeverity::High), true);
        assert_eq!(machine.state().consecutive_incidents, 1);
        assert_eq!(plan.queue_alert, None);
        assert!(plan.request_hard_lock);
    }

    #[test]
    fn test_cadence_restored_after_deescalation() {
        let mut machine = EscalationStateMachine::default();
        machine.transition(&status(TamperSeverity::Medium), false);

        let plan = machine.transition(&status(TamperSeverity::None), false);
        assert!(plan.restore_cadence);
    }

    #[test]
    fn test_clear_confirmed_resets_everything() {
        let mut machine = EscalationStateMachine::default();
        machine.transition(&status(TamperSeverity::Critical), false);
        machine.clear_confirmed(1_700_000_100);

        assert_eq!(machine.state().consecutive_incidents, 0);
        assert_eq!(machine.state().last_severity, TamperSeverity::None);
    }

    #[test]
    fn test_ledger_allocates_monotonic_attempts() {
        let mut ledger = IncidentLedger::default();

        let t1 = ledger.register("rooted", IncidentOrigin::Poll, 1000, 120);
        let t2 = ledger.register("usb_debugging", IncidentOrigin::Poll, 1010, 120);
        assert_eq!(t1.attempt_number, 1);
        assert_eq!(t2.attempt_number, 2);
        assert!(!t1.duplicate);
        assert!(!t2.duplicate);
    }

    #[test]
    fn test_ledger_poll_after_event_dedups() {
        let mut ledger = IncidentLedger::default();

        let event = ledger.register("package_removal_attempt", IncidentOrigin::Event, 1000, 120);
        let poll = ledger.register("package_removal_attempt", IncidentOrigin::Poll, 1060, 120);
        assert!(!event.duplicate);
        assert!(poll.duplicate);
        assert_eq!(poll.attempt_number, event.attempt_number);

        // The poll took over the window; the next poll counts normally.
        let next_poll =
            ledger.register("package_removal_attempt", IncidentOrigin::Poll, 1100, 120);
        assert!(!next_poll.duplicate);
        assert_eq!(next_poll.attempt_number, 2);
    }

    #[test]
    fn test_ledger_event_storm_collapses() {
        let mut ledger = IncidentLedger::default();

        let first = ledger.register("admin_disabled", IncidentOrigin::Event, 1000, 120);
        let second = ledger.register("admin_disabled", IncidentOrigin::Event, 1060, 120);
        let third = ledger.register("admin_disabled", IncidentOrigin::Event, 1150, 120);
        assert!(!first.duplicate);
        assert!(second.duplicate);
        assert!(third.duplicate);
        assert_eq!(ledger.attempt_counter, 1);

        // Outside the window the same fingerprint counts again.
        let later = ledger.register("admin_disabled", IncidentOrigin::Event, 1300, 120);
        assert!(!later.duplicate);
        assert_eq!(later.attempt_number, 2);
    }

    #[test]
    fn test_ledger_poll_reevaluates_independently() {
        let mut ledger = IncidentLedger::default();

        // The same condition across consecutive poll cycles counts every
        // time - there is no cool-down.
        let c1 = ledger.register("rooted", IncidentOrigin::Poll, 1000, 120);
        let c2 = ledger.register("rooted", IncidentOrigin::Poll, 1060, 120);
        assert!(!c1.duplicate);
        assert!(!c2.duplicate);
        assert_eq!(ledger.attempt_counter, 2);
    }

    #[test]
    fn test_escalation_level_caps_at_three() {
        let mut machine = EscalationStateMachine::default();
        for _ in 0..6 {
            machine.transition(&status(TamperSeverity::High), false);
        }
        assert_eq!(machine.escalation_level(), 3);
    }
}
