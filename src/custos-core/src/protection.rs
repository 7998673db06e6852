//! Protection self-check.
//!
//! A [`ProtectionState`] is a point-in-time snapshot of the agent's own
//! defenses, recomputed on demand and never persisted as history - only
//! its pass/fail outcome lands in the audit trail. Probe failures degrade
//! to a failed state instead of erroring out of the poll loop.

use std::sync::Arc;

use custos_platform::ProtectionProbe;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

/// Point-in-time self-check result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectionState {
    /// The agent package is still installed.
    pub app_installed: bool,
    /// Device-owner privilege is still held.
    pub device_owner_enabled: bool,
    /// Uninstall of the agent is blocked.
    pub uninstall_blocked: bool,
    /// Force-stop of the agent is blocked.
    pub force_stop_blocked: bool,
    /// Platform status record matches expectations.
    pub status_integrity_valid: bool,
    /// When this state was computed (Unix seconds).
    pub checked_at: i64,
}

impl ProtectionState {
    /// All protections in place.
    #[must_use]
    pub fn is_intact(&self) -> bool {
        self.app_installed
            && self.device_owner_enabled
            && self.uninstall_blocked
            && self.force_stop_blocked
            && self.status_integrity_valid
    }

    /// A fully degraded state, used when the probe itself fails.
    #[must_use]
    pub fn degraded(checked_at: i64) -> Self {
        Self {
            app_installed: false,
            device_owner_enabled: false,
            uninstall_blocked: false,
            force_stop_blocked: false,
            status_integrity_valid: false,
            checked_at,
        }
    }

    /// Names of the protections currently failing.
    #[must_use]
    pub fn failing(&self) -> Vec<&'static str> {
        let mut failing = Vec::new();
        if !self.app_installed {
            failing.push("app_installed");
        }
        if !self.device_owner_enabled {
            failing.push("device_owner_enabled");
        }
        if !self.uninstall_blocked {
            failing.push("uninstall_blocked");
        }
        if !self.force_stop_blocked {
            failing.push("force_stop_blocked");
        }
        if !self.status_integrity_valid {
            failing.push("status_integrity_valid");
        }
        failing
    }
}

/// Runs protection self-checks through the platform probe.
pub struct ProtectionChecker {
    probe: Arc<dyn ProtectionProbe>,
}

impl ProtectionChecker {
    /// Create a checker over the given probe.
    pub fn new(probe: Arc<dyn ProtectionProbe>) -> Self {
        Self { probe }
    }

    /// Compute the current protection state.
    ///
    /// Never errors: an unreachable probe yields a degraded state.
    #[instrument(skip(self))]
    pub async fn check(&self) -> ProtectionState {
        let checked_at = chrono::Utc::now().timestamp();
        match self.probe.probe().await {
            Ok(report) => ProtectionState {
                app_installed: report.app_installed,
                device_owner_enabled: report.device_owner_enabled,
                uninstall_blocked: report.uninstall_blocked,
                force_stop_blocked: report.force_stop_blocked,
                status_integrity_valid: report.status_integrity_valid,
                checked_at,
            },
            Err(e) => {
                warn!(error = %e, "Protection probe failed, reporting degraded state");
                ProtectionState::degraded(checked_at)
            },
        }
    }
}
