//! Wire types for backend sync.

use serde::{Deserialize, Serialize};

use crate::commands::BackendCommand;
use crate::severity::TamperSeverity;
use crate::snapshot::DeviceSnapshot;

/// Alert severity on the removal-alert wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertSeverity {
    /// Worth a look.
    Warning,
    /// Security posture compromised.
    High,
    /// Device identity changed or removal in progress.
    Critical,
}

impl From<TamperSeverity> for AlertSeverity {
    fn from(severity: TamperSeverity) -> Self {
        match severity {
            TamperSeverity::Critical => Self::Critical,
            TamperSeverity::High => Self::High,
            _ => Self::Warning,
        }
    }
}

/// Engine-side view of how in-sync the device is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    /// Everything delivered.
    Current,
    /// Alerts are queued awaiting connectivity.
    PendingAlerts,
    /// The last cycle ran degraded (partial snapshot or store trouble).
    Degraded,
}

/// Outbound heartbeat payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatPayload {
    /// Device identifier.
    pub device_id: String,
    /// Send timestamp (Unix seconds).
    pub timestamp: i64,
    /// The snapshot captured this cycle.
    pub snapshot: DeviceSnapshot,
    /// Classified severity for the cycle.
    pub tamper_severity: TamperSeverity,
    /// Field slugs that deviated.
    pub tamper_flags: Vec<String>,
    /// Whether a lock is currently enforced.
    pub is_locked: bool,
    /// Sync state.
    pub sync_status: SyncStatus,
}

/// Lock state as the backend reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendLockStatus {
    /// Backend believes the device is locked.
    pub is_locked: bool,
    /// Backend-side reason, if any.
    #[serde(default)]
    pub reason: Option<String>,
}

/// Next-payment details delivered with a heartbeat response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextPayment {
    /// Due timestamp (Unix seconds).
    pub due_at: i64,
    /// One-time unlock password for the payment lock.
    pub unlock_password: String,
}

/// Backend response to a heartbeat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSyncResponse {
    /// Whether the backend accepted the heartbeat.
    pub success: bool,
    /// Snapshot the backend verified; committing it replaces the baseline.
    #[serde(default)]
    pub verified_snapshot: Option<DeviceSnapshot>,
    /// Backend lock state.
    #[serde(default)]
    pub lock_status: Option<BackendLockStatus>,
    /// A command to execute at most once.
    #[serde(default)]
    pub command: Option<BackendCommand>,
    /// Upcoming payment details.
    #[serde(default)]
    pub next_payment: Option<NextPayment>,
    /// The loan completed; the backend asks for protection wind-down.
    #[serde(default)]
    pub deactivate_requested: bool,
    /// The backend confirms the device is clean; escalation may reset.
    #[serde(default)]
    pub clearance_confirmed: bool,
}

/// Outbound removal/tamper alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalAlertPayload {
    /// Device identifier.
    pub device_id: String,
    /// Monotonically increasing attempt number.
    pub attempt_number: u64,
    /// Alert severity.
    pub severity: AlertSeverity,
    /// Escalation level (0-3).
    pub escalation_level: u8,
    /// Whether the device is locked at send time.
    pub device_locked: bool,
    /// Event timestamp (Unix seconds).
    pub timestamp: i64,
}
