//! Error types for engine operations.

use thiserror::Error;

/// Errors that can occur while running the trust engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A snapshot source could not be read - degrade to a partial snapshot.
    #[error("Collection failed for {source_name}")]
    Collection {
        /// The snapshot source that could not be read.
        source_name: String,
    },

    /// No baseline exists for this device - comparison is inconclusive.
    #[error("No baseline for device {device_id}")]
    BaselineMissing {
        /// The device without a baseline.
        device_id: String,
    },

    /// A baseline already exists and may not be silently replaced.
    #[error("Baseline already established for device {device_id}")]
    BaselineAlreadyEstablished {
        /// The device with an existing baseline.
        device_id: String,
    },

    /// The backend could not be reached - queue and retry.
    #[error("Network failure: {message}")]
    Network {
        /// Description of the failure.
        message: String,
    },

    /// A platform-privilege call failed - audit and retry next cycle.
    #[error("Privilege action failed: {action}: {reason}")]
    PrivilegeAction {
        /// The action that failed (e.g. "lock_device").
        action: String,
        /// Reason reported by the platform.
        reason: String,
    },

    /// The state store is unavailable - fatal for this cycle only.
    #[error("Persistence failure: {message}")]
    Persistence {
        /// Description of the failure.
        message: String,
    },

    /// No lock record exists for the requested unlock.
    #[error("No active lock for device {device_id}")]
    LockNotFound {
        /// The device without an active lock.
        device_id: String,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the problem.
        message: String,
    },
}

impl EngineError {
    /// Whether this error aborts the current verification cycle.
    ///
    /// Only a persistence failure is fatal for a cycle; everything else is
    /// degraded around and retried on the next tick.
    #[must_use]
    pub fn is_cycle_fatal(&self) -> bool {
        matches!(self, Self::Persistence { .. })
    }

    /// Whether this error must be surfaced as a HIGH-severity audit entry.
    #[must_use]
    pub fn is_audit_incident(&self) -> bool {
        matches!(self, Self::PrivilegeAction { .. })
    }

    /// Wrap a platform error from a privileged action.
    pub fn from_privilege(action: &str, err: custos_platform::PlatformError) -> Self {
        Self::PrivilegeAction {
            action: action.to_string(),
            reason: err.to_string(),
        }
    }

    /// Wrap a serialization failure as a persistence error.
    pub fn from_serde(context: &str, err: serde_json::Error) -> Self {
        Self::Persistence {
            message: format!("{context}: {err}"),
        }
    }
}
