//! Error types for platform operations.

use thiserror::Error;

/// Errors that can occur when talking to the platform layer.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// A device property or sensor could not be read.
    #[error("Source unavailable: {source_name}")]
    SourceUnavailable {
        /// The property or sensor that could not be read.
        source_name: String,
    },

    /// The platform does not support the requested operation.
    #[error("Operation not supported: {operation}")]
    NotSupported {
        /// The unsupported operation.
        operation: String,
    },

    /// A privileged action was attempted and the platform rejected it.
    #[error("Privileged action failed: {action}: {reason}")]
    ActionFailed {
        /// The action that failed (e.g. "lock_device").
        action: String,
        /// Reason reported by the platform.
        reason: String,
    },

    /// The agent lacks the privilege needed for the action.
    #[error("Privilege missing for {action}")]
    PrivilegeMissing {
        /// The action that required the missing privilege.
        action: String,
    },
}

impl PlatformError {
    /// Whether this failure is worth retrying on the next cycle.
    ///
    /// `NotSupported` is permanent; everything else may be transient.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::NotSupported { .. })
    }
}
