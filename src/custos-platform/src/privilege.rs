//! Privileged device actions and protection self-probes.

use async_trait::async_trait;

use crate::error::PlatformError;
use crate::types::ProbeReport;

/// Privileged actions available to a device-owner deployment.
///
/// Every method is idempotent at the platform level: locking an
/// already-locked screen or disabling an already-disabled feature succeeds.
/// Callers treat each action as independently fallible — a camera-disable
/// failure must never prevent the lock itself.
#[async_trait]
pub trait PrivilegeController: Send + Sync {
    /// Lock the device screen, showing `message` on the lock surface.
    async fn lock_device(&self, message: &str) -> Result<(), PlatformError>;

    /// Release a previously applied lock.
    async fn release_lock(&self) -> Result<(), PlatformError>;

    /// Enable or disable the camera.
    async fn disable_camera(&self, disabled: bool) -> Result<(), PlatformError>;

    /// Enable or disable USB data transfer.
    async fn disable_usb(&self, disabled: bool) -> Result<(), PlatformError>;

    /// Enable or disable developer options.
    async fn disable_developer_options(&self, disabled: bool) -> Result<(), PlatformError>;

    /// Restrict network access to the agent's backend only.
    async fn restrict_network(&self, restricted: bool) -> Result<(), PlatformError>;

    /// Wipe sensitive data staged for protection (not a factory reset).
    async fn wipe_sensitive_data(&self) -> Result<(), PlatformError>;
}

/// Self-check probe for the agent's own protections.
#[async_trait]
pub trait ProtectionProbe: Send + Sync {
    /// Inspect the agent's protection state.
    async fn probe(&self) -> Result<ProbeReport, PlatformError>;
}
