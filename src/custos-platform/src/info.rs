//! Device information provider trait.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::PlatformError;
use crate::types::{BuildInfo, DeviceIdentity, LocationFix, SecurityPosture, Telemetry};

/// Read-only access to device state.
///
/// Each method is an independent read: one failing source must not poison
/// the others, so the snapshot collector calls them separately and degrades
/// per field. Implementations should answer quickly; the collector wraps
/// the whole capture in a time budget and will truncate a slow provider.
#[async_trait]
pub trait DeviceInfoProvider: Send + Sync {
    /// Stable device identifiers.
    async fn identity(&self) -> Result<DeviceIdentity, PlatformError>;

    /// OS/build attributes.
    async fn build_info(&self) -> Result<BuildInfo, PlatformError>;

    /// Current security posture flags.
    async fn security_posture(&self) -> Result<SecurityPosture, PlatformError>;

    /// Package names of installed applications, unsorted.
    ///
    /// The caller hashes the inventory; raw package lists never leave the
    /// device.
    async fn app_inventory(&self) -> Result<Vec<String>, PlatformError>;

    /// System properties relevant to integrity (ro.* and friends).
    async fn system_properties(&self) -> Result<BTreeMap<String, String>, PlatformError>;

    /// Battery and uptime telemetry.
    async fn telemetry(&self) -> Result<Telemetry, PlatformError>;

    /// Last known location, if permitted and available.
    async fn location(&self) -> Result<Option<LocationFix>, PlatformError>;
}
