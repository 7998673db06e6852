//! Point-in-time device snapshots.
//!
//! A [`DeviceSnapshot`] is an immutable value captured once per verification
//! cycle. It is superseded by the next capture, never updated. Capture is a
//! pure read of the platform: unavailable sources degrade to sentinel values
//! and are listed in `degraded`, and the whole capture runs under a time
//! budget so a hung source cannot stall the poll loop.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use custos_platform::{DeviceInfoProvider, LocationFix, PlatformError, SecurityPosture};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};

/// An immutable device-state snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    /// Primary device identifier.
    pub device_id: String,
    /// Hardware serial number.
    pub hardware_serial: String,
    /// Install-scoped unique identifier.
    pub install_id: String,
    /// IMEIs, sorted.
    pub imeis: Vec<String>,

    /// Device manufacturer.
    pub manufacturer: String,
    /// Device model.
    pub model: String,
    /// OS version string.
    pub os_version: String,
    /// Build identifier.
    pub build_id: String,
    /// Security patch level, if known.
    pub security_patch_level: Option<String>,
    /// Bootloader version string.
    pub bootloader: String,
    /// Installed RAM in megabytes (0 when unavailable).
    pub installed_ram_mb: u64,
    /// Total storage in megabytes (0 when unavailable).
    pub total_storage_mb: u64,

    /// Security posture flags.
    pub flags: SecurityPosture,

    /// SHA-256 over the sorted installed-application inventory.
    pub app_inventory_hash: String,
    /// SHA-256 over the sorted system property set.
    pub system_properties_hash: String,

    /// Battery charge percentage (0 when unavailable).
    pub battery_percent: u8,
    /// Uptime in seconds (0 when unavailable).
    pub uptime_secs: u64,
    /// Last known location, if permitted.
    pub location: Option<LocationFix>,

    /// Capture timestamp (Unix seconds).
    pub captured_at: i64,

    /// Sources that could not be read during this capture.
    pub degraded: Vec<String>,
}

impl DeviceSnapshot {
    /// Whether every source was read successfully.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.degraded.is_empty()
    }
}

/// Hash an application inventory: sorted, newline-joined, SHA-256, hex.
#[must_use]
pub fn hash_app_inventory(packages: &[String]) -> String {
    let mut sorted: Vec<&str> = packages.iter().map(String::as_str).collect();
    sorted.sort_unstable();

    let mut hasher = Sha256::new();
    for package in sorted {
        hasher.update(package.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// Hash a system property set: `key=value` lines in key order, SHA-256, hex.
#[must_use]
pub fn hash_system_properties(
    properties: &std::collections::BTreeMap<String, String>,
) -> String {
    let mut hasher = Sha256::new();
    for (key, value) in properties {
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// Captures device snapshots through a [`DeviceInfoProvider`].
pub struct SnapshotCollector {
    info: Arc<dyn DeviceInfoProvider>,
    budget: std::time::Duration,
}

impl SnapshotCollector {
    /// Create a collector with the given capture budget.
    pub fn new(info: Arc<dyn DeviceInfoProvider>, budget: std::time::Duration) -> Self {
        Self { info, budget }
    }

    /// Capture a best-effort snapshot.
    ///
    /// Never fails: each source read that errors or exceeds the remaining
    /// budget leaves its fields at sentinel values and adds the source name
    /// to `degraded`.
    #[instrument(skip(self))]
    pub async fn capture(&self) -> DeviceSnapshot {
        let deadline = Instant::now() + self.budget;
        let mut degraded = Vec::new();

        let identity = read_source(deadline, "identity", self.info.identity(), &mut degraded)
            .await
            .unwrap_or_else(|| custos_platform::DeviceIdentity {
                device_id: String::new(),
                hardware_serial: String::new(),
                install_id: String::new(),
                imeis: Vec::new(),
            });

        let build = read_source(deadline, "build_info", self.info.build_info(), &mut degraded)
            .await
            .unwrap_or_else(|| custos_platform::BuildInfo {
                manufacturer: String::new(),
                model: String::new(),
                os_version: String::new(),
                build_id: String::new(),
                security_patch_level: None,
                bootloader: String::new(),
                installed_ram_mb: 0,
                total_storage_mb: 0,
            });

        let flags = read_source(
            deadline,
            "security_posture",
            self.info.security_posture(),
            &mut degraded,
        )
        .await
        .unwrap_or_default();

        let app_inventory_hash = read_source(
            deadline,
            "app_inventory",
            self.info.app_inventory(),
            &mut degraded,
        )
        .await
        .map(|apps| hash_app_inventory(&apps))
        .unwrap_or_default();

        let system_properties_hash = read_source(
            deadline,
            "system_properties",
            self.info.system_properties(),
            &mut degraded,
        )
        .await
        .map(|props| hash_system_properties(&props))
        .unwrap_or_default();

        let telemetry = read_source(deadline, "telemetry", self.info.telemetry(), &mut degraded)
            .await
            .unwrap_or(custos_platform::Telemetry {
                battery_percent: 0,
                uptime_secs: 0,
            });

        let location = read_source(deadline, "location", self.info.location(), &mut degraded)
            .await
            .flatten();

        let mut imeis = identity.imeis;
        imeis.sort_unstable();

        let snapshot = DeviceSnapshot {
            device_id: identity.device_id,
            hardware_serial: identity.hardware_serial,
            install_id: identity.install_id,
            imeis,
            manufacturer: build.manufacturer,
            model: build.model,
            os_version: build.os_version,
            build_id: build.build_id,
            security_patch_level: build.security_patch_level,
            bootloader: build.bootloader,
            installed_ram_mb: build.installed_ram_mb,
            total_storage_mb: build.total_storage_mb,
            flags,
            app_inventory_hash,
            system_properties_hash,
            battery_percent: telemetry.battery_percent,
            uptime_secs: telemetry.uptime_secs,
            location,
            captured_at: chrono::Utc::now().timestamp(),
            degraded,
        };

        debug!(
            device_id = %snapshot.device_id,
            complete = snapshot.is_complete(),
            degraded = snapshot.degraded.len(),
            "Snapshot captured"
        );

        snapshot
    }
}

/// Read one source against the capture deadline.
///
/// Returns `None` (and records the source as degraded) on error, timeout,
/// or an already-exhausted budget.
async fn read_source<T, F>(
    deadline: Instant,
    name: &str,
    fut: F,
    degraded: &mut Vec<String>,
) -> Option<T>
where
    F: Future<Output = Result<T, PlatformError>>,
{
    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
        warn!(source = name, "Snapshot budget exhausted before read");
        degraded.push(name.to_string());
        return None;
    }

    match tokio::time::timeout(remaining, fut).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            warn!(source = name, error = %e, "Snapshot source unavailable");
            degraded.push(name.to_string());
            None
        },
        Err(_) => {
            warn!(source = name, "Snapshot source timed out");
            degraded.push(name.to_string());
            None
        },
    }
}
