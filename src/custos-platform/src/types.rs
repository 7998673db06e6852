//! Raw device facts reported by the platform layer.
//!
//! These types carry what the OS reports, untouched. Normalization and
//! comparison against the enrollment baseline happen in `custos-core`.

use serde::{Deserialize, Serialize};

/// Stable identifiers for a managed device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Primary device identifier assigned at enrollment.
    pub device_id: String,

    /// Hardware serial number as reported by the platform.
    pub hardware_serial: String,

    /// Install-scoped unique identifier (survives app updates, not reinstalls).
    pub install_id: String,

    /// IMEIs for all cellular modems (empty on Wi-Fi-only hardware).
    pub imeis: Vec<String>,
}

/// OS and build attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
    /// Device manufacturer.
    pub manufacturer: String,

    /// Device model.
    pub model: String,

    /// OS version string.
    pub os_version: String,

    /// Build identifier / fingerprint.
    pub build_id: String,

    /// Security patch level, if the platform exposes one.
    pub security_patch_level: Option<String>,

    /// Bootloader version string.
    pub bootloader: String,

    /// Installed RAM in megabytes.
    pub installed_ram_mb: u64,

    /// Total storage in megabytes.
    pub total_storage_mb: u64,
}

/// Security posture flags.
///
/// Each flag defaults to `false`; a provider that cannot determine a flag
/// should report it via [`crate::DeviceInfoProvider::security_posture`]'s
/// error path rather than guessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SecurityPosture {
    /// Device is rooted.
    pub rooted: bool,

    /// Bootloader is unlocked.
    pub bootloader_unlocked: bool,

    /// A custom ROM is installed.
    pub custom_rom: bool,

    /// USB debugging is enabled.
    pub usb_debugging: bool,

    /// Developer mode is enabled.
    pub developer_mode: bool,
}

/// Battery and uptime telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Telemetry {
    /// Battery charge percentage (0-100).
    pub battery_percent: u8,

    /// Uptime since last boot, in seconds.
    pub uptime_secs: u64,
}

/// A location fix, if location access is granted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    /// Latitude in degrees.
    pub latitude: f64,

    /// Longitude in degrees.
    pub longitude: f64,

    /// Horizontal accuracy in meters, if known.
    pub accuracy_m: Option<f64>,
}

/// Outcome of a protection self-probe.
///
/// Mirrors the checks a device-owner deployment can make about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeReport {
    /// The agent package is still installed.
    pub app_installed: bool,

    /// Device-owner (or equivalent) privilege is still held.
    pub device_owner_enabled: bool,

    /// Uninstall of the agent is blocked.
    pub uninstall_blocked: bool,

    /// Force-stop of the agent is blocked.
    pub force_stop_blocked: bool,

    /// The platform-side status record matches what the agent expects.
    pub status_integrity_valid: bool,
}

impl ProbeReport {
    /// All protections in place.
    #[must_use]
    pub fn is_intact(&self) -> bool {
        self.app_installed
            && self.device_owner_enabled
            && self.uninstall_blocked
            && self.force_stop_blocked
            && self.status_integrity_valid
    }
}
