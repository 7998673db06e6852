//! Snapshot comparison against the trusted baseline.
//!
//! Comparison is pure and deterministic: identical snapshot pairs always
//! yield the identical, order-stable finding list (fields are checked in
//! declaration order). The field-to-severity policy is fixed at compile
//! time, not configurable at runtime:
//!
//! - identifier fields (device id, serial, install id, IMEI set) → CRITICAL
//! - security posture (root, bootloader unlock, custom ROM) → HIGH
//! - debug/developer flags → MEDIUM
//! - inventory/system-property hash drift → MEDIUM
//! - RAM decrease beyond tolerance → HIGH; storage drift → MEDIUM
//!
//! Values are normalized before comparison to avoid false positives
//! (whitespace, case, spaces inside storage-unit strings), IMEI lists are
//! compared as sets with subset tolerance, and RAM is allowed a 1 GB
//! downward variance for reserved memory.

use serde::{Deserialize, Serialize};

use crate::severity::TamperSeverity;
use crate::snapshot::DeviceSnapshot;

/// Downward RAM variance tolerated before a finding is raised.
const RAM_TOLERANCE_MB: u64 = 1024;

/// Snapshot fields tracked for comparison, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotField {
    /// Primary device identifier.
    DeviceId,
    /// Hardware serial number.
    HardwareSerial,
    /// Install-scoped unique identifier.
    InstallId,
    /// IMEI set.
    ImeiSet,
    /// Rooted flag.
    Rooted,
    /// Bootloader-unlocked flag.
    BootloaderUnlocked,
    /// Custom-ROM flag.
    CustomRom,
    /// USB-debugging flag.
    UsbDebugging,
    /// Developer-mode flag.
    DeveloperMode,
    /// Installed-application inventory hash.
    AppInventoryHash,
    /// System property hash.
    SystemPropertiesHash,
    /// Installed RAM.
    InstalledRam,
    /// Total storage.
    TotalStorage,
}

impl SnapshotField {
    /// Stable lowercase slug for flags and audit messages.
    #[must_use]
    pub fn slug(&self) -> &'static str {
        match self {
            Self::DeviceId => "device_id",
            Self::HardwareSerial => "hardware_serial",
            Self::InstallId => "install_id",
            Self::ImeiSet => "imei_set",
            Self::Rooted => "rooted",
            Self::BootloaderUnlocked => "bootloader_unlocked",
            Self::CustomRom => "custom_rom",
            Self::UsbDebugging => "usb_debugging",
            Self::DeveloperMode => "developer_mode",
            Self::AppInventoryHash => "app_inventory_hash",
            Self::SystemPropertiesHash => "system_properties_hash",
            Self::InstalledRam => "installed_ram",
            Self::TotalStorage => "total_storage",
        }
    }

    /// Fixed severity for a deviation in this field.
    #[must_use]
    pub fn severity(&self) -> TamperSeverity {
        match self {
            Self::DeviceId | Self::HardwareSerial | Self::InstallId | Self::ImeiSet => {
                TamperSeverity::Critical
            },
            Self::Rooted | Self::BootloaderUnlocked | Self::CustomRom | Self::InstalledRam => {
                TamperSeverity::High
            },
            Self::UsbDebugging
            | Self::DeveloperMode
            | Self::AppInventoryHash
            | Self::SystemPropertiesHash
            | Self::TotalStorage => TamperSeverity::Medium,
        }
    }

    /// Category of this field.
    #[must_use]
    pub fn category(&self) -> FindingCategory {
        match self {
            Self::DeviceId
            | Self::HardwareSerial
            | Self::InstallId
            | Self::ImeiSet
            | Self::InstalledRam
            | Self::TotalStorage => FindingCategory::Hardware,
            Self::Rooted
            | Self::BootloaderUnlocked
            | Self::CustomRom
            | Self::UsbDebugging
            | Self::DeveloperMode => FindingCategory::Security,
            Self::AppInventoryHash | Self::SystemPropertiesHash => FindingCategory::Software,
        }
    }
}

impl std::fmt::Display for SnapshotField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.slug())
    }
}

/// Category of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingCategory {
    /// Physical hardware attributes.
    Hardware,
    /// Installed software and system properties.
    Software,
    /// Security posture.
    Security,
    /// Network configuration.
    Network,
}

/// A single detected deviation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// The field that deviated.
    pub field: SnapshotField,
    /// Category of the field.
    pub category: FindingCategory,
    /// Baseline value (normalized form).
    pub old_value: String,
    /// Current value (normalized form).
    pub new_value: String,
    /// Severity of this deviation.
    pub severity: TamperSeverity,
}

/// Result of comparing a snapshot against the baseline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComparisonReport {
    /// Deviations found, in field order.
    pub findings: Vec<Finding>,
    /// Non-finding observations worth logging (e.g. IMEI count decreased).
    pub warnings: Vec<String>,
}

/// Pure snapshot-vs-baseline comparison.
pub struct ComparisonEngine;

impl ComparisonEngine {
    /// Compare `current` against `baseline`.
    ///
    /// Deterministic and side-effect free; findings come out in field
    /// declaration order.
    #[must_use]
    pub fn compare(current: &DeviceSnapshot, baseline: &DeviceSnapshot) -> ComparisonReport {
        let mut report = ComparisonReport::default();

        compare_string(
            &mut report,
            SnapshotField::DeviceId,
            &baseline.device_id,
            &current.device_id,
        );
        compare_string(
            &mut report,
            SnapshotField::HardwareSerial,
            &baseline.hardware_serial,
            &current.hardware_serial,
        );
        compare_string(
            &mut report,
            SnapshotField::InstallId,
            &baseline.install_id,
            &current.install_id,
        );
        compare_imeis(&mut report, &baseline.imeis, &current.imeis);

        compare_flag(
            &mut report,
            SnapshotField::Rooted,
            baseline.flags.rooted,
            current.flags.rooted,
        );
        compare_flag(
            &mut report,
            SnapshotField::BootloaderUnlocked,
            baseline.flags.bootloader_unlocked,
            current.flags.bootloader_unlocked,
        );
        compare_flag(
            &mut report,
            SnapshotField::CustomRom,
            baseline.flags.custom_rom,
            current.flags.custom_rom,
        );
        compare_flag(
            &mut report,
            SnapshotField::UsbDebugging,
            baseline.flags.usb_debugging,
            current.flags.usb_debugging,
        );
        compare_flag(
            &mut report,
            SnapshotField::DeveloperMode,
            baseline.flags.developer_mode,
            current.flags.developer_mode,
        );

        compare_string(
            &mut report,
            SnapshotField::AppInventoryHash,
            &baseline.app_inventory_hash,
            &current.app_inventory_hash,
        );
        compare_string(
            &mut report,
            SnapshotField::SystemPropertiesHash,
            &baseline.system_properties_hash,
            &current.system_properties_hash,
        );

        compare_ram(&mut report, baseline.installed_ram_mb, current.installed_ram_mb);
        compare_storage(&mut report, baseline.total_storage_mb, current.total_storage_mb);

        report
    }
}

/// Normalize a value for comparison: trim, lowercase, and drop spaces
/// inside storage-unit strings so "8 GB" equals "8GB".
#[must_use]
pub fn normalize_value(value: &str) -> String {
    let trimmed = value.trim();
    let upper = trimmed.to_uppercase();
    if ["GB", "MB", "TB", "KB"].iter().any(|unit| upper.contains(unit)) {
        trimmed.replace(' ', "").to_lowercase()
    } else {
        trimmed.to_lowercase()
    }
}

fn push_finding(report: &mut ComparisonReport, field: SnapshotField, old: String, new: String) {
    report.findings.push(Finding {
        field,
        category: field.category(),
        old_value: old,
        new_value: new,
        severity: field.severity(),
    });
}

fn compare_string(report: &mut ComparisonReport, field: SnapshotField, old: &str, new: &str) {
    let old_norm = normalize_value(old);
    let new_norm = normalize_value(new);

    // Both empty means neither side could report the field; a sentinel on
    // one side only is a degraded read, not a deviation.
    if old_norm == new_norm || old_norm.is_empty() || new_norm.is_empty() {
        return;
    }
    push_finding(report, field, old_norm, new_norm);
}

fn compare_flag(report: &mut ComparisonReport, field: SnapshotField, old: bool, new: bool) {
    if old != new {
        push_finding(report, field, old.to_string(), new.to_string());
    }
}

/// IMEI set comparison with subset tolerance.
///
/// Every currently-reported IMEI must exist in the baseline; a new IMEI is
/// a CRITICAL identity finding. An IMEI present at enrollment but missing
/// now (e.g. a disabled modem) is a warning, not a finding.
fn compare_imeis(report: &mut ComparisonReport, baseline: &[String], current: &[String]) {
    if baseline.is_empty() || current.is_empty() {
        return;
    }

    let normalize = |imeis: &[String]| -> Vec<String> {
        let mut set: Vec<String> = imeis.iter().map(|i| normalize_value(i)).collect();
        set.sort_unstable();
        set
    };

    let base_set = normalize(baseline);
    let cur_set = normalize(current);

    let unknown: Vec<&String> = cur_set.iter().filter(|i| !base_set.contains(i)).collect();
    if !unknown.is_empty() {
        push_finding(
            report,
            SnapshotField::ImeiSet,
            base_set.join(","),
            cur_set.join(","),
        );
        return;
    }

    if cur_set.len() < base_set.len() {
        report.warnings.push(format!(
            "imei count decreased: enrolled {}, reporting {}",
            base_set.len(),
            cur_set.len()
        ));
    }
}

/// RAM comparison with a downward tolerance for reserved memory.
fn compare_ram(report: &mut ComparisonReport, old_mb: u64, new_mb: u64) {
    if old_mb == 0 || new_mb == 0 {
        return;
    }
    if new_mb + RAM_TOLERANCE_MB < old_mb {
        push_finding(
            report,
            SnapshotField::InstalledRam,
            format!("{old_mb}mb"),
            format!("{new_mb}mb"),
        );
    }
}

fn compare_storage(report: &mut ComparisonReport, old_mb: u64, new_mb: u64) {
    if old_mb == 0 || new_mb == 0 {
        return;
    }
    if old_mb != new_mb {
        push_finding(
            report,
            SnapshotField::TotalStorage,
            format!("{old_mb}mb"),
            format!("{new_mb}mb"),
        );
    }
}
