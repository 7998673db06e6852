//! Software-only platform implementations.
//!
//! WARNING: These implementations exercise no real platform privilege.
//! They exist for:
//! - Development and testing (the engine's test doubles)
//! - Desktop bring-up where no device-owner API is present
//! - CI environments
//!
//! `SoftwareDeviceInfo` serves a mutable fact sheet, so tests can flip a
//! security flag between captures and watch the engine react.
//! `SoftwarePrivilegeController` records every action it is asked to
//! perform and can be armed to fail specific actions.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::PlatformError;
use crate::info::DeviceInfoProvider;
use crate::privilege::{PrivilegeController, ProtectionProbe};
use crate::types::{
    BuildInfo, DeviceIdentity, LocationFix, ProbeReport, SecurityPosture, Telemetry,
};

/// Mutable device fact sheet backing [`SoftwareDeviceInfo`].
#[derive(Debug, Clone)]
pub struct DeviceFacts {
    /// Identifiers.
    pub identity: DeviceIdentity,
    /// Build attributes.
    pub build: BuildInfo,
    /// Security posture flags.
    pub posture: SecurityPosture,
    /// Installed application packages.
    pub apps: Vec<String>,
    /// System properties.
    pub properties: BTreeMap<String, String>,
    /// Telemetry.
    pub telemetry: Telemetry,
    /// Optional location fix.
    pub location: Option<LocationFix>,
    /// Sources that should fail on read (by name, e.g. "location").
    pub failing_sources: Vec<String>,
}

impl Default for DeviceFacts {
    fn default() -> Self {
        Self {
            identity: DeviceIdentity {
                device_id: "dev-0001".to_string(),
                hardware_serial: "SER-0001".to_string(),
                install_id: "inst-0001".to_string(),
                imeis: vec!["356938035643809".to_string()],
            },
            build: BuildInfo {
                manufacturer: "Acme".to_string(),
                model: "A1".to_string(),
                os_version: "14".to_string(),
                build_id: "AC1A.240101.001".to_string(),
                security_patch_level: Some("2026-06-05".to_string()),
                bootloader: "slider-1.0".to_string(),
                installed_ram_mb: 8192,
                total_storage_mb: 131_072,
            },
            posture: SecurityPosture::default(),
            apps: vec![
                "com.android.settings".to_string(),
                "com.custos.agent".to_string(),
            ],
            properties: BTreeMap::from([
                ("ro.boot.verifiedbootstate".to_string(), "green".to_string()),
                ("ro.debuggable".to_string(), "0".to_string()),
            ]),
            telemetry: Telemetry {
                battery_percent: 80,
                uptime_secs: 3600,
            },
            location: None,
            failing_sources: Vec::new(),
        }
    }
}

/// Software device info provider serving a mutable fact sheet.
pub struct SoftwareDeviceInfo {
    facts: RwLock<DeviceFacts>,
}

impl SoftwareDeviceInfo {
    /// Create a provider with default facts.
    #[must_use]
    pub fn new() -> Self {
        Self::with_facts(DeviceFacts::default())
    }

    /// Create a provider with the given facts.
    #[must_use]
    pub fn with_facts(facts: DeviceFacts) -> Self {
        Self {
            facts: RwLock::new(facts),
        }
    }

    /// Mutate the fact sheet in place.
    pub fn update<F: FnOnce(&mut DeviceFacts)>(&self, f: F) {
        if let Ok(mut facts) = self.facts.write() {
            f(&mut facts);
        }
    }

    fn read(&self) -> DeviceFacts {
        self.facts
            .read()
            .map(|f| f.clone())
            .unwrap_or_default()
    }

    fn check_source(&self, name: &str) -> Result<(), PlatformError> {
        let failing = self
            .facts
            .read()
            .map(|f| f.failing_sources.iter().any(|s| s == name))
            .unwrap_or(false);
        if failing {
            return Err(PlatformError::SourceUnavailable {
                source_name: name.to_string(),
            });
        }
        Ok(())
    }
}

impl Default for SoftwareDeviceInfo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceInfoProvider for SoftwareDeviceInfo {
    async fn identity(&self) -> Result<DeviceIdentity, PlatformError> {
        self.check_source("identity")?;
        Ok(self.read().identity)
    }

    async fn build_info(&self) -> Result<BuildInfo, PlatformError> {
        self.check_source("build_info")?;
        Ok(self.read().build)
    }

    async fn security_posture(&self) -> Result<SecurityPosture, PlatformError> {
        self.check_source("security_posture")?;
        Ok(self.read().posture)
    }

    async fn app_inventory(&self) -> Result<Vec<String>, PlatformError> {
        self.check_source("app_inventory")?;
        Ok(self.read().apps)
    }

    async fn system_properties(&self) -> Result<BTreeMap<String, String>, PlatformError> {
        self.check_source("system_properties")?;
        Ok(self.read().properties)
    }

    async fn telemetry(&self) -> Result<Telemetry, PlatformError> {
        self.check_source("telemetry")?;
        Ok(self.read().telemetry)
    }

    async fn location(&self) -> Result<Option<LocationFix>, PlatformError> {
        self.check_source("location")?;
        Ok(self.read().location)
    }
}

/// A privileged action recorded by [`SoftwarePrivilegeController`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedAction {
    /// `lock_device` with the displayed message.
    Lock(String),
    /// `release_lock`.
    Release,
    /// `disable_camera`.
    Camera(bool),
    /// `disable_usb`.
    Usb(bool),
    /// `disable_developer_options`.
    DeveloperOptions(bool),
    /// `restrict_network`.
    Network(bool),
    /// `wipe_sensitive_data`.
    Wipe,
}

impl RecordedAction {
    fn name(&self) -> &'static str {
        match self {
            Self::Lock(_) => "lock_device",
            Self::Release => "release_lock",
            Self::Camera(_) => "disable_camera",
            Self::Usb(_) => "disable_usb",
            Self::DeveloperOptions(_) => "disable_developer_options",
            Self::Network(_) => "restrict_network",
            Self::Wipe => "wipe_sensitive_data",
        }
    }
}

/// Software privilege controller that records actions instead of performing
/// them.
pub struct SoftwarePrivilegeController {
    actions: RwLock<Vec<RecordedAction>>,
    failing_actions: RwLock<Vec<String>>,
}

impl SoftwarePrivilegeController {
    /// Create a controller that succeeds on every action.
    #[must_use]
    pub fn new() -> Self {
        Self {
            actions: RwLock::new(Vec::new()),
            failing_actions: RwLock::new(Vec::new()),
        }
    }

    /// Arm the named action (e.g. "disable_camera") to fail until disarmed.
    pub fn fail_action(&self, action: &str) {
        if let Ok(mut failing) = self.failing_actions.write() {
            failing.push(action.to_string());
        }
    }

    /// Clear all armed failures.
    pub fn clear_failures(&self) {
        if let Ok(mut failing) = self.failing_actions.write() {
            failing.clear();
        }
    }

    /// Every action performed so far, in order.
    #[must_use]
    pub fn recorded(&self) -> Vec<RecordedAction> {
        self.actions.read().map(|a| a.clone()).unwrap_or_default()
    }

    fn record(&self, action: RecordedAction) -> Result<(), PlatformError> {
        let name = action.name();
        let armed = self
            .failing_actions
            .read()
            .map(|f| f.iter().any(|a| a == name))
            .unwrap_or(false);
        if armed {
            return Err(PlatformError::ActionFailed {
                action: name.to_string(),
                reason: "armed to fail".to_string(),
            });
        }
        if let Ok(mut actions) = self.actions.write() {
            actions.push(action);
        }
        Ok(())
    }
}

impl Default for SoftwarePrivilegeController {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PrivilegeController for SoftwarePrivilegeController {
    async fn lock_device(&self, message: &str) -> Result<(), PlatformError> {
        tracing::info!(message = %message, "software controller: lock_device");
        self.record(RecordedAction::Lock(message.to_string()))
    }

    async fn release_lock(&self) -> Result<(), PlatformError> {
        self.record(RecordedAction::Release)
    }

    async fn disable_camera(&self, disabled: bool) -> Result<(), PlatformError> {
        self.record(RecordedAction::Camera(disabled))
    }

    async fn disable_usb(&self, disabled: bool) -> Result<(), PlatformError> {
        self.record(RecordedAction::Usb(disabled))
    }

    async fn disable_developer_options(&self, disabled: bool) -> Result<(), PlatformError> {
        self.record(RecordedAction::DeveloperOptions(disabled))
    }

    async fn restrict_network(&self, restricted: bool) -> Result<(), PlatformError> {
        self.record(RecordedAction::Network(restricted))
    }

    async fn wipe_sensitive_data(&self) -> Result<(), PlatformError> {
        self.record(RecordedAction::Wipe)
    }
}

/// Software protection probe serving a mutable report.
pub struct SoftwareProtectionProbe {
    report: RwLock<ProbeReport>,
}

impl SoftwareProtectionProbe {
    /// Create a probe reporting all protections intact.
    #[must_use]
    pub fn intact() -> Self {
        Self {
            report: RwLock::new(ProbeReport {
                app_installed: true,
                device_owner_enabled: true,
                uninstall_blocked: true,
                force_stop_blocked: true,
                status_integrity_valid: true,
            }),
        }
    }

    /// Replace the served report.
    pub fn set_report(&self, report: ProbeReport) {
        if let Ok(mut current) = self.report.write() {
            *current = report;
        }
    }
}

#[async_trait]
impl ProtectionProbe for SoftwareProtectionProbe {
    async fn probe(&self) -> Result<ProbeReport, PlatformError> {
        self.report
            .read()
            .map(|r| *r)
            .map_err(|_| PlatformError::SourceUnavailable {
                source_name: "protection_probe".to_string(),
            })
    }
}
