//! # custos-platform
//!
//! Platform collaborator seam for the Custos device trust agent.
//!
//! The engine in `custos-core` never talks to the OS directly. Everything
//! platform-shaped crosses one of three traits defined here:
//!
//! - [`DeviceInfoProvider`] — read-only device state (identifiers, build
//!   attributes, security flags, inventories, telemetry, location)
//! - [`PrivilegeController`] — privileged actions (screen lock, feature
//!   disables, sensitive-data wipe)
//! - [`ProtectionProbe`] — the agent's self-check of its own protections
//!
//! Real deployments provide device-owner-backed implementations; the
//! [`software`] module ships recording/mutable doubles for tests, desktop
//! bring-up, and CI.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::pedantic)] // Too strict for production code
#![allow(clippy::module_name_repetitions)] // Allow Type in module::Type
#![allow(clippy::must_use_candidate)] // Not all functions need must_use

mod error;
mod info;
mod privilege;
mod types;

/// Software-only implementations for tests and desktop bring-up.
pub mod software;

pub use error::PlatformError;
pub use info::DeviceInfoProvider;
pub use privilege::{PrivilegeController, ProtectionProbe};
pub use types::{
    BuildInfo, DeviceIdentity, LocationFix, ProbeReport, SecurityPosture, Telemetry,
};
