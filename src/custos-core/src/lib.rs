//! # custos-core
//!
//! Device trust verification and lock enforcement engine for the Custos
//! managed-device agent.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       TrustEngine                            │
//! │                                                              │
//! │  ┌───────────────┐  ┌────────────────┐  ┌───────────────┐  │
//! │  │ Snapshot      │  │ Comparison     │  │ Severity      │  │
//! │  │ Collector     │─▶│ Engine         │─▶│ Classifier    │  │
//! │  └───────────────┘  └────────────────┘  └───────┬───────┘  │
//! │          ▲ baseline          │                   ▼          │
//! │  ┌───────┴───────┐           │          ┌───────────────┐  │
//! │  │ BaselineStore │◀──────────┘          │ Escalation    │  │
//! │  └───────────────┘   backend-verified   │ StateMachine  │  │
//! │                                         └───────┬───────┘  │
//! │  payment path ─────────────────────────┐        ▼          │
//! │  ┌───────────────┐                     │ ┌───────────────┐ │
//! │  │ LoanLedger    │────────────────────▶└▶│ LockEnforce-  │ │
//! │  └───────────────┘   strictest wins      │ mentManager   │ │
//! │                                          └───────────────┘ │
//! │  ┌───────────────┐  ┌────────────────┐  ┌───────────────┐  │
//! │  │ OfflineAlert  │  │ CommandExecutor│  │ AuditLog      │  │
//! │  │ Queue (FIFO)  │  │ (at-most-once) │  │ (hash chain)  │  │
//! │  └───────────────┘  └────────────────┘  └───────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Properties
//!
//! - Fail-soft responses: a failed feature disable never prevents the lock
//! - Strictest-wins: concurrent tamper and payment demands enforce the
//!   stricter lock, both demands audited
//! - At-most-once: replayed backend commands never act twice
//! - Durable-first: alerts and lock demands persist before any network or
//!   platform call

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::pedantic)] // Too strict for production code
#![allow(clippy::doc_markdown)] // Allow product names without backticks
#![allow(clippy::missing_errors_doc)] // Error documentation not required
#![allow(clippy::missing_panics_doc)] // Panic documentation not required
#![allow(clippy::module_name_repetitions)] // Allow Type in module::Type
#![allow(clippy::must_use_candidate)] // Not all functions need must_use

pub mod alerts;
pub mod audit;
pub mod baseline;
pub mod commands;
pub mod comparison;
pub mod config;
pub mod engine;
pub mod error;
pub mod escalation;
pub mod lock;
pub mod payment;
pub mod poller;
pub mod protection;
pub mod severity;
pub mod snapshot;
pub mod store;
pub mod transport;
pub mod types;

pub use alerts::{OfflineAlertQueue, QueuedAlert};
pub use audit::{AuditEntry, AuditKind, AuditLog, AuditSeverity, ChainVerification};
pub use baseline::{BaselineOrigin, BaselineReference, BaselineStore};
pub use commands::{BackendCommand, CommandExecutor, CommandKind, CommandOutcome};
pub use comparison::{
    ComparisonEngine, ComparisonReport, Finding, FindingCategory, SnapshotField,
};
pub use config::EngineConfig;
pub use engine::{Collaborators, CycleReport, PlatformEvent, TrustEngine};
pub use error::EngineError;
pub use escalation::{
    EscalationState, EscalationStateMachine, IncidentLedger, IncidentOrigin, IncidentTicket,
    ResponseAction, ResponsePlan,
};
pub use lock::{
    constant_time_eq, EffectiveLock, LockDecision, LockEnforcementManager, LockReason,
    LockRecord, LockStatus, LockType, PinUnlockOutcome,
};
pub use payment::{LoanLedger, LoanSnapshot, LoanStatus, StaticLoanLedger};
pub use poller::{spawn as spawn_poller, PollerHandle};
pub use protection::{ProtectionChecker, ProtectionState};
pub use severity::{SeverityClassifier, TamperSeverity, TamperStatus};
pub use snapshot::{DeviceSnapshot, SnapshotCollector};
pub use store::{FileStore, MemoryStore, StateStore};
pub use transport::{BackendTransport, HttpBackendTransport};
pub use types::{
    AlertSeverity, BackendLockStatus, BackendSyncResponse, HeartbeatPayload, NextPayment,
    RemovalAlertPayload, SyncStatus,
};
