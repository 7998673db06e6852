//! Backend command execution with at-most-once semantics.
//!
//! Each command carries a unique identifier. Executed identifiers are
//! persisted before the action runs: a crash between the two can lose one
//! execution but can never run a command twice, which is the invariant the
//! backend relies on when it retries deliveries.

use std::sync::Arc;

use custos_platform::PrivilegeController;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::audit::{AuditKind, AuditLog, AuditSeverity};
use crate::error::EngineError;
use crate::store::{self, keys, StateStore};

/// Maximum executed-command IDs remembered.
const EXECUTED_SET_CAP: usize = 512;

/// Typed backend instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandKind {
    /// Lock the device screen.
    LockDevice,
    /// Disable camera, USB, and developer options together.
    DisableFeatures,
    /// Wipe staged sensitive data.
    WipeData,
    /// Record the command, take no device action.
    AlertOnly,
    /// Disable the camera.
    DisableCamera,
    /// Disable USB data transfer.
    DisableUsb,
    /// Disable developer options.
    DisableDeveloperMode,
    /// Restrict network access to the backend.
    RestrictNetwork,
}

/// A command received from the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendCommand {
    /// Unique command identifier used for at-most-once execution.
    pub command_id: String,
    /// The instruction.
    pub kind: CommandKind,
    /// Optional operator message (shown on the lock surface for
    /// `LockDevice`).
    #[serde(default)]
    pub message: Option<String>,
}

/// Outcome of a command execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The command ran.
    Executed,
    /// The identifier was already in the executed set; nothing ran.
    Duplicate,
}

/// Executes backend commands against the privilege layer.
pub struct CommandExecutor {
    store: Arc<dyn StateStore>,
    privileges: Arc<dyn PrivilegeController>,
    audit: Arc<AuditLog>,
    device_id: String,
}

impl CommandExecutor {
    /// Create an executor for one device.
    pub fn new(
        store: Arc<dyn StateStore>,
        privileges: Arc<dyn PrivilegeController>,
        audit: Arc<AuditLog>,
        device_id: &str,
    ) -> Self {
        Self {
            store,
            privileges,
            audit,
            device_id: device_id.to_string(),
        }
    }

    fn executed_set(&self) -> Result<Vec<String>, EngineError> {
        Ok(
            store::load_json(self.store.as_ref(), &keys::executed_commands(&self.device_id))?
                .unwrap_or_default(),
        )
    }

    /// Execute a command at most once.
    #[instrument(skip(self, command), fields(command_id = %command.command_id, kind = ?command.kind))]
    pub async fn execute(&self, command: &BackendCommand) -> Result<CommandOutcome, EngineError> {
        let mut executed = self.executed_set()?;
        if executed.iter().any(|id| id == &command.command_id) {
            info!("Command already executed, skipping");
            return Ok(CommandOutcome::Duplicate);
        }

        // Mark executed before running: replays must never act twice.
        executed.push(command.command_id.clone());
        if executed.len() > EXECUTED_SET_CAP {
            let drain = executed.len() - EXECUTED_SET_CAP;
            executed.drain(..drain);
        }
        store::save_json(
            self.store.as_ref(),
            &keys::executed_commands(&self.device_id),
            &executed,
        )?;

        let result = self.run(command).await;
        match &result {
            Ok(()) => {
                self.audit.append_soft(
                    AuditKind::CommandExecuted,
                    AuditSeverity::Info,
                    format!("command {:?} ({}) executed", command.kind, command.command_id),
                );
            },
            Err(e) => {
                warn!(error = %e, "Command action failed");
                self.audit.append_soft(
                    AuditKind::PrivilegeFailure,
                    AuditSeverity::High,
                    format!("command {:?} ({}) failed: {e}", command.kind, command.command_id),
                );
            },
        }

        // The identifier stays in the executed set either way; the backend
        // reissues under a new identifier if it wants a retry.
        result.map(|()| CommandOutcome::Executed)
    }

    async fn run(&self, command: &BackendCommand) -> Result<(), EngineError> {
        let message = command
            .message
            .as_deref()
            .unwrap_or("Device locked by administrator.");

        match command.kind {
            CommandKind::LockDevice => self
                .privileges
                .lock_device(message)
                .await
                .map_err(|e| EngineError::from_privilege("lock_device", e)),
            CommandKind::DisableFeatures => {
                // Each disable is independently fail-soft; the first error
                // is reported after all three are attempted.
                let mut first_err = None;
                for (action, result) in [
                    ("disable_camera", self.privileges.disable_camera(true).await),
                    ("disable_usb", self.privileges.disable_usb(true).await),
                    (
                        "disable_developer_options",
                        self.privileges.disable_developer_options(true).await,
                    ),
                ] {
                    if let Err(e) = result {
                        warn!(action = action, error = %e, "Feature disable failed");
                        first_err.get_or_insert(EngineError::from_privilege(action, e));
                    }
                }
                first_err.map_or(Ok(()), Err)
            },
            CommandKind::WipeData => self
                .privileges
                .wipe_sensitive_data()
                .await
                .map_err(|e| EngineError::from_privilege("wipe_sensitive_data", e)),
            CommandKind::AlertOnly => Ok(()),
            CommandKind::DisableCamera => self
                .privileges
                .disable_camera(true)
                .await
                .map_err(|e| EngineError::from_privilege("disable_camera", e)),
            CommandKind::DisableUsb => self
                .privileges
                .disable_usb(true)
                .await
                .map_err(|e| EngineError::from_privilege("disable_usb", e)),
            CommandKind::DisableDeveloperMode => self
                .privileges
                .disable_developer_options(true)
                .await
                .map_err(|e| EngineError::from_privilege("disable_developer_options", e)),
            CommandKind::RestrictNetwork => self
                .privileges
                .restrict_network(true)
                .await
                .map_err(|e| EngineError::from_privilege("restrict_network", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use custos_platform::software::{RecordedAction, SoftwarePrivilegeController};

    use super::*;
    use crate::store::MemoryStore;

    struct Fixture {
        executor: CommandExecutor,
        privileges: Arc<SoftwarePrivilegeController>,
    }

    fn make_fixture() -> Fixture {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
        let privileges = Arc::new(SoftwarePrivilegeController::new());
        let audit = Arc::new(AuditLog::new(Arc::clone(&store), "d1", 100).unwrap());
        let executor = CommandExecutor::new(
            store,
            Arc::clone(&privileges) as Arc<dyn PrivilegeController>,
            audit,
            "d1",
        );
        Fixture {
            executor,
            privileges,
        }
    }

    fn make_command(id: &str, kind: CommandKind) -> BackendCommand {
        BackendCommand {
            command_id: id.to_string(),
            kind,
            message: None,
        }
    }

    #[tokio::test]
    async fn test_command_executes_once() {
        let fixture = make_fixture();
        let command = make_command("cmd-1", CommandKind::LockDevice);

        let first = fixture.executor.execute(&command).await.unwrap();
        assert_eq!(first, CommandOutcome::Executed);

        let second = fixture.executor.execute(&command).await.unwrap();
        assert_eq!(second, CommandOutcome::Duplicate);

        let locks = fixture
            .privileges
            .recorded()
            .iter()
            .filter(|a| matches!(a, RecordedAction::Lock(_)))
            .count();
        assert_eq!(locks, 1);
    }

    #[tokio::test]
    async fn test_disable_features_attempts_all_three() {
        let fixture = make_fixture();
        fixture.privileges.fail_action("disable_usb");

        let command = make_command("cmd-2", CommandKind::DisableFeatures);
        let err = fixture.executor.execute(&command).await.unwrap_err();
        assert!(err.is_audit_incident());

        // Camera and developer options were still attempted.
        let recorded = fixture.privileges.recorded();
        assert!(recorded.contains(&RecordedAction::Camera(true)));
        assert!(recorded.contains(&RecordedAction::DeveloperOptions(true)));
    }

    #[tokio::test]
    async fn test_failed_command_not_retried_under_same_id() {
        let fixture = make_fixture();
        fixture.privileges.fail_action("lock_device");

        let command = make_command("cmd-3", CommandKind::LockDevice);
        assert!(fixture.executor.execute(&command).await.is_err());

        // The identifier was consumed; a replay is a duplicate even though
        // the action failed.
        fixture.privileges.clear_failures();
        let outcome = fixture.executor.execute(&command).await.unwrap();
        assert_eq!(outcome, CommandOutcome::Duplicate);
    }

    #[tokio::test]
    async fn test_alert_only_touches_nothing() {
        let fixture = make_fixture();
        let command = make_command("cmd-4", CommandKind::AlertOnly);

        fixture.executor.execute(&command).await.unwrap();
        assert!(fixture.privileges.recorded().is_empty());
    }
}
