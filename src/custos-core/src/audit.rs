//! Append-only audit trail.
//!
//! Every state transition, verification result, response action, privilege
//! failure, and queue prune is recorded as a hash-chained entry: each entry
//! carries the SHA-256 of its canonical JSON form plus the hash of its
//! predecessor, rooted at `"genesis"`. The chain makes local tampering with
//! the trail detectable via [`AuditLog::verify_chain`].

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::store::{self, keys, StateStore};

/// Severity of an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditSeverity {
    /// Routine bookkeeping.
    Info,
    /// Degradation worth noticing (e.g. queue prune).
    Low,
    /// Incident requiring attention (e.g. privilege failure).
    High,
}

/// Kind of audited event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    /// Verification cycle result.
    VerificationResult,
    /// Comparison skipped - no usable baseline.
    ComparisonInconclusive,
    /// Escalation state transition.
    StateTransition,
    /// Protective response action.
    ResponseAction,
    /// Platform privilege call failed.
    PrivilegeFailure,
    /// Lock applied or updated.
    LockApplied,
    /// Lock released.
    LockReleased,
    /// PIN unlock attempt.
    PinAttempt,
    /// Backend command executed.
    CommandExecuted,
    /// Baseline committed.
    BaselineCommitted,
    /// Queued alerts pruned past the retention cap.
    QueuePruned,
    /// Protection self-check outcome.
    ProtectionCheck,
}

/// A single audit entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Sequence number in the chain, starting at 1.
    pub sequence_number: u64,
    /// Kind of event.
    pub kind: AuditKind,
    /// Severity of the entry.
    pub severity: AuditSeverity,
    /// Device this entry belongs to.
    pub device_id: String,
    /// Human-readable message.
    pub message: String,
    /// Unix timestamp.
    pub timestamp: i64,
    /// Hash of the previous entry, or `"genesis"`.
    pub previous_hash: String,
    /// Hash of this entry.
    pub entry_hash: String,
}

impl AuditEntry {
    /// Compute the expected hash over the canonical JSON form.
    #[must_use]
    pub fn compute_hash(&self) -> String {
        let canonical = serde_json::json!({
            "sequence_number": self.sequence_number,
            "kind": self.kind,
            "severity": self.severity,
            "device_id": self.device_id,
            "message": self.message,
            "timestamp": self.timestamp,
            "previous_hash": self.previous_hash,
        });

        let canonical_json = serde_json::to_string(&canonical).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(canonical_json.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Verify this entry's stored hash.
    #[must_use]
    pub fn verify_hash(&self) -> bool {
        self.compute_hash() == self.entry_hash
    }
}

/// Result of a chain verification pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainVerification {
    /// The chain is intact.
    pub valid: bool,
    /// Entries checked.
    pub entries_verified: u64,
    /// First sequence number that broke the chain, if any.
    pub first_broken_sequence: Option<u64>,
    /// Descriptions of the breaks found.
    pub errors: Vec<String>,
}

/// Append-only, hash-chained audit log for one device.
pub struct AuditLog {
    store: Arc<dyn StateStore>,
    device_id: String,
    cap: usize,
    // Tail state so append does not re-read the whole trail.
    tail: RwLock<(u64, String)>,
}

impl AuditLog {
    /// Open the audit log for a device, loading the persisted tail.
    pub fn new(
        store: Arc<dyn StateStore>,
        device_id: &str,
        cap: usize,
    ) -> Result<Self, EngineError> {
        let entries: Vec<AuditEntry> =
            store::load_json(store.as_ref(), &keys::audit(device_id))?.unwrap_or_default();

        let tail = entries
            .last()
            .map(|e| (e.sequence_number, e.entry_hash.clone()))
            .unwrap_or((0, "genesis".to_string()));

        Ok(Self {
            store,
            device_id: device_id.to_string(),
            cap,
            tail: RwLock::new(tail),
        })
    }

    /// Append one entry.
    pub fn append(
        &self,
        kind: AuditKind,
        severity: AuditSeverity,
        message: impl Into<String>,
    ) -> Result<(), EngineError> {
        let message = message.into();
        let mut tail = self.tail.write().map_err(|_| EngineError::Persistence {
            message: "audit tail lock poisoned".to_string(),
        })?;

        let (last_seq, last_hash) = tail.clone();

        let mut entry = AuditEntry {
            sequence_number: last_seq + 1,
            kind,
            severity,
            device_id: self.device_id.clone(),
            message,
            timestamp: chrono::Utc::now().timestamp(),
            previous_hash: last_hash,
            entry_hash: String::new(),
        };
        entry.entry_hash = entry.compute_hash();

        let key = keys::audit(&self.device_id);
        let mut entries: Vec<AuditEntry> =
            store::load_json(self.store.as_ref(), &key)?.unwrap_or_default();
        entries.push(entry.clone());

        // Bounded retention: drop the oldest entries past the cap. The
        // retained segment keeps its internal links; verification accepts
        // a trimmed head.
        if entries.len() > self.cap {
            let drain = entries.len() - self.cap;
            entries.drain(..drain);
        }

        store::save_json(self.store.as_ref(), &key, &entries)?;

        *tail = (entry.sequence_number, entry.entry_hash.clone());
        debug!(
            sequence = entry.sequence_number,
            kind = ?entry.kind,
            "Audit entry appended"
        );
        Ok(())
    }

    /// Best-effort append: a persistence failure is logged, not propagated.
    ///
    /// Used on response paths where auditing must never mask the underlying
    /// decision.
    pub fn append_soft(&self, kind: AuditKind, severity: AuditSeverity, message: impl Into<String>) {
        if let Err(e) = self.append(kind, severity, message) {
            warn!(error = %e, "Audit append failed");
        }
    }

    /// All retained entries, oldest first.
    pub fn entries(&self) -> Result<Vec<AuditEntry>, EngineError> {
        Ok(store::load_json(self.store.as_ref(), &keys::audit(&self.device_id))?.unwrap_or_default())
    }

    /// Verify the retained chain.
    ///
    /// The first retained entry may be mid-chain after trimming; continuity
    /// is verified from there. An untrimmed chain must root at `"genesis"`.
    pub fn verify_chain(&self) -> Result<ChainVerification, EngineError> {
        let entries = self.entries()?;
        let mut errors = Vec::new();
        let mut first_broken = None;

        if let Some(first) = entries.first() {
            if first.sequence_number == 1 && first.previous_hash != "genesis" {
                errors.push(format!(
                    "entry 1 has previous_hash '{}', expected 'genesis'",
                    first.previous_hash
                ));
                first_broken = Some(1);
            }
        }

        let mut previous: Option<&AuditEntry> = None;
        for entry in &entries {
            if let Some(prev) = previous {
                if entry.sequence_number != prev.sequence_number + 1 {
                    errors.push(format!(
                        "sequence gap: {} follows {}",
                        entry.sequence_number, prev.sequence_number
                    ));
                    first_broken.get_or_insert(entry.sequence_number);
                }
                if entry.previous_hash != prev.entry_hash {
                    errors.push(format!(
                        "chain break at sequence {}",
                        entry.sequence_number
                    ));
                    first_broken.get_or_insert(entry.sequence_number);
                }
            }

            if !entry.verify_hash() {
                errors.push(format!("hash mismatch at sequence {}", entry.sequence_number));
                first_broken.get_or_insert(entry.sequence_number);
            }

            previous = Some(entry);
        }

        Ok(ChainVerification {
            valid: errors.is_empty(),
            entries_verified: entries.len() as u64,
            first_broken_sequence: first_broken,
            errors,
        })
    }
}
