//! Persistent state store.
//!
//! The engine keeps all durable state (baseline, escalation state, active
//! lock, alert queue, audit trail, executed-command set) in a key-value
//! record store keyed by device identifier. The store itself is an external
//! collaborator behind the [`StateStore`] trait; this module ships an
//! in-memory implementation for tests and an encrypted file-backed one.
//! File entries are sealed with XChaCha20-Poly1305, nonce prepended to the
//! ciphertext; a decrypt failure is treated as tampering and surfaces as a
//! missing entry rather than a panic.

// Allow deprecated from_slice until chacha20poly1305 upgrades to generic-array 1.x
#![allow(deprecated)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use chacha20poly1305::{
    aead::{Aead, KeyInit, OsRng},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{trace, warn};

use crate::error::EngineError;

/// XChaCha20-Poly1305 nonce size (24 bytes).
const NONCE_SIZE: usize = 24;

/// Key-value record store for engine state.
pub trait StateStore: Send + Sync {
    /// Read a record.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, EngineError>;

    /// Write a record durably.
    fn put(&self, key: &str, value: &[u8]) -> Result<(), EngineError>;

    /// Delete a record.
    fn delete(&self, key: &str) -> Result<(), EngineError>;
}

/// Load and deserialize a JSON record.
pub fn load_json<T: DeserializeOwned>(
    store: &dyn StateStore,
    key: &str,
) -> Result<Option<T>, EngineError> {
    match store.get(key)? {
        Some(bytes) => {
            let value = serde_json::from_slice(&bytes)
                .map_err(|e| EngineError::from_serde(key, e))?;
            Ok(Some(value))
        },
        None => Ok(None),
    }
}

/// Serialize and store a JSON record.
pub fn save_json<T: Serialize>(
    store: &dyn StateStore,
    key: &str,
    value: &T,
) -> Result<(), EngineError> {
    let bytes = serde_json::to_vec(value).map_err(|e| EngineError::from_serde(key, e))?;
    store.put(key, &bytes)
}

/// Store keys, namespaced per device.
pub mod keys {
    /// Baseline reference.
    #[must_use]
    pub fn baseline(device_id: &str) -> String {
        format!("custos/{device_id}/baseline")
    }

    /// Active lock record.
    #[must_use]
    pub fn lock(device_id: &str) -> String {
        format!("custos/{device_id}/lock")
    }

    /// Offline alert queue.
    #[must_use]
    pub fn alert_queue(device_id: &str) -> String {
        format!("custos/{device_id}/alerts")
    }

    /// Audit trail.
    #[must_use]
    pub fn audit(device_id: &str) -> String {
        format!("custos/{device_id}/audit")
    }

    /// Executed backend-command IDs.
    #[must_use]
    pub fn executed_commands(device_id: &str) -> String {
        format!("custos/{device_id}/commands")
    }

    /// Escalation state plus the incident attempt counter and dedup state.
    #[must_use]
    pub fn incidents(device_id: &str) -> String {
        format!("custos/{device_id}/incidents")
    }

    /// Pending unlock PIN delivered by the backend.
    #[must_use]
    pub fn unlock_pin(device_id: &str) -> String {
        format!("custos/{device_id}/unlock_pin")
    }
}

/// In-memory store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, Vec<u8>>>,
    /// When set, every operation fails (for persistence-failure tests).
    fail_all: RwLock<bool>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm or disarm whole-store failure.
    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut flag) = self.fail_all.write() {
            *flag = failing;
        }
    }

    fn check(&self) -> Result<(), EngineError> {
        let failing = self.fail_all.read().map(|f| *f).unwrap_or(false);
        if failing {
            return Err(EngineError::Persistence {
                message: "store armed to fail".to_string(),
            });
        }
        Ok(())
    }
}

impl StateStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, EngineError> {
        self.check()?;
        Ok(self
            .records
            .read()
            .map_err(|_| EngineError::Persistence {
                message: "store lock poisoned".to_string(),
            })?
            .get(key)
            .cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), EngineError> {
        self.check()?;
        self.records
            .write()
            .map_err(|_| EngineError::Persistence {
                message: "store lock poisoned".to_string(),
            })?
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), EngineError> {
        self.check()?;
        self.records
            .write()
            .map_err(|_| EngineError::Persistence {
                message: "store lock poisoned".to_string(),
            })?
            .remove(key);
        Ok(())
    }
}

/// Encrypted file-backed store.
pub struct FileStore {
    dir: PathBuf,
    encryption_key: [u8; 32],
}

impl FileStore {
    /// Create a file store rooted at `dir`.
    ///
    /// The encryption key is derived from the device identifier; records
    /// written by one device cannot be read back under another identity.
    #[must_use]
    pub fn new(dir: PathBuf, device_id: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"custos-store-key:");
        hasher.update(device_id.as_bytes());
        let encryption_key: [u8; 32] = hasher.finalize().into();

        Self {
            dir,
            encryption_key,
        }
    }

    /// File path for a record: hashed key, so key names never hit the
    /// filesystem.
    fn entry_path(&self, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(self.encryption_key);
        hasher.update(key.as_bytes());
        let hash = hex::encode(&hasher.finalize()[..16]);
        self.dir.join(format!("{hash}.rec"))
    }

    fn encrypt(&self, plaintext: &[u8]) -> Option<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = XNonce::from_slice(&nonce_bytes);

        let cipher = XChaCha20Poly1305::new_from_slice(&self.encryption_key).ok()?;
        let ciphertext = cipher.encrypt(nonce, plaintext).ok()?;

        let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);
        Some(result)
    }

    fn decrypt(&self, data: &[u8]) -> Option<Vec<u8>> {
        if data.len() < NONCE_SIZE {
            warn!(data_len = data.len(), "Store: record too short for nonce");
            return None;
        }

        let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
        let nonce = XNonce::from_slice(nonce_bytes);

        let cipher = XChaCha20Poly1305::new_from_slice(&self.encryption_key).ok()?;
        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| {
                warn!("Store: decryption failed (possible tampering): {}", e);
                e
            })
            .ok()
    }
}

impl StateStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, EngineError> {
        let path = self.entry_path(key);
        let encrypted = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(EngineError::Persistence {
                    message: format!("read {key}: {e}"),
                })
            },
        };

        // A record that fails authentication is treated as absent; the
        // caller re-establishes state rather than trusting tampered bytes.
        Ok(self.decrypt(&encrypted))
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), EngineError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| EngineError::Persistence {
            message: format!("create store dir: {e}"),
        })?;

        let encrypted = self.encrypt(value).ok_or_else(|| EngineError::Persistence {
            message: format!("encrypt {key}"),
        })?;

        let path = self.entry_path(key);
        std::fs::write(&path, &encrypted).map_err(|e| EngineError::Persistence {
            message: format!("write {key}: {e}"),
        })?;

        trace!(key = key, bytes = encrypted.len(), "Store: record written");
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), EngineError> {
        let path = self.entry_path(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(EngineError::Persistence {
                message: format!("delete {key}: {e}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        store.put("k", b"v").unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"v".to_vec()));

        store.delete("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn test_memory_store_armed_failure() {
        let store = MemoryStore::new();
        store.set_failing(true);
        assert!(store.put("k", b"v").is_err());
        assert!(store.get("k").is_err());

        store.set_failing(false);
        assert!(store.put("k", b"v").is_ok());
    }

    #[test]
    fn test_json_helpers() {
        let store = MemoryStore::new();
        save_json(&store, "n", &42u32).unwrap();
        let loaded: Option<u32> = load_json(&store, "n").unwrap();
        assert_eq!(loaded, Some(42));

        let missing: Option<u32> = load_json(&store, "absent").unwrap();
        assert_eq!(missing, None);
    }

    #[test]
    fn test_keys_are_device_scoped() {
        assert_eq!(keys::baseline("d1"), "custos/d1/baseline");
        assert_ne!(keys::lock("d1"), keys::lock("d2"));
    }
}
