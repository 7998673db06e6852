//! Trusted baseline management.
//!
//! Exactly one baseline is active per device: the enrollment snapshot until
//! the backend confirms one, then whichever snapshot the backend last
//! verified. A baseline is never silently overwritten by an unverified
//! snapshot - replacement goes through the single commit operation, which
//! also excludes concurrent comparison passes from observing a half-written
//! reference.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::error::EngineError;
use crate::snapshot::DeviceSnapshot;
use crate::store::{self, keys, StateStore};

/// How the active baseline was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BaselineOrigin {
    /// Captured locally at enrollment, not yet backend-confirmed.
    Enrollment,
    /// Confirmed by the backend during sync.
    BackendVerified,
    /// Re-established through a recovery flow.
    Recovery,
}

/// The snapshot considered authoritative for comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineReference {
    /// The trusted snapshot.
    pub snapshot: DeviceSnapshot,
    /// How this baseline was established.
    pub origin: BaselineOrigin,
    /// When it was committed (Unix seconds).
    pub committed_at: i64,
}

/// Holds the active baseline for a device.
pub struct BaselineStore {
    store: Arc<dyn StateStore>,
    device_id: String,
    // Readers compare against this cached reference; commit swaps it
    // atomically so no comparison pass sees a partial write.
    cached: RwLock<Option<BaselineReference>>,
}

impl BaselineStore {
    /// Create a baseline store for one device, loading any persisted
    /// reference.
    pub fn new(store: Arc<dyn StateStore>, device_id: &str) -> Result<Self, EngineError> {
        let cached = store::load_json(store.as_ref(), &keys::baseline(device_id))?;
        Ok(Self {
            store,
            device_id: device_id.to_string(),
            cached: RwLock::new(cached),
        })
    }

    /// The active baseline, if one has been established.
    #[must_use]
    pub fn active(&self) -> Option<BaselineReference> {
        self.cached.read().ok().and_then(|c| c.clone())
    }

    /// Establish the enrollment baseline.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::BaselineAlreadyEstablished`] if a baseline
    /// exists; enrollment never replaces an active reference.
    #[instrument(skip(self, snapshot), fields(device_id = %self.device_id))]
    pub fn establish_enrollment(&self, snapshot: DeviceSnapshot) -> Result<(), EngineError> {
        {
            let cached = self.cached.read().map_err(|_| EngineError::Persistence {
                message: "baseline lock poisoned".to_string(),
            })?;
            if cached.is_some() {
                return Err(EngineError::BaselineAlreadyEstablished {
                    device_id: self.device_id.clone(),
                });
            }
        }

        self.commit(snapshot, BaselineOrigin::Enrollment)
    }

    /// Commit a backend-verified or recovery baseline, replacing the active
    /// one.
    #[instrument(skip(self, snapshot), fields(device_id = %self.device_id, origin = ?origin))]
    pub fn commit_verified(
        &self,
        snapshot: DeviceSnapshot,
        origin: BaselineOrigin,
    ) -> Result<(), EngineError> {
        if origin == BaselineOrigin::Enrollment {
            return Err(EngineError::Config {
                message: "enrollment baselines go through establish_enrollment".to_string(),
            });
        }
        self.commit(snapshot, origin)
    }

    /// The single designated commit operation.
    fn commit(&self, snapshot: DeviceSnapshot, origin: BaselineOrigin) -> Result<(), EngineError> {
        let reference = BaselineReference {
            snapshot,
            origin,
            committed_at: chrono::Utc::now().timestamp(),
        };

        // Durable first, then the in-memory swap readers see.
        store::save_json(
            self.store.as_ref(),
            &keys::baseline(&self.device_id),
            &reference,
        )?;

        let mut cached = self.cached.write().map_err(|_| EngineError::Persistence {
            message: "baseline lock poisoned".to_string(),
        })?;
        *cached = Some(reference);

        info!(device_id = %self.device_id, origin = ?origin, "Baseline committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::store::MemoryStore;

    fn make_snapshot(device_id: &str) -> DeviceSnapshot {
        DeviceSnapshot {
            device_id: device_id.to_string(),
            hardware_serial: "SER".to_string(),
            install_id: "INST".to_string(),
            imeis: vec![],
            manufacturer: "Acme".to_string(),
            model: "A1".to_string(),
            os_version: "14".to_string(),
            build_id: "B1".to_string(),
            security_patch_level: None,
            bootloader: "bl".to_string(),
            installed_ram_mb: 8192,
            total_storage_mb: 131_072,
            flags: Default::default(),
            app_inventory_hash: "aa".to_string(),
            system_properties_hash: "bb".to_string(),
            battery_percent: 50,
            uptime_secs: 10,
            location: None,
            captured_at: 1_700_000_000,
            degraded: vec![],
        }
    }

    #[test]
    fn test_enrollment_establishes_once() {
        let store = Arc::new(MemoryStore::new());
        let baselines = BaselineStore::new(store, "d1").unwrap();

        assert!(baselines.active().is_none());
        baselines.establish_enrollment(make_snapshot("d1")).unwrap();

        let active = baselines.active().unwrap();
        assert_eq!(active.origin, BaselineOrigin::Enrollment);

        // Second enrollment attempt is rejected.
        let err = baselines.establish_enrollment(make_snapshot("d1")).unwrap_err();
        assert!(matches!(err, EngineError::BaselineAlreadyEstablished { .. }));
    }

    #[test]
    fn test_verified_commit_replaces_enrollment() {
        let store = Arc::new(MemoryStore::new());
        let baselines = BaselineStore::new(store, "d1").unwrap();
        baselines.establish_enrollment(make_snapshot("d1")).unwrap();

        let mut verified = make_snapshot("d1");
        verified.app_inventory_hash = "cc".to_string();
        baselines
            .commit_verified(verified, BaselineOrigin::BackendVerified)
            .unwrap();

        let active = baselines.active().unwrap();
        assert_eq!(active.origin, BaselineOrigin::BackendVerified);
        assert_eq!(active.snapshot.app_inventory_hash, "cc");
    }

    #[test]
    fn test_baseline_survives_restart() {
        let store = Arc::new(MemoryStore::new());
        {
            let baselines = BaselineStore::new(Arc::clone(&store) as Arc<dyn StateStore>, "d1").unwrap();
            baselines.establish_enrollment(make_snapshot("d1")).unwrap();
        }

        let reloaded = BaselineStore::new(store, "d1").unwrap();
        assert!(reloaded.active().is_some());
    }

    #[test]
    fn test_enrollment_origin_rejected_on_verified_path() {
        let store = Arc::new(MemoryStore::new());
        let baselines = BaselineStore::new(store, "d1").unwrap();

        let err = baselines
            .commit_verified(make_snapshot("d1"), BaselineOrigin::Enrollment)
            .unwrap_err();
        assert!(matches!(err, EngineError::Config { .. }));
    }
}
