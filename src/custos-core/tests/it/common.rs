//! Shared fixtures for the integration scenarios.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use custos_core::{
    BackendSyncResponse, BackendTransport, Collaborators, EngineConfig, EngineError,
    HeartbeatPayload, MemoryStore, RemovalAlertPayload, StateStore, StaticLoanLedger,
    TrustEngine,
};
use custos_platform::software::{
    SoftwareDeviceInfo, SoftwarePrivilegeController, SoftwareProtectionProbe,
};
use custos_platform::{DeviceInfoProvider, PrivilegeController};

/// Transport double: toggleable connectivity, scripted response, and a
/// record of every alert that got through.
pub struct RecordingTransport {
    online: AtomicBool,
    pub response: RwLock<BackendSyncResponse>,
    pub alerts: RwLock<Vec<RemovalAlertPayload>>,
    pub heartbeats: RwLock<Vec<HeartbeatPayload>>,
}

impl RecordingTransport {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
            response: RwLock::new(BackendSyncResponse {
                success: true,
                verified_snapshot: None,
                lock_status: None,
                command: None,
                next_payment: None,
                deactivate_requested: false,
                clearance_confirmed: false,
            }),
            alerts: RwLock::new(Vec::new()),
            heartbeats: RwLock::new(Vec::new()),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

#[async_trait]
impl BackendTransport for RecordingTransport {
    async fn post_heartbeat(
        &self,
        payload: &HeartbeatPayload,
    ) -> Result<BackendSyncResponse, EngineError> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(EngineError::Network {
                message: "offline".to_string(),
            });
        }
        self.heartbeats.write().unwrap().push(payload.clone());
        Ok(self.response.read().unwrap().clone())
    }

    async fn post_removal_alert(&self, alert: &RemovalAlertPayload) -> Result<(), EngineError> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(EngineError::Network {
                message: "offline".to_string(),
            });
        }
        self.alerts.write().unwrap().push(alert.clone());
        Ok(())
    }
}

/// Full engine fixture over software doubles.
pub struct Harness {
    pub engine: TrustEngine,
    pub info: Arc<SoftwareDeviceInfo>,
    pub privileges: Arc<SoftwarePrivilegeController>,
    pub loans: Arc<StaticLoanLedger>,
    pub transport: Arc<RecordingTransport>,
    pub store: Arc<MemoryStore>,
}

impl Harness {
    pub fn new(online: bool) -> Self {
        Self::with_config(online, EngineConfig::default())
    }

    pub fn with_config(online: bool, config: EngineConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let info = Arc::new(SoftwareDeviceInfo::new());
        let privileges = Arc::new(SoftwarePrivilegeController::new());
        let loans = Arc::new(StaticLoanLedger::new(None));
        let transport = Arc::new(RecordingTransport::new(online));

        let engine = TrustEngine::new(
            "dev-0001",
            config,
            Collaborators {
                store: Arc::clone(&store) as Arc<dyn StateStore>,
                info: Arc::clone(&info) as Arc<dyn DeviceInfoProvider>,
                privileges: Arc::clone(&privileges) as Arc<dyn PrivilegeController>,
                probe: Arc::new(SoftwareProtectionProbe::intact()),
                loans: Arc::clone(&loans) as Arc<dyn custos_core::LoanLedger>,
                transport: Arc::clone(&transport) as Arc<dyn BackendTransport>,
            },
        )
        .unwrap();

        Self {
            engine,
            info,
            privileges,
            loans,
            transport,
            store,
        }
    }
}
