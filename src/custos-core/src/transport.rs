//! Backend transport.
//!
//! The HTTP layer below this trait (retries, TLS, certificate handling) is
//! an external concern; the engine only needs request/response with typed
//! failures it can queue around. The default implementation is a thin
//! reqwest client.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::types::{BackendSyncResponse, HeartbeatPayload, RemovalAlertPayload};

/// Transport to the device-management backend.
#[async_trait]
pub trait BackendTransport: Send + Sync {
    /// Post a heartbeat and return the backend's response.
    async fn post_heartbeat(
        &self,
        payload: &HeartbeatPayload,
    ) -> Result<BackendSyncResponse, EngineError>;

    /// Post a removal/tamper alert.
    async fn post_removal_alert(&self, alert: &RemovalAlertPayload) -> Result<(), EngineError>;
}

/// HTTP transport over reqwest.
pub struct HttpBackendTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpBackendTransport {
    /// Create a transport for the given backend.
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: std::time::Duration,
    ) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("custos-agent/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| EngineError::Config {
                message: format!("http client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.post(format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            builder = builder.header("X-Device-Api-Key", key);
        }
        builder
    }
}

#[async_trait]
impl BackendTransport for HttpBackendTransport {
    async fn post_heartbeat(
        &self,
        payload: &HeartbeatPayload,
    ) -> Result<BackendSyncResponse, EngineError> {
        let path = format!("/v1/devices/{}/heartbeat", payload.device_id);
        debug!(device_id = %payload.device_id, "Posting heartbeat");

        let response = self
            .request(&path)
            .json(payload)
            .send()
            .await
            .map_err(|e| EngineError::Network {
                message: format!("heartbeat: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "Heartbeat rejected");
            return Err(EngineError::Network {
                message: format!("heartbeat status {status}"),
            });
        }

        response
            .json::<BackendSyncResponse>()
            .await
            .map_err(|e| EngineError::Network {
                message: format!("heartbeat body: {e}"),
            })
    }

    async fn post_removal_alert(&self, alert: &RemovalAlertPayload) -> Result<(), EngineError> {
        let path = format!("/v1/devices/{}/removal-alerts", alert.device_id);
        debug!(
            device_id = %alert.device_id,
            attempt = alert.attempt_number,
            "Posting removal alert"
        );

        let response = self
            .request(&path)
            .json(alert)
            .send()
            .await
            .map_err(|e| EngineError::Network {
                message: format!("removal alert: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Network {
                message: format!("removal alert status {status}"),
            });
        }

        Ok(())
    }
}
