//! Offline alert queue.
//!
//! Alerts are appended durably before any network attempt, so a crash
//! between detection and delivery loses nothing. `drain` delivers in FIFO
//! order and stops at the first failure to preserve ordering. Retention is
//! bounded: past the cap the oldest entries are pruned, and every prune is
//! recorded as a LOW-severity audit entry noting the loss.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::audit::{AuditKind, AuditLog, AuditSeverity};
use crate::error::EngineError;
use crate::store::{self, keys, StateStore};
use crate::transport::BackendTransport;
use crate::types::RemovalAlertPayload;

/// An alert waiting for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedAlert {
    /// The alert payload.
    pub payload: RemovalAlertPayload,
    /// When the alert was queued (Unix seconds).
    pub queued_at: i64,
    /// When the alert was delivered, once it has been.
    pub delivered_at: Option<i64>,
}

/// Durable FIFO queue of outbound alerts for one device.
pub struct OfflineAlertQueue {
    store: Arc<dyn StateStore>,
    audit: Arc<AuditLog>,
    device_id: String,
    cap: usize,
}

impl OfflineAlertQueue {
    /// Create a queue for one device.
    pub fn new(
        store: Arc<dyn StateStore>,
        audit: Arc<AuditLog>,
        device_id: &str,
        cap: usize,
    ) -> Self {
        Self {
            store,
            audit,
            device_id: device_id.to_string(),
            cap,
        }
    }

    fn load(&self) -> Result<Vec<QueuedAlert>, EngineError> {
        Ok(store::load_json(self.store.as_ref(), &keys::alert_queue(&self.device_id))?
            .unwrap_or_default())
    }

    fn save(&self, alerts: &[QueuedAlert]) -> Result<(), EngineError> {
        store::save_json(
            self.store.as_ref(),
            &keys::alert_queue(&self.device_id),
            &alerts,
        )
    }

    /// Append an alert durably.
    ///
    /// Pruning happens here, before the write: the queue never exceeds the
    /// retention cap on disk.
    #[instrument(skip(self, payload), fields(device_id = %self.device_id))]
    pub fn enqueue(&self, payload: RemovalAlertPayload) -> Result<(), EngineError> {
        let mut alerts = self.load()?;

        alerts.push(QueuedAlert {
            payload,
            queued_at: chrono::Utc::now().timestamp(),
            delivered_at: None,
        });

        if alerts.len() > self.cap {
            let dropped = alerts.len() - self.cap;
            alerts.drain(..dropped);
            warn!(dropped = dropped, "Alert queue over cap, oldest pruned");
            self.audit.append_soft(
                AuditKind::QueuePruned,
                AuditSeverity::Low,
                format!("{dropped} queued alert(s) pruned past retention cap"),
            );
        }

        self.save(&alerts)?;
        debug!(depth = alerts.len(), "Alert queued");
        Ok(())
    }

    /// Number of undelivered alerts.
    pub fn pending(&self) -> Result<usize, EngineError> {
        Ok(self
            .load()?
            .iter()
            .filter(|a| a.delivered_at.is_none())
            .count())
    }

    /// Attempt delivery in FIFO order.
    ///
    /// Stops at the first failure; the failed alert and everything behind
    /// it stay queued. Each delivery is marked `delivered_at` and persisted
    /// before moving on, so a crash mid-drain never resends what already
    /// went out.
    #[instrument(skip(self, transport), fields(device_id = %self.device_id))]
    pub async fn drain(&self, transport: &dyn BackendTransport) -> Result<usize, EngineError> {
        let mut alerts = self.load()?;
        if alerts.is_empty() {
            return Ok(0);
        }

        let mut delivered = 0usize;
        let mut idx = 0usize;
        while idx < alerts.len() {
            if alerts[idx].delivered_at.is_some() {
                idx += 1;
                continue;
            }
            match transport.post_removal_alert(&alerts[idx].payload).await {
                Ok(()) => {
                    alerts[idx].delivered_at = Some(chrono::Utc::now().timestamp());
                    delivered += 1;
                    self.save(&alerts)?;
                    idx += 1;
                },
                Err(e) => {
                    debug!(error = %e, delivered = delivered, "Drain stopped at first failure");
                    break;
                },
            }
        }

        // Delivered entries have served their purpose; drop them.
        alerts.retain(|a| a.delivered_at.is_none());
        self.save(&alerts)?;

        if delivered > 0 {
            info!(delivered = delivered, remaining = alerts.len(), "Alerts drained");
        }
        Ok(delivered)
    }
}
