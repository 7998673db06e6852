//! Poll-loop scheduler.
//!
//! One background task per device drives the verification cycle. The
//! interval is re-read from the engine every tick, so cadence raised under
//! escalation takes effect on the next sleep without restarting the task.
//! Shutdown is cooperative through a watch channel; because `apply` is
//! idempotent, a cycle cancelled mid-flight converges when the next run
//! picks up from durable state.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::engine::TrustEngine;

/// Handle to a running poll loop.
pub struct PollerHandle {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl PollerHandle {
    /// Signal shutdown and wait for the loop to finish its current cycle.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            error!(error = %e, "Poll loop join failed");
        }
    }
}

/// Spawn the poll loop for an engine.
pub fn spawn(engine: Arc<TrustEngine>) -> PollerHandle {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(async move {
        info!("Poll loop started");
        loop {
            let interval = engine.current_poll_interval();
            tokio::select! {
                () = tokio::time::sleep(interval) => {
                    match engine.run_cycle().await {
                        Ok(report) => {
                            debug!(
                                severity = %report.status.severity,
                                locked = report.locked,
                                synced = report.synced,
                                "Cycle complete"
                            );
                        },
                        Err(e) => {
                            // Fatal for this cycle only; the next tick
                            // re-reads durable state.
                            error!(error = %e, "Cycle failed");
                        },
                    }
                },
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Poll loop shutting down");
                        break;
                    }
                },
            }
        }
    });

    PollerHandle {
        shutdown_tx,
        handle,
    }
}
