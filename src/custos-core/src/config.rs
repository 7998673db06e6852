//! Configuration for the trust engine.

use std::time::Duration;

/// Configuration for the Custos trust engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Poll interval for the verification cycle under normal conditions.
    pub poll_interval: Duration,
    /// Shortened poll interval while escalation is MEDIUM or above.
    pub raised_poll_interval: Duration,
    /// Time budget for a full snapshot capture.
    pub snapshot_budget: Duration,
    /// Per-call timeout for privilege and network calls.
    pub call_timeout: Duration,
    /// Maximum queued alerts retained while offline.
    pub alert_queue_cap: usize,
    /// Maximum audit entries retained locally.
    pub audit_cap: usize,
    /// PIN attempts allowed before a lock becomes PIN-exhausted.
    pub pin_max_attempts: u32,
    /// Days before the due date at which a SOFT payment reminder lock arms.
    pub due_soon_days: u32,
    /// Overdue days at which an OVERDUE loan is treated as defaulted.
    pub default_threshold_days: u32,
    /// Window within which an identical incident is not double-counted.
    pub dedup_window: Duration,
    /// Backend base URL.
    pub backend_url: String,
    /// Device-agent API key presented to the backend.
    pub api_key: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            raised_poll_interval: Duration::from_secs(15),
            snapshot_budget: Duration::from_millis(800),
            call_timeout: Duration::from_secs(5),
            alert_queue_cap: 100,
            audit_cap: 4096,
            pin_max_attempts: 3,
            due_soon_days: 3,
            default_threshold_days: 30,
            dedup_window: Duration::from_secs(120),
            backend_url: "https://api.custos-security.io".into(),
            api_key: None,
        }
    }
}
