//! Tamper severity classification.
//!
//! Severity is monotonic per evaluation: the classified severity of a cycle
//! is the maximum severity across its findings, never an average. An empty
//! finding list always classifies as `None`.

use serde::{Deserialize, Serialize};

use crate::comparison::Finding;

/// Ordinal tamper severity.
///
/// Ordering is `None < Low < Medium < High < Critical`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TamperSeverity {
    /// No deviation detected.
    #[default]
    None,
    /// Cosmetic deviation, record only.
    Low,
    /// Deviation worth alerting on (debug flags, inventory drift).
    Medium,
    /// Security posture compromised (root, bootloader, custom ROM).
    High,
    /// Device identity changed - hardware swap or clone.
    Critical,
}

impl TamperSeverity {
    /// Whether this severity counts as an incident for the escalation
    /// counter.
    #[must_use]
    pub fn is_incident(&self) -> bool {
        *self >= Self::Low
    }

    /// Whether this severity raises monitoring cadence.
    #[must_use]
    pub fn raises_cadence(&self) -> bool {
        *self >= Self::Medium
    }

    /// Stable lowercase name for flags and audit messages.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for TamperSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregated result of one verification cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TamperStatus {
    /// Whether any finding was produced.
    pub is_tampered: bool,

    /// Maximum severity across all findings.
    pub severity: TamperSeverity,

    /// Stable field slugs of the fields that deviated.
    pub flags: Vec<String>,

    /// Unix timestamp of the evaluation.
    pub timestamp: i64,
}

impl TamperStatus {
    /// A clean status with no findings.
    #[must_use]
    pub fn clean(timestamp: i64) -> Self {
        Self {
            is_tampered: false,
            severity: TamperSeverity::None,
            flags: Vec::new(),
            timestamp,
        }
    }
}

/// Classifies finding lists into an overall [`TamperStatus`].
pub struct SeverityClassifier;

impl SeverityClassifier {
    /// Classify a finding list.
    ///
    /// Severity is the maximum over all findings; `None` iff the list is
    /// empty.
    #[must_use]
    pub fn classify(findings: &[Finding], timestamp: i64) -> TamperStatus {
        if findings.is_empty() {
            return TamperStatus::clean(timestamp);
        }

        let severity = findings
            .iter()
            .map(|f| f.severity)
            .max()
            .unwrap_or(TamperSeverity::None);

        TamperStatus {
            is_tampered: true,
            severity,
            flags: findings.iter().map(|f| f.field.slug().to_string()).collect(),
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparison::{FindingCategory, SnapshotField};

    fn make_finding(field: SnapshotField, severity: TamperSeverity) -> Finding {
        Finding {
            field,
            category: FindingCategory::Security,
            old_value: "false".to_string(),
            new_value: "true".to_string(),
            severity,
        }
    }

    #[test]
    fn test_empty_findings_classify_none() {
        let status = SeverityClassifier::classify(&[], 1_700_000_000);
        assert!(!status.is_tampered);
        assert_eq!(status.severity, TamperSeverity::None);
        assert!(status.flags.is_empty());
    }

    #[test]
    fn test_max_severity_wins() {
        let findings = vec![
            make_finding(SnapshotField::UsbDebugging, TamperSeverity::Medium),
            make_finding(SnapshotField::Rooted, TamperSeverity::High),
            make_finding(SnapshotField::DeveloperMode, TamperSeverity::Medium),
        ];

        let status = SeverityClassifier::classify(&findings, 1_700_000_000);
        assert!(status.is_tampered);
        assert_eq!(status.severity, TamperSeverity::High);
        assert_eq!(status.flags.len(), 3);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(TamperSeverity::None < TamperSeverity::Low);
        assert!(TamperSeverity::Low < TamperSeverity::Medium);
        assert!(TamperSeverity::Medium < TamperSeverity::High);
        assert!(TamperSeverity::High < TamperSeverity::Critical);
    }
}
