//! Run report schema (stable v1)
//!
//! This schema is STABLE and VERSIONED.
//! Breaking changes require a new version.

use crate::loading::LoadingKind;
use crate::metric::{LoadingStatusKind, Watermark};
use crate::reconciliation::{ReconciliationResult, ReconciliationSummary};
use serde::{Deserialize, Serialize};

/// Report schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportVersion {
    /// Major version (breaking changes)
    pub major: u32,

    /// Minor version (backward-compatible additions)
    pub minor: u32,
}

impl ReportVersion {
    /// Current report schema version
    pub const CURRENT: ReportVersion = ReportVersion { major: 1, minor: 0 };
}

impl std::fmt::Display for ReportVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Failure details of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportError {
    /// Stable SCREAMING_SNAKE error code
    pub code: String,

    /// Human-readable message with context
    pub message: String,
}

/// Reconciliation run report (report.json v1)
///
/// This is the stable output format.
/// All fields are versioned and backward-compatible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Schema version
    pub version: ReportVersion,

    /// Timestamp (ISO 8601)
    pub timestamp: String,

    /// Loading name
    pub loading: String,

    /// Extraction mode
    pub strategy: LoadingKind,

    /// Watermark the new side was extracted from (after any overlap step)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watermark: Option<Watermark>,

    /// Final status of the run
    pub status: LoadingStatusKind,

    /// Counts per partition
    pub summary: ReconciliationSummary,

    /// Rows read from the new side
    pub records_count: u64,

    /// Aggregate signature of the new row set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows_set_hash: Option<String>,

    /// Number of chunks reconciled (0 when unchunked)
    #[serde(default)]
    pub chunks: usize,

    /// Failure details, present only for failed runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ReportError>,

    /// Full key partitions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ReconciliationResult>,
}

impl RunReport {
    /// Create a report for a run that has not produced anything yet
    pub fn new(loading: impl Into<String>, strategy: LoadingKind) -> Self {
        Self {
            version: ReportVersion::CURRENT,
            timestamp: chrono::Utc::now().to_rfc3339(),
            loading: loading.into(),
            strategy,
            watermark: None,
            status: LoadingStatusKind::Created,
            summary: ReconciliationSummary::default(),
            records_count: 0,
            rows_set_hash: None,
            chunks: 0,
            error: None,
            result: None,
        }
    }

    /// Mark the run completed with its result
    pub fn completed(mut self, result: ReconciliationResult) -> Self {
        self.status = LoadingStatusKind::Completed;
        self.summary = result.summary();
        self.result = Some(result);
        self.error = None;
        self
    }

    /// Mark the run failed
    pub fn failed(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.status = LoadingStatusKind::Failed;
        self.error = Some(ReportError {
            code: code.into(),
            message: message.into(),
        });
        self
    }

    /// Check if the run failed
    pub fn has_errors(&self) -> bool {
        self.status == LoadingStatusKind::Failed
    }

    /// Drop the key lists, keeping only counts
    pub fn without_keys(mut self) -> Self {
        self.result = None;
        self
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Save to file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let json = self.to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(path, json)
    }
}
