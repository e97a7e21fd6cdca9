//! Metric and status sink
//!
//! The engine hands each finished run to a [`RunRecorder`] exactly once and
//! reads prior metrics back from it to plan watermarks. Where the records
//! end up (warehouse tables, files, memory) is the recorder's business.

use chrono::{NaiveDateTime, Utc};
use dwhrecon_core::{LoadingMetric, LoadingStatus, LoadingStatusKind, StatusHistory};
use std::collections::HashMap;
use std::sync::RwLock;

/// Sink failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    /// The backing store could not be read or written
    #[error("Storage error: {0}")]
    Storage(String),

    /// The outcome was refused (e.g. metrics for a failed run)
    #[error("Outcome of loading '{loading}' rejected: {reason}")]
    Rejected { loading: String, reason: String },
}

impl RecordError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Rejected { .. } => "RECORD_REJECTED",
        }
    }
}

/// Everything a finished run leaves behind
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub loading: String,

    /// Statuses in the order they were reached, the last one terminal
    pub statuses: Vec<LoadingStatus>,

    /// Run metric first, then one metric per chunk; empty for failed runs
    pub metrics: Vec<LoadingMetric>,
}

impl RunOutcome {
    pub fn completed(loading: impl Into<String>, metrics: Vec<LoadingMetric>) -> Self {
        let loading = loading.into();
        Self {
            statuses: vec![
                LoadingStatus::new(loading.clone(), LoadingStatusKind::InProgress),
                LoadingStatus::new(loading.clone(), LoadingStatusKind::Completed),
            ],
            loading,
            metrics,
        }
    }

    pub fn failed(loading: impl Into<String>, message: impl Into<String>) -> Self {
        let loading = loading.into();
        Self {
            statuses: vec![
                LoadingStatus::new(loading.clone(), LoadingStatusKind::InProgress),
                LoadingStatus::new(loading.clone(), LoadingStatusKind::Failed)
                    .with_message(message),
            ],
            loading,
            metrics: Vec::new(),
        }
    }

    /// Terminal status of the run
    pub fn final_status(&self) -> Option<LoadingStatusKind> {
        self.statuses.last().map(|s| s.status)
    }

    pub fn is_completed(&self) -> bool {
        self.final_status() == Some(LoadingStatusKind::Completed)
    }
}

/// Consumer of run outcomes and supplier of prior metrics
pub trait RunRecorder: Send + Sync {
    /// Persist one finished run
    fn record(&self, outcome: RunOutcome) -> Result<(), RecordError>;

    /// Metrics of prior successful runs of a loading, oldest first
    fn metrics(&self, loading: &str) -> Result<Vec<LoadingMetric>, RecordError>;
}

#[derive(Debug, Default)]
struct LoadingHistory {
    metrics: Vec<LoadingMetric>,
    statuses: StatusHistory,
}

/// Append-only in-memory recorder
///
/// Stamps `created_at` on everything it stores.
#[derive(Debug, Default)]
pub struct InMemoryRecorder {
    histories: RwLock<HashMap<String, LoadingHistory>>,
    outcomes: RwLock<Vec<RunOutcome>>,
    refuse: bool,
}

impl InMemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed metrics from earlier runs (e.g. read from a file)
    pub fn with_metrics(self, metrics: Vec<LoadingMetric>) -> Self {
        if let Ok(mut histories) = self.histories.write() {
            let now = Self::now();
            for metric in metrics {
                let stamped = match metric.created_at() {
                    Some(_) => metric,
                    None => metric.persisted_at(now),
                };
                histories
                    .entry(stamped.loading().to_string())
                    .or_default()
                    .metrics
                    .push(stamped);
            }
        }
        self
    }

    /// Refuse every outcome, to exercise sink failures
    pub fn refusing(mut self) -> Self {
        self.refuse = true;
        self
    }

    /// Register a loading, appending a CREATED status
    pub fn register(&self, loading: &str) {
        if let Ok(mut histories) = self.histories.write() {
            let mut status = LoadingStatus::new(loading, LoadingStatusKind::Created);
            status.created_at = Some(Self::now());
            histories.entry(loading.to_string()).or_default().statuses.push(status);
        }
    }

    /// Most recent status of a loading
    pub fn current_status(&self, loading: &str) -> Option<LoadingStatus> {
        self.histories
            .read()
            .ok()?
            .get(loading)?
            .statuses
            .current()
            .cloned()
    }

    /// Full status history of a loading
    pub fn history(&self, loading: &str) -> StatusHistory {
        self.histories
            .read()
            .ok()
            .and_then(|h| h.get(loading).map(|h| h.statuses.clone()))
            .unwrap_or_default()
    }

    /// Every outcome recorded so far, in order
    pub fn outcomes(&self) -> Vec<RunOutcome> {
        self.outcomes.read().map(|o| o.clone()).unwrap_or_default()
    }

    fn now() -> NaiveDateTime {
        Utc::now().naive_utc()
    }
}

impl RunRecorder for InMemoryRecorder {
    fn record(&self, outcome: RunOutcome) -> Result<(), RecordError> {
        if self.refuse {
            return Err(RecordError::Rejected {
                loading: outcome.loading,
                reason: "recorder is refusing outcomes".to_string(),
            });
        }
        if !outcome.is_completed() && !outcome.metrics.is_empty() {
            return Err(RecordError::Rejected {
                loading: outcome.loading,
                reason: "metrics of an unsuccessful run".to_string(),
            });
        }

        let now = Self::now();
        {
            let mut histories = self
                .histories
                .write()
                .map_err(|e| RecordError::Storage(e.to_string()))?;
            let history = histories.entry(outcome.loading.clone()).or_default();

            for status in &outcome.statuses {
                let mut status = status.clone();
                status.created_at = Some(now);
                history.statuses.push(status);
            }
            history
                .metrics
                .extend(outcome.metrics.iter().map(|m| m.persisted_at(now)));
        }

        tracing::debug!(
            loading = %outcome.loading,
            status = ?outcome.final_status(),
            metrics = outcome.metrics.len(),
            "recorded run outcome"
        );

        self.outcomes
            .write()
            .map_err(|e| RecordError::Storage(e.to_string()))?
            .push(outcome);
        Ok(())
    }

    fn metrics(&self, loading: &str) -> Result<Vec<LoadingMetric>, RecordError> {
        let histories = self
            .histories
            .read()
            .map_err(|e| RecordError::Storage(e.to_string()))?;
        Ok(histories
            .get(loading)
            .map(|h| h.metrics.clone())
            .unwrap_or_default())
    }
}
