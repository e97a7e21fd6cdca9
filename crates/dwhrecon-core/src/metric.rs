//! Run metrics, watermarks and status history
//!
//! Metrics and statuses are append-only records owned by the loading they
//! describe. Storage identity and `created_at` are assigned by whoever
//! persists them.

use crate::error::ModelError;
use crate::value::{format_timestamp, parse_timestamp, Value};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Last processed value of an increment column
///
/// Persisted as text and parsed back losslessly: integers as decimal
/// digits, dates as `YYYY-MM-DD`, timestamps as `YYYY-MM-DDTHH:MM:SS[.f]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Watermark {
    Int(i64),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

impl Watermark {
    /// One unit earlier in the increment domain
    ///
    /// Integers step by one, dates by one day, timestamps by one second.
    /// Saturates at the domain minimum.
    pub fn step_back(&self) -> Self {
        match self {
            Self::Int(i) => Self::Int(i.saturating_sub(1)),
            Self::Date(d) => Self::Date(d.pred_opt().unwrap_or(*d)),
            Self::Timestamp(ts) => Self::Timestamp(
                ts.checked_sub_signed(Duration::seconds(1)).unwrap_or(*ts),
            ),
        }
    }

    /// Read a watermark from an increment column value
    ///
    /// NULL yields `None`. Strings are parsed as persisted watermarks.
    pub fn from_value(value: &Value) -> Result<Option<Self>, ModelError> {
        match value {
            Value::Null => Ok(None),
            Value::Int(i) => Ok(Some(Self::Int(*i))),
            Value::Date(d) => Ok(Some(Self::Date(*d))),
            Value::Timestamp(ts) => Ok(Some(Self::Timestamp(*ts))),
            Value::String(s) => s.parse().map(Some),
            other => Err(ModelError::InvalidWatermark(other.to_string())),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(i) => Value::Int(*i),
            Self::Date(d) => Value::Date(*d),
            Self::Timestamp(ts) => Value::Timestamp(*ts),
        }
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{}", i),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::Timestamp(ts) => write!(f, "{}", format_timestamp(ts)),
        }
    }
}

impl FromStr for Watermark {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        if let Ok(i) = text.parse::<i64>() {
            return Ok(Self::Int(i));
        }
        if let Ok(d) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
            return Ok(Self::Date(d));
        }
        parse_timestamp(text)
            .map(Self::Timestamp)
            .ok_or_else(|| ModelError::InvalidWatermark(s.to_string()))
    }
}

impl TryFrom<String> for Watermark {
    type Error = ModelError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Watermark> for String {
    fn from(w: Watermark) -> Self {
        w.to_string()
    }
}

impl From<i64> for Watermark {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<NaiveDate> for Watermark {
    fn from(d: NaiveDate) -> Self {
        Self::Date(d)
    }
}

impl From<NaiveDateTime> for Watermark {
    fn from(ts: NaiveDateTime) -> Self {
        Self::Timestamp(ts)
    }
}

/// Inclusive crushing-column range covered by one chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkBoundary {
    pub left_boundary: Value,
    pub right_boundary: Value,
}

impl ChunkBoundary {
    pub fn new(left_boundary: Value, right_boundary: Value) -> Self {
        Self {
            left_boundary,
            right_boundary,
        }
    }
}

impl fmt::Display for ChunkBoundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.left_boundary, self.right_boundary)
    }
}

/// Record of one extraction run (or one chunk of it)
///
/// Built once and never mutated; [`LoadingMetric::persisted_at`] returns a
/// stamped copy for the sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadingMetric {
    loading: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_at: Option<NaiveDateTime>,

    /// Aggregate signature of the extracted row set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rows_set_hash: Option<String>,

    records_count: u64,

    /// Highest increment value seen (or the watermark used)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    increment_value: Option<Watermark>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    chunk: Option<ChunkBoundary>,
}

impl LoadingMetric {
    pub fn new(loading: impl Into<String>, records_count: u64) -> Self {
        Self {
            loading: loading.into(),
            created_at: None,
            rows_set_hash: None,
            records_count,
            increment_value: None,
            chunk: None,
        }
    }

    pub fn with_rows_set_hash(mut self, hash: impl Into<String>) -> Self {
        self.rows_set_hash = Some(hash.into());
        self
    }

    pub fn with_increment_value(mut self, value: Option<Watermark>) -> Self {
        self.increment_value = value;
        self
    }

    pub fn with_chunk(mut self, chunk: ChunkBoundary) -> Self {
        self.chunk = Some(chunk);
        self
    }

    /// Copy stamped with the time the sink persisted it
    pub fn persisted_at(&self, created_at: NaiveDateTime) -> Self {
        let mut metric = self.clone();
        metric.created_at = Some(created_at);
        metric
    }

    pub fn loading(&self) -> &str {
        &self.loading
    }

    pub fn created_at(&self) -> Option<NaiveDateTime> {
        self.created_at
    }

    pub fn rows_set_hash(&self) -> Option<&str> {
        self.rows_set_hash.as_deref()
    }

    pub fn records_count(&self) -> u64 {
        self.records_count
    }

    pub fn increment_value(&self) -> Option<Watermark> {
        self.increment_value
    }

    pub fn chunk(&self) -> Option<&ChunkBoundary> {
        self.chunk.as_ref()
    }

    /// Whether this metric describes a single chunk rather than a whole run
    pub fn is_chunk(&self) -> bool {
        self.chunk.is_some()
    }
}

/// State of a loading run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadingStatusKind {
    Created,
    InProgress,
    Failed,
    Completed,
}

impl LoadingStatusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::InProgress => "IN_PROGRESS",
            Self::Failed => "FAILED",
            Self::Completed => "COMPLETED",
        }
    }

    /// Whether a run in this state has finished
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Completed)
    }
}

impl fmt::Display for LoadingStatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Timestamped state marker for a loading
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadingStatus {
    pub loading: String,
    pub status: LoadingStatusKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<NaiveDateTime>,

    /// Error message for failed runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl LoadingStatus {
    pub fn new(loading: impl Into<String>, status: LoadingStatusKind) -> Self {
        Self {
            loading: loading.into(),
            status,
            created_at: None,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Append-only status history of one loading
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusHistory {
    entries: Vec<LoadingStatus>,
}

impl StatusHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, status: LoadingStatus) {
        self.entries.push(status);
    }

    /// Most recent entry
    pub fn current(&self) -> Option<&LoadingStatus> {
        self.entries.last()
    }

    pub fn entries(&self) -> &[LoadingStatus] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
