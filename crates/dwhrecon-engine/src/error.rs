//! Reconciliation errors
//!
//! Codes follow the same rule as the model codes: stable, never renamed.

use dwhrecon_catalog::FetchError;
use dwhrecon_core::{ModelError, RowKey};
use std::fmt;

/// Which input of a reconciliation a row came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Previously loaded rows (the warehouse copy)
    Old,
    /// Freshly extracted rows (the source system)
    New,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Old => write!(f, "old"),
            Self::New => write!(f, "new"),
        }
    }
}

/// Failure of a reconciliation run
///
/// None of these leave a partial result behind.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReconcileError {
    /// Invalid relation or loading, detected before reading
    #[error(transparent)]
    Model(#[from] ModelError),

    /// A cursor went backwards in key order
    #[error(
        "{side} rows of '{relation}' are not sorted by identity key: {current} after {previous}"
    )]
    UnsortedInput {
        relation: String,
        side: Side,
        previous: RowKey,
        current: RowKey,
    },

    /// The same key appeared twice in one input
    #[error("Duplicate key {key} in {side} rows of '{relation}'")]
    DuplicateKey {
        relation: String,
        side: Side,
        key: RowKey,
    },

    /// A row lacks a value for an identity column
    #[error("A {side} row of '{relation}' has no value for identity column '{column}'")]
    MissingKeyValue {
        relation: String,
        side: Side,
        column: String,
    },

    /// The metadata provider could not describe the relation
    #[error("Failed to fetch metadata of '{relation}': {source}")]
    Metadata {
        relation: String,
        source: FetchError,
    },

    /// A row source failed to open or advance a cursor
    #[error("Failed to read {side} rows of '{relation}': {source}")]
    Source {
        relation: String,
        side: Side,
        source: FetchError,
    },

    /// The metric/status sink refused the run outcome
    #[error("Failed to record run of loading '{loading}': {message}")]
    Record { loading: String, message: String },
}

impl ReconcileError {
    /// Stable string identifier for this error kind
    pub fn code(&self) -> &'static str {
        match self {
            Self::Model(e) => e.code(),
            Self::UnsortedInput { .. } => "UNSORTED_INPUT",
            Self::DuplicateKey { .. } => "DUPLICATE_KEY",
            Self::MissingKeyValue { .. } => "MISSING_KEY_VALUE",
            Self::Metadata { source, .. } => source.code(),
            Self::Source { source, .. } => source.code(),
            Self::Record { .. } => "RECORD_FAILED",
        }
    }

    /// Whether the failure points at the data rather than the setup
    pub fn is_data_integrity(&self) -> bool {
        matches!(
            self,
            Self::UnsortedInput { .. } | Self::DuplicateKey { .. } | Self::MissingKeyValue { .. }
        )
    }
}
