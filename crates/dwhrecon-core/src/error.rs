//! Model validation errors
//!
//! IMPORTANT: Error codes are versioned and stable.
//! NEVER rename or remove codes - they appear in run reports and are
//! matched on by orchestration layers. Add new codes with new names only.

/// Errors raised while building or validating model objects
///
/// All of these are construction-time failures: they are reported before
/// any row is read from a source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// Relation has no usable primary key to reconcile on
    #[error("Relation '{relation}' has no primary key constraint to use as identity key")]
    MissingIdentityColumn { relation: String },

    /// Relation declares more than one primary key
    #[error("Relation '{relation}' declares more than one primary key ('{first}' and '{second}')")]
    MultiplePrimaryKeys {
        relation: String,
        first: String,
        second: String,
    },

    /// A constraint, loading or chunking strategy names a column the relation lacks
    #[error("Relation '{relation}' has no column '{column}'")]
    UnknownColumn { relation: String, column: String },

    /// A column name appears twice in one relation
    #[error("Relation '{relation}' declares column '{column}' more than once")]
    DuplicateColumn { relation: String, column: String },

    /// An INCREMENTAL loading was declared without an increment column
    #[error("Incremental loading '{loading}' has no increment attribute")]
    IncrementalLoadingMustHaveAnIncrementAttribute { loading: String },

    /// Chunked loading with a zero chunk size
    #[error("Chunk size for loading '{loading}' must be greater than zero")]
    InvalidChunkSize { loading: String },

    /// A raw value could not be coerced to the column's logical type
    #[error("Cannot read {value} as {expected} for column '{column}'")]
    InvalidValue {
        column: String,
        expected: String,
        value: String,
    },

    /// A relation identifier string is not `system.namespace.relation`
    #[error("Invalid relation identifier '{0}' (expected system.namespace.relation)")]
    InvalidIdentifier(String),

    /// A persisted watermark could not be parsed back
    #[error("Invalid watermark '{0}'")]
    InvalidWatermark(String),
}

impl ModelError {
    /// Stable string identifier for this error kind
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingIdentityColumn { .. } => "MISSING_IDENTITY_COLUMN",
            Self::MultiplePrimaryKeys { .. } => "MULTIPLE_PRIMARY_KEYS",
            Self::UnknownColumn { .. } => "UNKNOWN_COLUMN",
            Self::DuplicateColumn { .. } => "DUPLICATE_COLUMN",
            Self::IncrementalLoadingMustHaveAnIncrementAttribute { .. } => {
                "INCREMENTAL_LOADING_MUST_HAVE_AN_INCREMENT_ATTRIBUTE"
            }
            Self::InvalidChunkSize { .. } => "INVALID_CHUNK_SIZE",
            Self::InvalidValue { .. } => "INVALID_VALUE",
            Self::InvalidIdentifier(_) => "INVALID_IDENTIFIER",
            Self::InvalidWatermark(_) => "INVALID_WATERMARK",
        }
    }
}
