//! dwhrecon Core
//!
//! Data model for source relations, loadings and reconciliation runs,
//! with stable, versioned types.
//! Never rename error codes - they are part of the public API.

pub mod error;
pub mod value;
pub mod schema;
pub mod system;
pub mod row;
pub mod loading;
pub mod metric;
pub mod reconciliation;
pub mod report;
pub mod config;

pub use error::ModelError;
pub use value::Value;
pub use schema::{
    Column, Constraint, ConstraintKind, LogicalType, Relation, RelationIdentifier, RelationType,
};
pub use system::{DwhRelation, Namespace, SourceSystem};
pub use row::{Row, RowKey, RowSignature};
pub use loading::{ChunkingStrategy, Loading, LoadingDefinition, LoadingKind, LoadingStrategy};
pub use metric::{
    ChunkBoundary, LoadingMetric, LoadingStatus, LoadingStatusKind, StatusHistory, Watermark,
};
pub use reconciliation::{ReconciliationResult, ReconciliationSummary};
pub use report::{ReportError, ReportVersion, RunReport};
pub use config::{CatalogConfig, Config, ConfigError};
