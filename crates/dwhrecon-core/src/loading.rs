//! Loading definitions: what to copy and how to extract it

use crate::error::ModelError;
use crate::schema::{Relation, RelationIdentifier};
use crate::system::DwhRelation;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Extraction mode without its parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadingKind {
    #[default]
    Snapshot,
    Incremental,
}

impl fmt::Display for LoadingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Snapshot => write!(f, "SNAPSHOT"),
            Self::Incremental => write!(f, "INCREMENTAL"),
        }
    }
}

/// How each run extracts the source relation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LoadingStrategy {
    /// Re-extract the full relation every run
    Snapshot,

    /// Extract rows whose increment column is at or above the last watermark
    Incremental {
        increment_column: String,

        /// Step the watermark back by one unit to re-read the boundary
        is_overlapping: bool,
    },
}

impl LoadingStrategy {
    pub fn kind(&self) -> LoadingKind {
        match self {
            Self::Snapshot => LoadingKind::Snapshot,
            Self::Incremental { .. } => LoadingKind::Incremental,
        }
    }

    pub fn increment_column(&self) -> Option<&str> {
        match self {
            Self::Snapshot => None,
            Self::Incremental { increment_column, .. } => Some(increment_column),
        }
    }

    pub fn is_overlapping(&self) -> bool {
        matches!(self, Self::Incremental { is_overlapping: true, .. })
    }
}

/// Split extraction into ordered ranges of the crushing column
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkingStrategy {
    crushing_column: String,
    chunk_size: usize,
}

impl ChunkingStrategy {
    /// Create a chunking strategy; `chunk_size` counts distinct column values
    pub fn new(
        loading: &str,
        crushing_column: impl Into<String>,
        chunk_size: usize,
    ) -> Result<Self, ModelError> {
        if chunk_size == 0 {
            return Err(ModelError::InvalidChunkSize {
                loading: loading.to_string(),
            });
        }
        Ok(Self {
            crushing_column: crushing_column.into(),
            chunk_size,
        })
    }

    pub fn crushing_column(&self) -> &str {
        &self.crushing_column
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

/// A configured copy of one source relation into the warehouse
///
/// Only constructible through [`Loading::snapshot`] and
/// [`Loading::incremental`], so an incremental loading without an
/// increment column cannot exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LoadingDefinition", into = "LoadingDefinition")]
pub struct Loading {
    name: String,
    source: RelationIdentifier,
    destination: DwhRelation,
    strategy: LoadingStrategy,
    has_to_hash: bool,
    has_to_order_by_pk: bool,
    excluded_columns: Vec<String>,
    chunking: Option<ChunkingStrategy>,
}

impl Loading {
    /// Create a snapshot loading
    pub fn snapshot(
        name: impl Into<String>,
        source: RelationIdentifier,
        destination: DwhRelation,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            destination,
            strategy: LoadingStrategy::Snapshot,
            has_to_hash: true,
            has_to_order_by_pk: true,
            excluded_columns: Vec::new(),
            chunking: None,
        }
    }

    /// Create an incremental loading
    ///
    /// Fails with `IncrementalLoadingMustHaveAnIncrementAttribute` when no
    /// (or a blank) increment column is given.
    pub fn incremental(
        name: impl Into<String>,
        source: RelationIdentifier,
        destination: DwhRelation,
        increment_column: Option<&str>,
        is_overlapping: bool,
    ) -> Result<Self, ModelError> {
        let name = name.into();
        let increment_column = match increment_column.map(str::trim) {
            Some(column) if !column.is_empty() => column.to_string(),
            _ => {
                return Err(ModelError::IncrementalLoadingMustHaveAnIncrementAttribute {
                    loading: name,
                })
            }
        };

        let mut loading = Self::snapshot(name, source, destination);
        loading.strategy = LoadingStrategy::Incremental {
            increment_column,
            is_overlapping,
        };
        Ok(loading)
    }

    /// Exclude columns (e.g. audit timestamps) from the row signature
    pub fn with_excluded_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_columns.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Attach a chunking strategy
    pub fn with_chunking(mut self, chunking: ChunkingStrategy) -> Self {
        self.chunking = Some(chunking);
        self
    }

    /// Whether runs record an aggregate hash of the extracted row set
    pub fn with_hashing(mut self, has_to_hash: bool) -> Self {
        self.has_to_hash = has_to_hash;
        self
    }

    pub fn with_order_by_pk(mut self, has_to_order_by_pk: bool) -> Self {
        self.has_to_order_by_pk = has_to_order_by_pk;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &RelationIdentifier {
        &self.source
    }

    pub fn destination(&self) -> &DwhRelation {
        &self.destination
    }

    pub fn strategy(&self) -> &LoadingStrategy {
        &self.strategy
    }

    pub fn has_to_hash(&self) -> bool {
        self.has_to_hash
    }

    pub fn has_to_order_by_pk(&self) -> bool {
        self.has_to_order_by_pk
    }

    pub fn excluded_columns(&self) -> &[String] {
        &self.excluded_columns
    }

    pub fn chunking(&self) -> Option<&ChunkingStrategy> {
        self.chunking.as_ref()
    }

    /// Check that every column this loading names exists in `relation`
    pub fn validate_against(&self, relation: &Relation) -> Result<(), ModelError> {
        if let Some(column) = self.strategy.increment_column() {
            relation.require_column(column)?;
        }
        for column in &self.excluded_columns {
            relation.require_column(column)?;
        }
        if let Some(chunking) = &self.chunking {
            relation.require_column(chunking.crushing_column())?;
        }
        Ok(())
    }
}

/// Where a loading writes: either a bare warehouse name or the full record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DestinationDefinition {
    Fqn(String),
    Relation(DwhRelation),
}

impl From<DestinationDefinition> for DwhRelation {
    fn from(def: DestinationDefinition) -> Self {
        match def {
            DestinationDefinition::Fqn(fqn) => DwhRelation::new(fqn),
            DestinationDefinition::Relation(relation) => relation,
        }
    }
}

/// Chunking settings as written in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkDefinition {
    /// Crushing column
    pub column: String,

    /// Distinct values per chunk; falls back to the configured default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
}

/// Unvalidated, flat form of a [`Loading`] (the `[[loadings]]` table)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadingDefinition {
    pub name: String,
    pub source: RelationIdentifier,
    pub destination: DestinationDefinition,

    #[serde(default)]
    pub strategy: LoadingKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub increment_column: Option<String>,

    #[serde(default)]
    pub is_overlapping: bool,

    #[serde(default = "default_true")]
    pub has_to_hash: bool,

    #[serde(default = "default_true")]
    pub has_to_order_by_pk: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk: Option<ChunkDefinition>,
}

fn default_true() -> bool {
    true
}

impl LoadingDefinition {
    /// Validate into a [`Loading`], using `default_chunk_size` for chunk
    /// definitions without an explicit size
    pub fn into_loading(self, default_chunk_size: Option<usize>) -> Result<Loading, ModelError> {
        let destination = DwhRelation::from(self.destination);
        let loading = match self.strategy {
            LoadingKind::Snapshot => Loading::snapshot(&self.name, self.source, destination),
            LoadingKind::Incremental => Loading::incremental(
                &self.name,
                self.source,
                destination,
                self.increment_column.as_deref(),
                self.is_overlapping,
            )?,
        };

        let mut loading = loading
            .with_hashing(self.has_to_hash)
            .with_order_by_pk(self.has_to_order_by_pk)
            .with_excluded_columns(self.exclude);

        if let Some(chunk) = self.chunk {
            let size = chunk.size.or(default_chunk_size).unwrap_or(0);
            loading = loading.with_chunking(ChunkingStrategy::new(&self.name, chunk.column, size)?);
        }

        Ok(loading)
    }
}

impl TryFrom<LoadingDefinition> for Loading {
    type Error = ModelError;

    fn try_from(def: LoadingDefinition) -> Result<Self, Self::Error> {
        def.into_loading(None)
    }
}

impl From<Loading> for LoadingDefinition {
    fn from(loading: Loading) -> Self {
        let (increment_column, is_overlapping) = match loading.strategy {
            LoadingStrategy::Snapshot => (None, false),
            LoadingStrategy::Incremental { increment_column, is_overlapping } => {
                (Some(increment_column), is_overlapping)
            }
        };
        let strategy = if increment_column.is_some() {
            LoadingKind::Incremental
        } else {
            LoadingKind::Snapshot
        };

        Self {
            name: loading.name,
            source: loading.source,
            destination: DestinationDefinition::Relation(loading.destination),
            strategy,
            increment_column,
            is_overlapping,
            has_to_hash: loading.has_to_hash,
            has_to_order_by_pk: loading.has_to_order_by_pk,
            exclude: loading.excluded_columns,
            chunk: loading.chunking.map(|c| ChunkDefinition {
                column: c.crushing_column,
                size: Some(c.chunk_size),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, Constraint, LogicalType};

    fn source() -> RelationIdentifier {
        RelationIdentifier::new("crm", "public", "orders")
    }

    fn destination() -> DwhRelation {
        DwhRelation::new("dwh.raw.orders")
    }

    #[test]
    fn incremental_requires_increment_column() {
        let err = Loading::incremental("orders_inc", source(), destination(), None, false)
            .unwrap_err();
        assert_eq!(
            err,
            ModelError::IncrementalLoadingMustHaveAnIncrementAttribute {
                loading: "orders_inc".to_string()
            }
        );

        let err = Loading::incremental("orders_inc", source(), destination(), Some("  "), false)
            .unwrap_err();
        assert_eq!(err.code(), "INCREMENTAL_LOADING_MUST_HAVE_AN_INCREMENT_ATTRIBUTE");
    }

    #[test]
    fn incremental_strategy_accessors() {
        let loading =
            Loading::incremental("orders_inc", source(), destination(), Some("updated_at"), true)
                .unwrap();

        assert_eq!(loading.strategy().kind(), LoadingKind::Incremental);
        assert_eq!(loading.strategy().increment_column(), Some("updated_at"));
        assert!(loading.strategy().is_overlapping());
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let err = ChunkingStrategy::new("orders", "id", 0).unwrap_err();
        assert_eq!(err.code(), "INVALID_CHUNK_SIZE");
    }

    #[test]
    fn validate_against_relation() {
        let relation = Relation::new(
            source(),
            vec![
                Column::new("id", 1, LogicalType::Int),
                Column::new("updated_at", 2, LogicalType::Timestamp),
            ],
            vec![Constraint::primary_key("pk", &["id"])],
        )
        .unwrap();

        let ok = Loading::incremental("a", source(), destination(), Some("updated_at"), false)
            .unwrap();
        assert!(ok.validate_against(&relation).is_ok());

        let bad = Loading::incremental("b", source(), destination(), Some("modified"), false)
            .unwrap();
        assert_eq!(bad.validate_against(&relation).unwrap_err().code(), "UNKNOWN_COLUMN");

        let bad_exclude = Loading::snapshot("c", source(), destination())
            .with_excluded_columns(["etl_loaded_at"]);
        assert!(bad_exclude.validate_against(&relation).is_err());
    }

    #[test]
    fn definition_without_increment_column_fails() {
        let json = r#"{
            "name": "orders_inc",
            "source": "crm.public.orders",
            "destination": "dwh.raw.orders",
            "strategy": "incremental"
        }"#;

        let err = serde_json::from_str::<Loading>(json).unwrap_err();
        assert!(err.to_string().contains("has no increment attribute"));
    }

    #[test]
    fn definition_roundtrip() {
        let loading =
            Loading::incremental("orders_inc", source(), destination(), Some("updated_at"), false)
                .unwrap()
                .with_excluded_columns(["etl_loaded_at"])
                .with_chunking(ChunkingStrategy::new("orders_inc", "id", 500).unwrap());

        let json = serde_json::to_string(&loading).unwrap();
        let parsed: Loading = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, loading);
    }

    #[test]
    fn chunk_definition_uses_default_size() {
        let def = LoadingDefinition {
            name: "orders".to_string(),
            source: source(),
            destination: DestinationDefinition::Fqn("dwh.raw.orders".to_string()),
            strategy: LoadingKind::Snapshot,
            increment_column: None,
            is_overlapping: false,
            has_to_hash: true,
            has_to_order_by_pk: true,
            exclude: Vec::new(),
            chunk: Some(ChunkDefinition { column: "id".to_string(), size: None }),
        };

        let loading = def.clone().into_loading(Some(1000)).unwrap();
        assert_eq!(loading.chunking().unwrap().chunk_size(), 1000);

        assert!(def.into_loading(None).is_err());
    }
}
