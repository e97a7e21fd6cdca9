//! Source systems, namespaces and warehouse destinations

use crate::error::ModelError;
use crate::schema::RelationIdentifier;
use serde::{Deserialize, Serialize};

/// A source RDBMS instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceSystem {
    /// Short unique key (first part of a relation identifier)
    pub key: String,

    /// Fully qualified name, unique across systems
    pub fqn: String,

    /// System type, e.g. "postgres" or "oracle"
    pub system_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl SourceSystem {
    pub fn new(
        key: impl Into<String>,
        fqn: impl Into<String>,
        system_type: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            fqn: fqn.into(),
            system_type: system_type.into(),
            version: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

/// A schema inside a source system
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace {
    pub name: String,

    /// Key of the owning source system
    pub system_key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
}

impl Namespace {
    pub fn new(name: impl Into<String>, system_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system_key: system_key.into(),
            external_id: None,
        }
    }
}

/// Warehouse relation a loading writes into
///
/// The flags describe which auxiliary columns the warehouse copy maintains
/// next to the mirrored source columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DwhRelation {
    /// Fully qualified warehouse name
    pub fqn: String,

    /// Keeps a per-row content hash column
    #[serde(default)]
    pub has_rows_hash: bool,

    /// Keeps a hash of the primary key columns
    #[serde(default)]
    pub has_pks_hash: bool,

    /// Keeps a row number over the primary key
    #[serde(default)]
    pub has_pks_rn: bool,
}

impl DwhRelation {
    pub fn new(fqn: impl Into<String>) -> Self {
        Self {
            fqn: fqn.into(),
            has_rows_hash: false,
            has_pks_hash: false,
            has_pks_rn: false,
        }
    }

    pub fn with_rows_hash(mut self) -> Self {
        self.has_rows_hash = true;
        self
    }

    pub fn with_pks_hash(mut self) -> Self {
        self.has_pks_hash = true;
        self
    }

    pub fn with_pks_rn(mut self) -> Self {
        self.has_pks_rn = true;
        self
    }

    /// The warehouse name as a relation identifier
    pub fn identifier(&self) -> Result<RelationIdentifier, ModelError> {
        self.fqn.parse()
    }
}
