//! Relation metadata: columns, constraints and the identity key

use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Portable logical type system
///
/// Maps source-specific types to a common representation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LogicalType {
    /// Boolean type
    Bool,

    /// Integer type (any precision)
    Int,

    /// Floating point (any precision)
    Float,

    /// Decimal with precision and scale
    Decimal {
        precision: Option<u16>,
        scale: Option<u16>,
    },

    /// String/text type
    String,

    /// Date (no time component)
    Date,

    /// Timestamp (with time component)
    Timestamp,

    /// JSON/Variant type
    Json,

    /// Binary data
    Bytes,

    /// Unknown type (cannot infer)
    Unknown,
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => write!(f, "BOOL"),
            Self::Int => write!(f, "INT"),
            Self::Float => write!(f, "FLOAT"),
            Self::Decimal { precision, scale } => match (precision, scale) {
                (Some(p), Some(s)) => write!(f, "DECIMAL({}, {})", p, s),
                (Some(p), None) => write!(f, "DECIMAL({})", p),
                _ => write!(f, "DECIMAL"),
            },
            Self::String => write!(f, "STRING"),
            Self::Date => write!(f, "DATE"),
            Self::Timestamp => write!(f, "TIMESTAMP"),
            Self::Json => write!(f, "JSON"),
            Self::Bytes => write!(f, "BYTES"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// A column (attribute) of a relation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Column {
    /// Column name
    pub name: String,

    /// Declared position (1-based ordinal in the source)
    pub position: u32,

    /// Generic logical type
    pub logical_type: LogicalType,

    /// Source-native type name (e.g. "character varying")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,

    /// Whether NULL is allowed
    #[serde(default = "default_nullable")]
    pub nullable: bool,

    /// Length or precision
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,

    /// Numeric scale
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,

    /// Default expression as written in the source DDL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_expression: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    /// Identifier of the column in the source catalog
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
}

fn default_nullable() -> bool {
    true
}

impl Column {
    /// Create a nullable column at the given position
    pub fn new(name: impl Into<String>, position: u32, logical_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            position,
            logical_type,
            data_type: None,
            nullable: true,
            size: None,
            scale: None,
            default_expression: None,
            comment: None,
            external_id: None,
        }
    }

    /// Set nullability
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Set the source-native type name
    pub fn with_data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = Some(data_type.into());
        self
    }

    /// Set size and scale
    pub fn with_size(mut self, size: Option<u32>, scale: Option<u32>) -> Self {
        self.size = size;
        self.scale = scale;
        self
    }

    /// Set the default expression
    pub fn with_default(mut self, expression: impl Into<String>) -> Self {
        self.default_expression = Some(expression.into());
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Kind of a relation constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConstraintKind {
    PrimaryKey,
    Unique,
    ForeignKey,
    Index,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrimaryKey => write!(f, "primary key"),
            Self::Unique => write!(f, "unique"),
            Self::ForeignKey => write!(f, "foreign key"),
            Self::Index => write!(f, "index"),
        }
    }
}

/// A named constraint over one or more columns
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Constraint {
    pub name: String,
    pub kind: ConstraintKind,
    pub columns: Vec<String>,
}

impl Constraint {
    /// Create a constraint
    pub fn new(name: impl Into<String>, kind: ConstraintKind, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            kind,
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Create a primary key constraint
    pub fn primary_key(name: impl Into<String>, columns: &[&str]) -> Self {
        Self::new(name, ConstraintKind::PrimaryKey, columns)
    }
}

/// Whether a relation is a base table or a view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationType {
    #[default]
    Table,
    View,
}

/// Identifies a relation in a source system
///
/// Serialized as its fully qualified name `system.namespace.relation`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelationIdentifier {
    /// Source system key
    pub system: String,

    /// Namespace (schema) name
    pub namespace: String,

    /// Relation name
    pub relation: String,
}

impl RelationIdentifier {
    /// Create a new relation identifier
    pub fn new(
        system: impl Into<String>,
        namespace: impl Into<String>,
        relation: impl Into<String>,
    ) -> Self {
        Self {
            system: system.into(),
            namespace: namespace.into(),
            relation: relation.into(),
        }
    }

    /// Get fully qualified name
    pub fn fqn(&self) -> String {
        format!("{}.{}.{}", self.system, self.namespace, self.relation)
    }
}

impl fmt::Display for RelationIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fqn())
    }
}

impl FromStr for RelationIdentifier {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        match parts.as_slice() {
            [system, namespace, relation]
                if !system.is_empty() && !namespace.is_empty() && !relation.is_empty() =>
            {
                Ok(Self::new(*system, *namespace, *relation))
            }
            _ => Err(ModelError::InvalidIdentifier(s.to_string())),
        }
    }
}

impl TryFrom<String> for RelationIdentifier {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RelationIdentifier> for String {
    fn from(id: RelationIdentifier) -> Self {
        id.fqn()
    }
}

/// Unvalidated relation as it appears in JSON metadata files
#[derive(Deserialize)]
struct RawRelation {
    identifier: RelationIdentifier,
    #[serde(default)]
    relation_type: RelationType,
    columns: Vec<Column>,
    #[serde(default)]
    constraints: Vec<Constraint>,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    external_id: Option<String>,
}

/// A named collection of typed columns with constraints
///
/// Columns are kept in declared position order. A relation is only
/// constructible when its constraints reference existing columns and it
/// declares at most one primary key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRelation")]
pub struct Relation {
    identifier: RelationIdentifier,
    relation_type: RelationType,
    columns: Vec<Column>,
    constraints: Vec<Constraint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    external_id: Option<String>,
}

impl TryFrom<RawRelation> for Relation {
    type Error = ModelError;

    fn try_from(raw: RawRelation) -> Result<Self, Self::Error> {
        let mut relation = Relation::new(raw.identifier, raw.columns, raw.constraints)?;
        relation.relation_type = raw.relation_type;
        relation.comment = raw.comment;
        relation.external_id = raw.external_id;
        Ok(relation)
    }
}

impl Relation {
    /// Create a validated relation
    pub fn new(
        identifier: RelationIdentifier,
        mut columns: Vec<Column>,
        constraints: Vec<Constraint>,
    ) -> Result<Self, ModelError> {
        let relation_name = identifier.fqn();
        columns.sort_by_key(|c| c.position);

        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(ModelError::DuplicateColumn {
                    relation: relation_name,
                    column: column.name.clone(),
                });
            }
        }

        let mut primary_key: Option<&Constraint> = None;
        for constraint in &constraints {
            if let Some(missing) = constraint.columns.iter().find(|c| !seen.contains(c.as_str())) {
                return Err(ModelError::UnknownColumn {
                    relation: relation_name,
                    column: missing.clone(),
                });
            }

            if constraint.kind == ConstraintKind::PrimaryKey {
                if let Some(first) = primary_key {
                    return Err(ModelError::MultiplePrimaryKeys {
                        relation: relation_name,
                        first: first.name.clone(),
                        second: constraint.name.clone(),
                    });
                }
                primary_key = Some(constraint);
            }
        }

        Ok(Self {
            identifier,
            relation_type: RelationType::Table,
            columns,
            constraints,
            comment: None,
            external_id: None,
        })
    }

    /// Mark the relation as a view
    pub fn as_view(mut self) -> Self {
        self.relation_type = RelationType::View;
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn identifier(&self) -> &RelationIdentifier {
        &self.identifier
    }

    /// Same definition under another identifier (e.g. the warehouse copy)
    pub fn mirrored_as(&self, identifier: RelationIdentifier) -> Self {
        let mut mirror = self.clone();
        mirror.identifier = identifier;
        mirror
    }

    /// Relation name without system and namespace
    pub fn name(&self) -> &str {
        &self.identifier.relation
    }

    pub fn relation_type(&self) -> RelationType {
        self.relation_type
    }

    /// Columns in declared position order
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Find a column by name
    pub fn find_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Get column names in declared order
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Fail with `UnknownColumn` unless the relation has the column
    pub fn require_column(&self, name: &str) -> Result<&Column, ModelError> {
        self.find_column(name).ok_or_else(|| ModelError::UnknownColumn {
            relation: self.identifier.fqn(),
            column: name.to_string(),
        })
    }

    /// The primary key constraint, if declared
    pub fn primary_key(&self) -> Option<&Constraint> {
        self.constraints
            .iter()
            .find(|c| c.kind == ConstraintKind::PrimaryKey)
    }

    /// Identity key columns in declared position order
    pub fn identity_columns(&self) -> Result<Vec<&Column>, ModelError> {
        let pk = self
            .primary_key()
            .filter(|pk| !pk.columns.is_empty())
            .ok_or_else(|| ModelError::MissingIdentityColumn {
                relation: self.identifier.fqn(),
            })?;

        Ok(self
            .columns
            .iter()
            .filter(|c| pk.columns.contains(&c.name))
            .collect())
    }
}
