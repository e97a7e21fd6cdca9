//! Identity keys and row signatures
//!
//! A [`KeyExtractor`] is built once per relation and then applied to every
//! row of both inputs. Building it is where a missing primary key is
//! detected, so a run fails before any row is read.

use crate::error::{ReconcileError, Side};
use dwhrecon_core::{Config, Loading, ModelError, Relation, Row, RowKey, RowSignature};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Projects rows onto identity keys and hashes their remaining columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyExtractor {
    relation: String,
    identity: Vec<String>,
    signature_columns: Vec<String>,
}

impl KeyExtractor {
    /// Build an extractor for `relation`
    ///
    /// `excluded` names columns left out of the signature. Names the
    /// relation does not have are ignored.
    pub fn new<I, S>(relation: &Relation, excluded: I) -> Result<Self, ModelError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let identity: Vec<String> = relation
            .identity_columns()?
            .into_iter()
            .map(|c| c.name.clone())
            .collect();

        let excluded: HashSet<String> = excluded
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .collect();

        let mut columns: Vec<_> = relation.columns().iter().collect();
        columns.sort_by_key(|c| c.position);

        let signature_columns = columns
            .into_iter()
            .map(|c| c.name.clone())
            .filter(|name| !identity.contains(name) && !excluded.contains(name))
            .collect();

        Ok(Self {
            relation: relation.identifier().fqn(),
            identity,
            signature_columns,
        })
    }

    /// Build the extractor a loading run uses
    ///
    /// Excludes the loading's own columns plus every column matching the
    /// configured metadata patterns.
    pub fn for_loading(
        relation: &Relation,
        loading: &Loading,
        config: &Config,
    ) -> Result<Self, ModelError> {
        loading.validate_against(relation)?;

        let excluded: Vec<&str> = relation
            .column_names()
            .into_iter()
            .filter(|name| {
                loading.excluded_columns().iter().any(|c| c == name)
                    || config.is_metadata_column(name)
            })
            .collect();

        Self::new(relation, excluded)
    }

    /// Fully qualified name of the relation
    pub fn relation(&self) -> &str {
        &self.relation
    }

    pub fn identity_columns(&self) -> &[String] {
        &self.identity
    }

    /// Columns hashed into the signature, in declared order
    pub fn signature_columns(&self) -> &[String] {
        &self.signature_columns
    }

    /// Project a row onto its identity key
    ///
    /// Fails when an identity column is absent or NULL.
    pub fn extract_key(&self, row: &Row, side: Side) -> Result<RowKey, ReconcileError> {
        let mut values = Vec::with_capacity(self.identity.len());
        for column in &self.identity {
            match row.get(column) {
                Some(value) if !value.is_null() => values.push(value.clone()),
                _ => {
                    return Err(ReconcileError::MissingKeyValue {
                        relation: self.relation.clone(),
                        side,
                        column: column.clone(),
                    })
                }
            }
        }
        Ok(RowKey::new(values))
    }

    /// Hash every non-key, non-excluded column of a row
    ///
    /// Columns are visited in declared order and each contributes its name
    /// and canonical value, so the result does not depend on how the row was
    /// assembled. A missing column hashes the same as NULL.
    pub fn extract_signature(&self, row: &Row) -> RowSignature {
        let mut hasher = Sha256::new();
        let mut buf = Vec::with_capacity(64);

        for column in &self.signature_columns {
            buf.clear();
            buf.extend_from_slice(&(column.len() as u32).to_be_bytes());
            buf.extend_from_slice(column.as_bytes());
            row.value_or_null(column).write_canonical(&mut buf);
            hasher.update(&buf);
        }

        RowSignature::from_digest(&hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dwhrecon_core::{Column, Constraint, DwhRelation, LogicalType, RelationIdentifier, Value};

    fn orders() -> Relation {
        Relation::new(
            RelationIdentifier::new("crm", "public", "orders"),
            vec![
                Column::new("id", 1, LogicalType::Int),
                Column::new("amount", 2, LogicalType::Int),
                Column::new("note", 3, LogicalType::String),
                Column::new("_etl_loaded_at", 4, LogicalType::Timestamp),
            ],
            vec![Constraint::primary_key("orders_pk", &["id"])],
        )
        .unwrap()
    }

    #[test]
    fn key_is_projected_in_declared_order() {
        let relation = Relation::new(
            RelationIdentifier::new("crm", "public", "order_lines"),
            vec![
                Column::new("line_no", 2, LogicalType::Int),
                Column::new("order_id", 1, LogicalType::Int),
                Column::new("qty", 3, LogicalType::Int),
            ],
            vec![Constraint::primary_key("pk", &["line_no", "order_id"])],
        )
        .unwrap();
        let extractor = KeyExtractor::new(&relation, Vec::<String>::new()).unwrap();

        let row = Row::new().with("qty", 3i64).with("line_no", 2i64).with("order_id", 7i64);
        let key = extractor.extract_key(&row, Side::New).unwrap();
        assert_eq!(key, RowKey::new(vec![Value::Int(7), Value::Int(2)]));
        assert_eq!(extractor.signature_columns(), ["qty".to_string()]);
    }

    #[test]
    fn relation_without_primary_key_is_rejected() {
        let view = Relation::new(
            RelationIdentifier::new("crm", "reporting", "totals"),
            vec![Column::new("total", 1, LogicalType::Int)],
            Vec::new(),
        )
        .unwrap();

        let err = KeyExtractor::new(&view, Vec::<String>::new()).unwrap_err();
        assert_eq!(err.code(), "MISSING_IDENTITY_COLUMN");
    }

    #[test]
    fn null_key_value_is_reported() {
        let extractor = KeyExtractor::new(&orders(), Vec::<String>::new()).unwrap();
        let err = extractor
            .extract_key(&Row::new().with("id", Value::Null), Side::Old)
            .unwrap_err();
        assert_eq!(err.code(), "MISSING_KEY_VALUE");
    }

    #[test]
    fn signature_ignores_key_and_excluded_columns() {
        let extractor = KeyExtractor::new(&orders(), ["_etl_loaded_at"]).unwrap();

        let a = Row::new().with("id", 1i64).with("amount", 10i64).with("note", "x");
        let b = Row::new()
            .with("id", 2i64)
            .with("amount", 10i64)
            .with("note", "x")
            .with("_etl_loaded_at", Value::Null);
        assert_eq!(extractor.extract_signature(&a), extractor.extract_signature(&b));

        let c = a.clone().with("amount", 11i64);
        assert_ne!(extractor.extract_signature(&a), extractor.extract_signature(&c));
    }

    #[test]
    fn null_differs_from_every_legal_value() {
        let extractor = KeyExtractor::new(&orders(), Vec::<String>::new()).unwrap();
        let null_note = Row::new().with("id", 1i64).with("note", Value::Null);
        let empty_note = Row::new().with("id", 1i64).with("note", "");
        let missing_note = Row::new().with("id", 1i64);

        assert_ne!(
            extractor.extract_signature(&null_note),
            extractor.extract_signature(&empty_note)
        );
        assert_eq!(
            extractor.extract_signature(&null_note),
            extractor.extract_signature(&missing_note)
        );
    }

    #[test]
    fn signature_is_lowercase_hex_sha256() {
        let extractor = KeyExtractor::new(&orders(), Vec::<String>::new()).unwrap();
        let signature = extractor.extract_signature(&Row::new().with("id", 1i64));
        assert_eq!(signature.as_str().len(), 64);
        assert!(signature
            .as_str()
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn loading_exclusions_and_metadata_patterns() {
        let relation = orders();
        let loading = Loading::snapshot(
            "orders",
            relation.identifier().clone(),
            DwhRelation::new("dwh.raw.orders"),
        )
        .with_excluded_columns(["note"]);
        let config = Config {
            metadata_columns: vec!["_etl_*".to_string()],
            ..Config::default()
        };

        let extractor = KeyExtractor::for_loading(&relation, &loading, &config).unwrap();
        assert_eq!(extractor.signature_columns(), ["amount".to_string()]);

        let bad = loading.with_excluded_columns(["nope"]);
        let err = KeyExtractor::for_loading(&relation, &bad, &config).unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_COLUMN");
    }
}
