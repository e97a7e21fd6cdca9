//! JSON-lines row files
//!
//! One JSON object per line, keys are column names. Values are read
//! according to each column's logical type, so `"2024-01-01"` in a DATE
//! column becomes a date and `"12.50"` in a DECIMAL column keeps its
//! exact text. Keys the relation does not declare are kept with an
//! inferred type; they never take part in keys or signatures.

use crate::adapter::FetchError;
use crate::memory::InMemoryRowSource;
use crate::source::{RowCursor, RowSource, ScanRequest};
use dwhrecon_core::{Relation, Row, Value};
use std::io::BufRead;
use std::path::Path;

/// Parse JSON-lines rows for `relation`
///
/// Blank lines are skipped. Errors carry the 1-based line number.
pub fn parse_rows(relation: &Relation, reader: impl BufRead) -> Result<Vec<Row>, FetchError> {
    let mut rows = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line.map_err(|e| FetchError::IoError(format!("line {}: {}", line_no, e)))?;
        if line.trim().is_empty() {
            continue;
        }

        let json: serde_json::Value = serde_json::from_str(&line).map_err(|e| {
            FetchError::InvalidResponse(format!("line {}: {}", line_no, e))
        })?;
        let object = json.as_object().ok_or_else(|| {
            FetchError::InvalidResponse(format!("line {}: expected a JSON object", line_no))
        })?;

        let mut row = Row::new();
        for (key, raw) in object {
            let value = match relation.find_column(key) {
                Some(column) => Value::from_json(raw, &column.logical_type, key).map_err(|e| {
                    FetchError::InvalidResponse(format!("line {}: {}", line_no, e))
                })?,
                None => Value::infer_from_json(raw),
            };
            row.insert(key.clone(), value);
        }
        rows.push(row);
    }

    Ok(rows)
}

/// Row source over JSON-lines files, one file per relation
#[derive(Debug)]
pub struct JsonLinesSource {
    rows: InMemoryRowSource,
}

impl JsonLinesSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            rows: InMemoryRowSource::new(name),
        }
    }

    /// Load (or replace) the rows of `relation` from `path`
    ///
    /// Returns the number of rows read.
    pub fn load_file(&self, relation: &Relation, path: &Path) -> Result<usize, FetchError> {
        let file = std::fs::File::open(path)
            .map_err(|e| FetchError::IoError(format!("{}: {}", path.display(), e)))?;
        let rows = parse_rows(relation, std::io::BufReader::new(file))
            .map_err(|e| match e {
                FetchError::InvalidResponse(msg) => {
                    FetchError::InvalidResponse(format!("{}: {}", path.display(), msg))
                }
                other => other,
            })?;

        let count = rows.len();
        tracing::debug!(
            relation = %relation.identifier(),
            path = %path.display(),
            rows = count,
            "loaded JSON-lines rows"
        );
        self.rows.insert_rows(relation.identifier(), rows);
        Ok(count)
    }

    /// Builder-style [`JsonLinesSource::load_file`]
    pub fn with_file(self, relation: &Relation, path: &Path) -> Result<Self, FetchError> {
        self.load_file(relation, path)?;
        Ok(self)
    }
}

impl RowSource for JsonLinesSource {
    fn name(&self) -> &str {
        self.rows.name()
    }

    fn scan(&self, relation: &Relation, request: &ScanRequest) -> Result<RowCursor, FetchError> {
        self.rows.scan(relation, request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dwhrecon_core::{Column, Constraint, LogicalType, RelationIdentifier};
    use std::io::Write;

    fn orders() -> Relation {
        Relation::new(
            RelationIdentifier::new("crm", "public", "orders"),
            vec![
                Column::new("id", 1, LogicalType::Int),
                Column::new(
                    "amount",
                    2,
                    LogicalType::Decimal {
                        precision: Some(10),
                        scale: Some(2),
                    },
                ),
                Column::new("updated_at", 3, LogicalType::Timestamp),
            ],
            vec![Constraint::primary_key("orders_pk", &["id"])],
        )
        .unwrap()
    }

    #[test]
    fn parse_rows_coerces_by_logical_type() {
        let input = r#"{"id": 1, "amount": "10.50", "updated_at": "2024-01-01T10:00:00"}

{"id": "2", "amount": 20, "updated_at": null, "note": "extra"}
"#;
        let rows = parse_rows(&orders(), input.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].get("amount"), Some(&Value::Decimal("10.50".to_string())));
        assert!(matches!(rows[0].get("updated_at"), Some(Value::Timestamp(_))));
        assert_eq!(rows[1].get("id"), Some(&Value::Int(2)));
        assert!(rows[1].value_or_null("updated_at").is_null());
        assert_eq!(rows[1].get("note"), Some(&Value::from("extra")));
    }

    #[test]
    fn parse_rows_reports_line_numbers() {
        let input = "{\"id\": 1}\n[1, 2]\n";
        let err = parse_rows(&orders(), input.as_bytes()).unwrap_err();
        assert_eq!(
            err,
            FetchError::InvalidResponse("line 2: expected a JSON object".to_string())
        );

        let input = "{\"id\": \"one\"}\n";
        let err = parse_rows(&orders(), input.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn load_file_and_scan() {
        let relation = orders();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"id": 2, "amount": "1.00"}}"#).unwrap();
        writeln!(file, r#"{{"id": 1, "amount": "2.00"}}"#).unwrap();

        let source = JsonLinesSource::new("files")
            .with_file(&relation, file.path())
            .unwrap();

        let rows: Vec<Row> = source
            .scan(&relation, &ScanRequest::new().ordered_by(["id"]))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(rows[0].get("id"), Some(&Value::Int(1)));
        assert_eq!(source.name(), "files");
    }

    #[test]
    fn missing_file_is_io_error() {
        let source = JsonLinesSource::new("files");
        let err = source
            .load_file(&orders(), Path::new("/nonexistent/orders.jsonl"))
            .unwrap_err();
        assert_eq!(err.code(), "IO_ERROR");
    }
}
