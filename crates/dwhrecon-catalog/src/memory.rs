//! In-memory row source
//!
//! Holds rows per relation and answers scans the way a database would:
//! filter, then sort by the requested columns. Useful for:
//! - Unit testing reconciliation without a database
//! - Feeding rows loaded from files
//! - Simulating read failures part-way through a scan

use crate::adapter::FetchError;
use crate::source::{RowCursor, RowSource, ScanRequest};
use dwhrecon_core::{Relation, RelationIdentifier, Row};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

/// Failure injected into scans of one relation
#[derive(Debug, Clone)]
struct InjectedFailure {
    /// Rows yielded before the error
    after_rows: usize,
    error: FetchError,
}

/// Row source backed by in-memory vectors
///
/// Each scan copies the matching rows, so later inserts never affect a
/// cursor that is already open.
#[derive(Debug, Default)]
pub struct InMemoryRowSource {
    name: String,
    rows: RwLock<HashMap<String, Vec<Row>>>,
    failures: RwLock<HashMap<String, InjectedFailure>>,
    scans: AtomicUsize,
}

impl InMemoryRowSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Builder-style variant of [`InMemoryRowSource::insert_rows`]
    pub fn with_rows(self, relation: &RelationIdentifier, rows: Vec<Row>) -> Self {
        self.insert_rows(relation, rows);
        self
    }

    /// Replace the rows of a relation
    pub fn insert_rows(&self, relation: &RelationIdentifier, rows: Vec<Row>) {
        if let Ok(mut stored) = self.rows.write() {
            stored.insert(relation.fqn(), rows);
        }
    }

    /// Append rows to a relation, creating it if needed
    pub fn append_rows(&self, relation: &RelationIdentifier, rows: Vec<Row>) {
        if let Ok(mut stored) = self.rows.write() {
            stored.entry(relation.fqn()).or_default().extend(rows);
        }
    }

    /// Fail every scan of `relation` immediately
    pub fn fail_scans(&self, relation: &RelationIdentifier, error: FetchError) {
        self.fail_after(relation, 0, error);
    }

    /// Fail scans of `relation` after `after_rows` rows have been yielded
    pub fn fail_after(&self, relation: &RelationIdentifier, after_rows: usize, error: FetchError) {
        if let Ok(mut failures) = self.failures.write() {
            failures.insert(relation.fqn(), InjectedFailure { after_rows, error });
        }
    }

    /// Remove injected failures
    pub fn clear_failures(&self) {
        if let Ok(mut failures) = self.failures.write() {
            failures.clear();
        }
    }

    /// Number of rows stored for a relation
    pub fn row_count(&self, relation: &RelationIdentifier) -> usize {
        self.rows
            .read()
            .ok()
            .and_then(|rows| rows.get(&relation.fqn()).map(Vec::len))
            .unwrap_or(0)
    }

    /// Number of scans started so far
    pub fn scan_count(&self) -> usize {
        self.scans.load(Ordering::Relaxed)
    }
}

impl RowSource for InMemoryRowSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn scan(&self, relation: &Relation, request: &ScanRequest) -> Result<RowCursor, FetchError> {
        self.scans.fetch_add(1, Ordering::Relaxed);
        let fqn = relation.identifier().fqn();

        let mut rows: Vec<Row> = {
            let stored = self
                .rows
                .read()
                .map_err(|e| FetchError::QueryError(format!("Row store poisoned: {}", e)))?;
            stored
                .get(&fqn)
                .ok_or_else(|| FetchError::RelationNotFound(fqn.clone()))?
                .iter()
                .filter(|row| request.matches(row))
                .cloned()
                .collect()
        };
        rows.sort_by(|a, b| request.compare(a, b));

        let failure = self
            .failures
            .read()
            .ok()
            .and_then(|failures| failures.get(&fqn).cloned());

        tracing::trace!(source = %self.name, relation = %fqn, rows = rows.len(), "in-memory scan");

        let rows = rows.into_iter().map(Ok::<Row, FetchError>);
        match failure {
            None => Ok(Box::new(rows)),
            Some(InjectedFailure { after_rows, error }) => Ok(Box::new(
                rows.take(after_rows).chain(std::iter::once(Err(error))),
            )),
        }
    }
}
