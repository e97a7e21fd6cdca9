//! Ordered, boundable row streams
//!
//! The materializer turns a [`RowSource`] into the inputs a reconciliation
//! needs: rows sorted ascending by identity key, optionally restricted by
//! range predicates. Every fetch re-issues the underlying read.

use dwhrecon_catalog::{FetchError, RangePredicate, RowCursor, RowSource, ScanRequest};
use dwhrecon_core::{ChunkBoundary, ModelError, Relation, Value, Watermark};

/// Reads one relation from one row source
pub struct Materializer<'a> {
    source: &'a dyn RowSource,
    relation: &'a Relation,
    key_order: Vec<String>,
    filters: Vec<RangePredicate>,
}

impl<'a> Materializer<'a> {
    /// Fails with `MissingIdentityColumn` when the relation has no key to
    /// order by.
    pub fn new(source: &'a dyn RowSource, relation: &'a Relation) -> Result<Self, ModelError> {
        let key_order = relation
            .identity_columns()?
            .into_iter()
            .map(|c| c.name.clone())
            .collect();

        Ok(Self {
            source,
            relation,
            key_order,
            filters: Vec::new(),
        })
    }

    /// Apply `predicate` to every subsequent fetch
    pub fn restricted_to(mut self, predicate: RangePredicate) -> Self {
        if !predicate.is_unbounded() {
            self.filters.push(predicate);
        }
        self
    }

    pub fn relation(&self) -> &Relation {
        self.relation
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    fn request(&self, order_by: &[String], extra: Option<RangePredicate>) -> ScanRequest {
        let mut request = ScanRequest::new().ordered_by(order_by.iter().cloned());
        for predicate in self.filters.iter().cloned().chain(extra) {
            request = request.with_filter(predicate);
        }
        request
    }

    /// Every row, ascending by identity key
    pub fn fetch_all(&self) -> Result<RowCursor, FetchError> {
        self.fetch_range(None)
    }

    /// Rows whose increment column is at or above `watermark`
    ///
    /// No watermark means no filter (first run).
    pub fn fetch_since(
        &self,
        increment_column: &str,
        watermark: Option<&Watermark>,
    ) -> Result<RowCursor, FetchError> {
        self.fetch_range(
            watermark.map(|w| RangePredicate::at_least(increment_column, w.to_value())),
        )
    }

    /// Rows matching an extra predicate, ascending by identity key
    pub fn fetch_range(&self, predicate: Option<RangePredicate>) -> Result<RowCursor, FetchError> {
        let request = self.request(&self.key_order, predicate);
        tracing::trace!(
            relation = %self.relation.identifier(),
            source = self.source.name(),
            filters = request.filters.len(),
            "opening cursor"
        );
        self.source.scan(self.relation, &request)
    }

    /// Lazily partition the crushing column's distinct values into chunks
    ///
    /// Each boundary spans exactly `chunk_size` distinct non-NULL values,
    /// except possibly the last. Boundaries are inclusive and never overlap.
    pub fn fetch_chunk_bounds(
        &self,
        crushing_column: &str,
        chunk_size: usize,
    ) -> Result<ChunkBounds, FetchError> {
        let order_by = [crushing_column.to_string()];
        let cursor = self
            .source
            .scan(self.relation, &self.request(&order_by, None))?;

        Ok(ChunkBounds {
            cursor,
            column: crushing_column.to_string(),
            chunk_size: chunk_size.max(1),
            pending: None,
            done: false,
            nulls: 0,
        })
    }

    /// Lazily yield each chunk with its rows, ascending by identity key
    pub fn fetch_chunks(
        &self,
        crushing_column: &str,
        chunk_size: usize,
    ) -> Result<Chunks<'_, 'a>, FetchError> {
        Ok(Chunks {
            materializer: self,
            column: crushing_column.to_string(),
            bounds: self.fetch_chunk_bounds(crushing_column, chunk_size)?,
        })
    }
}

/// Iterator over chunk boundaries, reading one scan ordered by the
/// crushing column
pub struct ChunkBounds {
    cursor: RowCursor,
    column: String,
    chunk_size: usize,
    pending: Option<Value>,
    done: bool,
    nulls: usize,
}

impl ChunkBounds {
    /// Rows skipped so far because their crushing value was NULL
    pub fn null_rows(&self) -> usize {
        self.nulls
    }
}

impl Iterator for ChunkBounds {
    type Item = Result<ChunkBoundary, FetchError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut left = self.pending.take();
        let mut right = left.clone();
        let mut distinct = usize::from(left.is_some());

        loop {
            match self.cursor.next() {
                None => {
                    self.done = true;
                    break;
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                Some(Ok(row)) => {
                    let value = row.value_or_null(&self.column);
                    if value.is_null() {
                        self.nulls += 1;
                        continue;
                    }
                    if right.as_ref() == Some(value) {
                        continue;
                    }
                    if distinct == self.chunk_size {
                        self.pending = Some(value.clone());
                        break;
                    }
                    if left.is_none() {
                        left = Some(value.clone());
                    }
                    right = Some(value.clone());
                    distinct += 1;
                }
            }
        }

        match (left, right) {
            (Some(left), Some(right)) => Some(Ok(ChunkBoundary::new(left, right))),
            _ => None,
        }
    }
}

/// One chunk of a chunked extraction
pub struct Chunk {
    pub boundary: ChunkBoundary,
    pub rows: RowCursor,
}

/// Iterator over chunks; each chunk's rows are fetched when it is reached
pub struct Chunks<'m, 'a> {
    materializer: &'m Materializer<'a>,
    column: String,
    bounds: ChunkBounds,
}

impl Iterator for Chunks<'_, '_> {
    type Item = Result<Chunk, FetchError>;

    fn next(&mut self) -> Option<Self::Item> {
        let boundary = match self.bounds.next()? {
            Ok(boundary) => boundary,
            Err(e) => return Some(Err(e)),
        };

        let predicate = RangePredicate::between(
            self.column.as_str(),
            boundary.left_boundary.clone(),
            boundary.right_boundary.clone(),
        );
        Some(
            self.materializer
                .fetch_range(Some(predicate))
                .map(|rows| Chunk { boundary, rows }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dwhrecon_catalog::InMemoryRowSource;
    use dwhrecon_core::{Column, Constraint, LogicalType, RelationIdentifier, Row};

    fn events() -> Relation {
        Relation::new(
            RelationIdentifier::new("crm", "public", "events"),
            vec![
                Column::new("id", 1, LogicalType::Int),
                Column::new("day", 2, LogicalType::Int),
            ],
            vec![Constraint::primary_key("events_pk", &["id"])],
        )
        .unwrap()
    }

    fn ids(cursor: RowCursor) -> Vec<i64> {
        cursor
            .map(|row| match row.unwrap().value_or_null("id") {
                Value::Int(i) => *i,
                other => panic!("unexpected id {}", other),
            })
            .collect()
    }

    fn source_with(relation: &Relation, rows: Vec<Row>) -> InMemoryRowSource {
        InMemoryRowSource::new("memory").with_rows(relation.identifier(), rows)
    }

    #[test]
    fn fetch_all_orders_by_key() {
        let relation = events();
        let source = source_with(
            &relation,
            vec![
                Row::new().with("id", 3i64).with("day", 1i64),
                Row::new().with("id", 1i64).with("day", 2i64),
                Row::new().with("id", 2i64).with("day", 3i64),
            ],
        );

        let materializer = Materializer::new(&source, &relation).unwrap();
        assert_eq!(ids(materializer.fetch_all().unwrap()), vec![1, 2, 3]);
        // A second fetch re-issues the read
        assert_eq!(ids(materializer.fetch_all().unwrap()), vec![1, 2, 3]);
        assert_eq!(source.scan_count(), 2);
    }

    #[test]
    fn fetch_since_without_watermark_returns_everything() {
        let relation = events();
        let rows = (1..=5).map(|i| Row::new().with("id", i).with("day", i * 10)).collect();
        let source = source_with(&relation, rows);
        let materializer = Materializer::new(&source, &relation).unwrap();

        assert_eq!(ids(materializer.fetch_since("day", None).unwrap()).len(), 5);
        assert_eq!(
            ids(materializer
                .fetch_since("day", Some(&Watermark::Int(30)))
                .unwrap()),
            vec![3, 4, 5]
        );
    }

    #[test]
    fn chunk_bounds_count_distinct_values() {
        let relation = events();
        // Two rows per day, days 1..=5
        let rows = (1..=10)
            .map(|i| Row::new().with("id", i).with("day", (i + 1) / 2))
            .collect();
        let source = source_with(&relation, rows);
        let materializer = Materializer::new(&source, &relation).unwrap();

        let bounds: Vec<ChunkBoundary> = materializer
            .fetch_chunk_bounds("day", 2)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            bounds,
            vec![
                ChunkBoundary::new(Value::Int(1), Value::Int(2)),
                ChunkBoundary::new(Value::Int(3), Value::Int(4)),
                ChunkBoundary::new(Value::Int(5), Value::Int(5)),
            ]
        );
    }

    #[test]
    fn chunks_carry_their_rows() {
        let relation = events();
        let rows = (1..=6)
            .map(|i| Row::new().with("id", 7 - i).with("day", i))
            .collect();
        let source = source_with(&relation, rows);
        let materializer = Materializer::new(&source, &relation).unwrap();

        let chunks: Vec<Chunk> = materializer
            .fetch_chunks("day", 4)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(chunks.len(), 2);

        let mut chunks = chunks.into_iter();
        let first = chunks.next().unwrap();
        assert_eq!(first.boundary.to_string(), "[1, 4]");
        assert_eq!(ids(first.rows), vec![3, 4, 5, 6]);

        let second = chunks.next().unwrap();
        assert_eq!(ids(second.rows), vec![1, 2]);
    }

    #[test]
    fn null_crushing_values_are_skipped() {
        let relation = events();
        let source = source_with(
            &relation,
            vec![
                Row::new().with("id", 1i64).with("day", Value::Null),
                Row::new().with("id", 2i64).with("day", 4i64),
            ],
        );
        let materializer = Materializer::new(&source, &relation).unwrap();

        let mut bounds = materializer.fetch_chunk_bounds("day", 10).unwrap();
        let only = bounds.next().unwrap().unwrap();
        assert_eq!(only, ChunkBoundary::new(Value::Int(4), Value::Int(4)));
        assert!(bounds.next().is_none());
        assert_eq!(bounds.null_rows(), 1);
    }

    #[test]
    fn restriction_applies_to_every_fetch() {
        let relation = events();
        let rows = (1..=6).map(|i| Row::new().with("id", i).with("day", i)).collect();
        let source = source_with(&relation, rows);
        let materializer = Materializer::new(&source, &relation)
            .unwrap()
            .restricted_to(RangePredicate::at_least("day", Value::Int(3)));

        assert_eq!(ids(materializer.fetch_all().unwrap()), vec![3, 4, 5, 6]);
        let bounds: Vec<_> = materializer.fetch_chunk_bounds("day", 3).unwrap().collect();
        assert_eq!(bounds.len(), 2);
    }
}
