//! Row source trait and scan requests
//!
//! A row source answers "give me the rows of this relation, filtered by
//! these ranges, in this order". It is the only place rows enter the
//! engine, so anything that can produce ordered rows (a database cursor, a
//! file, a fixture) plugs in here.

use crate::adapter::FetchError;
use dwhrecon_core::{Relation, Row, Value};
use std::cmp::Ordering;
use std::fmt;
use std::ops::Bound;

/// Forward-only stream of rows
///
/// Advancing may block on the underlying source.
pub type RowCursor = Box<dyn Iterator<Item = Result<Row, FetchError>> + Send>;

/// Range filter on one column
///
/// Bounds compare loosely (integers against floats, dates against
/// timestamps). NULL orders before every value, the same as in scans: it
/// fails any lower bound and passes an upper bound on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct RangePredicate {
    pub column: String,
    pub lower: Bound<Value>,
    pub upper: Bound<Value>,
}

impl RangePredicate {
    pub fn new(column: impl Into<String>, lower: Bound<Value>, upper: Bound<Value>) -> Self {
        Self {
            column: column.into(),
            lower,
            upper,
        }
    }

    /// `column >= value`
    pub fn at_least(column: impl Into<String>, value: Value) -> Self {
        Self::new(column, Bound::Included(value), Bound::Unbounded)
    }

    /// `lower <= column <= upper`
    pub fn between(column: impl Into<String>, lower: Value, upper: Value) -> Self {
        Self::new(column, Bound::Included(lower), Bound::Included(upper))
    }

    /// Whether the predicate places no restriction
    pub fn is_unbounded(&self) -> bool {
        matches!(
            (&self.lower, &self.upper),
            (Bound::Unbounded, Bound::Unbounded)
        )
    }

    pub fn matches(&self, row: &Row) -> bool {
        if self.is_unbounded() {
            return true;
        }

        let value = row.value_or_null(&self.column);
        let above_lower = match &self.lower {
            Bound::Included(lo) => value.compare_loose(lo) != Ordering::Less,
            Bound::Excluded(lo) => value.compare_loose(lo) == Ordering::Greater,
            Bound::Unbounded => true,
        };
        let below_upper = match &self.upper {
            Bound::Included(hi) => value.compare_loose(hi) != Ordering::Greater,
            Bound::Excluded(hi) => value.compare_loose(hi) == Ordering::Less,
            Bound::Unbounded => true,
        };

        above_lower && below_upper
    }
}

impl fmt::Display for RangePredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        match &self.lower {
            Bound::Included(v) => parts.push(format!("{} >= {}", self.column, v)),
            Bound::Excluded(v) => parts.push(format!("{} > {}", self.column, v)),
            Bound::Unbounded => {}
        }
        match &self.upper {
            Bound::Included(v) => parts.push(format!("{} <= {}", self.column, v)),
            Bound::Excluded(v) => parts.push(format!("{} < {}", self.column, v)),
            Bound::Unbounded => {}
        }
        if parts.is_empty() {
            write!(f, "TRUE")
        } else {
            write!(f, "{}", parts.join(" AND "))
        }
    }
}

/// What to read from a relation and in which order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanRequest {
    /// Ascending sort columns, most significant first
    pub order_by: Vec<String>,

    /// Conjunction of range filters
    pub filters: Vec<RangePredicate>,
}

impl ScanRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ordered_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.order_by = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_filter(mut self, predicate: RangePredicate) -> Self {
        if !predicate.is_unbounded() {
            self.filters.push(predicate);
        }
        self
    }

    /// Whether a row passes every filter
    pub fn matches(&self, row: &Row) -> bool {
        self.filters.iter().all(|p| p.matches(row))
    }

    /// Order two rows by the `order_by` columns
    pub fn compare(&self, a: &Row, b: &Row) -> Ordering {
        self.order_by
            .iter()
            .map(|column| a.value_or_null(column).cmp(b.value_or_null(column)))
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

/// Supplier of ordered, filtered rows
pub trait RowSource: Send + Sync {
    /// Source name for logs and errors
    fn name(&self) -> &str;

    /// Start a new scan
    ///
    /// Every call re-issues the read; cursors are single-pass.
    fn scan(&self, relation: &Relation, request: &ScanRequest) -> Result<RowCursor, FetchError>;
}

impl<S: RowSource + ?Sized> RowSource for std::sync::Arc<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn scan(&self, relation: &Relation, request: &ScanRequest) -> Result<RowCursor, FetchError> {
        (**self).scan(relation, request)
    }
}
