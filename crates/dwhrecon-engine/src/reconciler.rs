//! Ordered merge-join of two row streams
//!
//! Both inputs must arrive ascending by identity key. The reconciler walks
//! them in lockstep, holding only the current row of each side, and
//! classifies every key of the union exactly once. Ordering is checked,
//! never repaired: a key that goes backwards fails the run.

use crate::error::{ReconcileError, Side};
use crate::key::KeyExtractor;
use dwhrecon_catalog::FetchError;
use dwhrecon_core::{ReconciliationResult, Row, RowKey, RowSignature, Value};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;

/// Everything learned from one pass over both inputs
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub result: ReconciliationResult,

    /// Rows read from the new side
    pub records_count: u64,

    /// SHA-256 over the new side's (key, signature) pairs in key order
    pub rows_set_hash: String,

    /// Largest non-NULL increment value seen on the new side
    pub max_increment: Option<Value>,
}

/// Keys one pass could not pair, with their signatures
///
/// Filled by [`Reconciler::reconcile_window`], where a key missing from one
/// side of a window may still turn up in another window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Unmatched {
    pub old: Vec<(RowKey, RowSignature)>,
    pub new: Vec<(RowKey, RowSignature)>,
}

/// Key-checked cursor over one input
struct KeyedCursor<'e, I> {
    rows: I,
    extractor: &'e KeyExtractor,
    side: Side,
    last: Option<RowKey>,
}

impl<'e, I> KeyedCursor<'e, I>
where
    I: Iterator<Item = Result<Row, FetchError>>,
{
    fn new(rows: I, extractor: &'e KeyExtractor, side: Side) -> Self {
        Self {
            rows,
            extractor,
            side,
            last: None,
        }
    }

    fn advance(&mut self) -> Result<Option<(RowKey, Row)>, ReconcileError> {
        let row = match self.rows.next() {
            None => return Ok(None),
            Some(Err(source)) => {
                return Err(ReconcileError::Source {
                    relation: self.extractor.relation().to_string(),
                    side: self.side,
                    source,
                })
            }
            Some(Ok(row)) => row,
        };

        let key = self.extractor.extract_key(&row, self.side)?;
        if let Some(previous) = &self.last {
            match key.cmp(previous) {
                Ordering::Greater => {}
                Ordering::Equal => {
                    return Err(ReconcileError::DuplicateKey {
                        relation: self.extractor.relation().to_string(),
                        side: self.side,
                        key,
                    })
                }
                Ordering::Less => {
                    return Err(ReconcileError::UnsortedInput {
                        relation: self.extractor.relation().to_string(),
                        side: self.side,
                        previous: previous.clone(),
                        current: key,
                    })
                }
            }
        }

        self.last = Some(key.clone());
        Ok(Some((key, row)))
    }
}

/// Running aggregates over the new side
struct NewSideTally<'c> {
    increment_column: Option<&'c str>,
    records_count: u64,
    hasher: Sha256,
    buf: Vec<u8>,
    max_increment: Option<Value>,
}

impl<'c> NewSideTally<'c> {
    fn new(increment_column: Option<&'c str>) -> Self {
        Self {
            increment_column,
            records_count: 0,
            hasher: Sha256::new(),
            buf: Vec::with_capacity(128),
            max_increment: None,
        }
    }

    fn observe(&mut self, key: &RowKey, signature: &RowSignature, row: &Row) {
        self.records_count += 1;

        self.buf.clear();
        key.write_canonical(&mut self.buf);
        self.buf.extend_from_slice(signature.as_str().as_bytes());
        self.hasher.update(&self.buf);

        if let Some(column) = self.increment_column {
            let value = row.value_or_null(column);
            let is_new_max = !value.is_null()
                && self
                    .max_increment
                    .as_ref()
                    .map_or(true, |max| value.compare_loose(max) == Ordering::Greater);
            if is_new_max {
                self.max_increment = Some(value.clone());
            }
        }
    }
}

/// Classifies keys of two ordered inputs into added, removed, changed and
/// unchanged
pub struct Reconciler<'e> {
    extractor: &'e KeyExtractor,
    increment_column: Option<String>,
    classify_old_only: bool,
}

impl<'e> Reconciler<'e> {
    pub fn new(extractor: &'e KeyExtractor) -> Self {
        Self {
            extractor,
            increment_column: None,
            classify_old_only: true,
        }
    }

    /// Track the largest value of `column` among new rows
    pub fn tracking_increment(mut self, column: impl Into<String>) -> Self {
        self.increment_column = Some(column.into());
        self
    }

    /// Leave old-only keys unclassified
    ///
    /// For a new side restricted to an increment: a warehouse row whose key
    /// the increment does not carry was not touched, not removed.
    pub fn within_increment(mut self) -> Self {
        self.classify_old_only = false;
        self
    }

    /// Whether old-only keys are reported as removed
    pub fn classifies_old_only(&self) -> bool {
        self.classify_old_only
    }

    pub fn extractor(&self) -> &KeyExtractor {
        self.extractor
    }

    /// Merge-join `old` against `new`
    ///
    /// Either returns the complete classification or an error; nothing is
    /// returned for a pass that did not reach the end of both inputs.
    pub fn reconcile<O, N>(&self, old: O, new: N) -> Result<Reconciliation, ReconcileError>
    where
        O: IntoIterator<Item = Result<Row, FetchError>>,
        N: IntoIterator<Item = Result<Row, FetchError>>,
    {
        self.merge(old, new, None)
    }

    /// Merge-join one window of a chunked run
    ///
    /// Keys found on both sides are classified as usual. Keys found on one
    /// side only are handed back in [`Unmatched`] instead of being reported
    /// as added or removed.
    pub fn reconcile_window<O, N>(
        &self,
        old: O,
        new: N,
    ) -> Result<(Reconciliation, Unmatched), ReconcileError>
    where
        O: IntoIterator<Item = Result<Row, FetchError>>,
        N: IntoIterator<Item = Result<Row, FetchError>>,
    {
        let mut unmatched = Unmatched::default();
        let pass = self.merge(old, new, Some(&mut unmatched))?;
        Ok((pass, unmatched))
    }

    fn merge<O, N>(
        &self,
        old: O,
        new: N,
        mut unmatched: Option<&mut Unmatched>,
    ) -> Result<Reconciliation, ReconcileError>
    where
        O: IntoIterator<Item = Result<Row, FetchError>>,
        N: IntoIterator<Item = Result<Row, FetchError>>,
    {
        let mut old = KeyedCursor::new(old.into_iter(), self.extractor, Side::Old);
        let mut new = KeyedCursor::new(new.into_iter(), self.extractor, Side::New);
        let mut tally = NewSideTally::new(self.increment_column.as_deref());
        let mut result = ReconciliationResult::new();

        let mut old_head = old.advance()?;
        let mut new_head = new.advance()?;

        loop {
            match (old_head.take(), new_head.take()) {
                (None, None) => break,
                (Some((old_key, old_row)), None) => {
                    self.old_only(old_key, &old_row, &mut result, unmatched.as_deref_mut());
                    old_head = old.advance()?;
                }
                (None, Some((new_key, new_row))) => {
                    let signature = self.extractor.extract_signature(&new_row);
                    tally.observe(&new_key, &signature, &new_row);
                    new_only(new_key, signature, &mut result, unmatched.as_deref_mut());
                    new_head = new.advance()?;
                }
                (Some((old_key, old_row)), Some((new_key, new_row))) => {
                    match old_key.cmp(&new_key) {
                        Ordering::Less => {
                            self.old_only(old_key, &old_row, &mut result, unmatched.as_deref_mut());
                            old_head = old.advance()?;
                            new_head = Some((new_key, new_row));
                        }
                        Ordering::Greater => {
                            let signature = self.extractor.extract_signature(&new_row);
                            tally.observe(&new_key, &signature, &new_row);
                            new_only(new_key, signature, &mut result, unmatched.as_deref_mut());
                            old_head = Some((old_key, old_row));
                            new_head = new.advance()?;
                        }
                        Ordering::Equal => {
                            let signature = self.extractor.extract_signature(&new_row);
                            tally.observe(&new_key, &signature, &new_row);
                            if self.extractor.extract_signature(&old_row) == signature {
                                result.unchanged.push(new_key);
                            } else {
                                result.changed.push(new_key);
                            }
                            old_head = old.advance()?;
                            new_head = new.advance()?;
                        }
                    }
                }
            }
        }

        Ok(Reconciliation {
            result,
            records_count: tally.records_count,
            rows_set_hash: hex::encode(tally.hasher.finalize()),
            max_increment: tally.max_increment,
        })
    }

    fn old_only(
        &self,
        key: RowKey,
        row: &Row,
        result: &mut ReconciliationResult,
        unmatched: Option<&mut Unmatched>,
    ) {
        match unmatched {
            Some(unmatched) => unmatched
                .old
                .push((key, self.extractor.extract_signature(row))),
            None if self.classify_old_only => result.removed.push(key),
            None => {}
        }
    }
}

fn new_only(
    key: RowKey,
    signature: RowSignature,
    result: &mut ReconciliationResult,
    unmatched: Option<&mut Unmatched>,
) {
    match unmatched {
        Some(unmatched) => unmatched.new.push((key, signature)),
        None => result.added.push(key),
    }
}
