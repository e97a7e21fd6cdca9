//! Outcome of reconciling two row sets

use crate::row::RowKey;
use serde::{Deserialize, Serialize};

/// Four disjoint key sets partitioning the union of both inputs
///
/// Each list is in ascending key order, which is the order the keys were
/// produced in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    /// Keys present only in the new set
    pub added: Vec<RowKey>,

    /// Keys present only in the old set
    pub removed: Vec<RowKey>,

    /// Keys in both sets whose signatures differ
    pub changed: Vec<RowKey>,

    /// Keys in both sets with equal signatures
    pub unchanged: Vec<RowKey>,
}

/// Counts of a [`ReconciliationResult`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationSummary {
    pub added: usize,
    pub removed: usize,
    pub changed: usize,
    pub unchanged: usize,
}

impl ReconciliationSummary {
    /// Size of the union of both input key sets
    pub fn total(&self) -> usize {
        self.added + self.removed + self.changed + self.unchanged
    }
}

impl ReconciliationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summary(&self) -> ReconciliationSummary {
        ReconciliationSummary {
            added: self.added.len(),
            removed: self.removed.len(),
            changed: self.changed.len(),
            unchanged: self.unchanged.len(),
        }
    }

    /// Whether anything differs between the two sets
    pub fn has_changes(&self) -> bool {
        !(self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty())
    }

    /// Append the result of a later, disjoint key range (e.g. the next chunk)
    pub fn merge(&mut self, other: ReconciliationResult) {
        self.added.extend(other.added);
        self.removed.extend(other.removed);
        self.changed.extend(other.changed);
        self.unchanged.extend(other.unchanged);
    }

    /// Swap the roles of old and new
    pub fn inverted(self) -> Self {
        Self {
            added: self.removed,
            removed: self.added,
            changed: self.changed,
            unchanged: self.unchanged,
        }
    }
}
