//! Core types for the versioned store.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a record within one table.
///
/// Identities are assigned monotonically by [`Table::create`] and are
/// never reused: removing a record retires its id, and only undoing the
/// scope that created it returns the id to the pool.
///
/// [`Table::create`]: crate::Table::create
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct RecordId(pub u64);

impl RecordId {
    /// The identity assigned after this one.
    pub fn next(self) -> Self {
        RecordId(self.0 + 1)
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self.0)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Store statistics.
#[derive(Clone, Debug, Default)]
pub struct StoreStats {
    pub table_count: usize,
    pub record_count: u64,
    pub revision: u64,
    pub commit_floor: u64,
    pub open_scopes: u64,
}
