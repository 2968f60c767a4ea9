//! Run-scoped identifier translation and allocation.

use std::collections::HashMap;

use rusqlite::Connection;

use crate::error::{MergeError, MergeResult};
use crate::store;

/// Per-table translation from source identifiers to destination identifiers.
///
/// Created fresh for every merge run and owned by it.
#[derive(Debug, Clone, Default)]
pub struct IdentifierMap {
    tables: HashMap<&'static str, HashMap<i64, i64>>,
}

impl IdentifierMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that source key `old` of `table` now lives at `new`.
    pub fn insert(&mut self, table: &'static str, old: i64, new: i64) {
        self.tables.entry(table).or_default().insert(old, new);
    }

    /// Destination key for source key `old` of `table`.
    pub fn resolve(&self, table: &str, old: i64) -> Option<i64> {
        self.tables.get(table).and_then(|m| m.get(&old)).copied()
    }

    /// Every mapping recorded for `table`.
    pub fn table(&self, table: &str) -> Option<&HashMap<i64, i64>> {
        self.tables.get(table)
    }

    /// Number of mappings recorded for `table`.
    pub fn len(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.values().all(HashMap::is_empty)
    }
}

/// Hands out fresh surrogate keys for one destination table.
///
/// The starting point is read from the store once; after that the counter only
/// advances in memory, so a key is never handed out twice within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdAllocator {
    next: i64,
}

impl IdAllocator {
    /// Start one past the current maximum of `key_column`, or at 1 for an empty table.
    pub fn for_table(conn: &Connection, table: &str, key_column: &str) -> MergeResult<Self> {
        let max = store::max_key(conn, table, key_column)?;
        Self::starting_after(max)
    }

    /// Fails when `max` is already the largest representable key.
    pub fn starting_after(max: Option<i64>) -> MergeResult<Self> {
        let next = match max {
            Some(m) => m.checked_add(1).ok_or_else(key_space_exhausted)?,
            None => 1,
        };
        Ok(Self { next })
    }

    /// The key the next successful insert will use.
    pub fn peek(&self) -> i64 {
        self.next
    }

    /// Consume the current key after a successful insert.
    pub fn advance(&mut self) -> MergeResult<i64> {
        let id = self.next;
        self.next = id.checked_add(1).ok_or_else(key_space_exhausted)?;
        Ok(id)
    }
}

fn key_space_exhausted() -> MergeError {
    MergeError::Store(format!("surrogate key space exhausted at {}", i64::MAX))
}
