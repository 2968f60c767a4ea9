//! SQLite store access used by the merge.
//!
//! Everything the merge needs from a store goes through here: opening the two
//! databases, scanning a table, inserting a row, and looking a row up by exact
//! column values. Inserts report uniqueness collisions as data
//! ([`InsertOutcome::UniqueViolation`]) rather than as errors, so the caller
//! can decide whether to alias, skip, or ignore.

use std::path::Path;

use rusqlite::{params_from_iter, Connection, ErrorCode, OpenFlags, OptionalExtension};

pub use rusqlite::types::Value;

use crate::error::MergeResult;
use crate::schema::{quote_ident, TableSchema};

/// One row of a table, shaped by the table's column list.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Values in the same order as [`TableSchema::columns`]
    pub values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, index: usize) -> &Value {
        &self.values[index]
    }

    pub fn set(&mut self, index: usize, value: Value) {
        self.values[index] = value;
    }

    /// Integer value at `index`, if it holds one.
    pub fn integer(&self, index: usize) -> Option<i64> {
        match self.values[index] {
            Value::Integer(v) => Some(v),
            _ => None,
        }
    }
}

/// How an insert treats a uniqueness collision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMode {
    /// Plain insert; a collision is reported as [`InsertOutcome::UniqueViolation`]
    Strict,
    /// `INSERT OR IGNORE`; a collision is reported as [`InsertOutcome::Ignored`]
    IgnoreDuplicates,
}

/// Result of a single insert attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Ignored,
    /// The row collided with an existing one on `columns`.
    UniqueViolation { columns: Vec<String> },
}

/// Open a database read-only (the migration source).
pub fn open_source(path: impl AsRef<Path>) -> MergeResult<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    Ok(conn)
}

/// Open an existing database read-write (the merge destination).
pub fn open_destination(path: impl AsRef<Path>) -> MergeResult<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    Ok(conn)
}

/// Read every row of the table described by `schema`, in scan order.
pub fn scan_rows(conn: &Connection, schema: &TableSchema) -> MergeResult<Vec<Row>> {
    let sql = format!(
        "SELECT {} FROM {}",
        column_list(&schema.columns),
        quote_ident(&schema.name)
    );
    let width = schema.columns.len();

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            let values = (0..width)
                .map(|i| row.get::<_, Value>(i))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Row::new(values))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Insert `row` into the table described by `schema`.
///
/// Only uniqueness failures are turned into an outcome; every other failure
/// (including other constraint kinds) is returned as an error.
pub fn insert_row(
    conn: &Connection,
    schema: &TableSchema,
    row: &Row,
    mode: InsertMode,
) -> MergeResult<InsertOutcome> {
    let verb = match mode {
        InsertMode::Strict => "INSERT",
        InsertMode::IgnoreDuplicates => "INSERT OR IGNORE",
    };
    let placeholders = vec!["?"; schema.columns.len()].join(", ");
    let sql = format!(
        "{} INTO {} ({}) VALUES ({})",
        verb,
        quote_ident(&schema.name),
        column_list(&schema.columns),
        placeholders
    );

    let mut stmt = conn.prepare_cached(&sql)?;
    match stmt.execute(params_from_iter(row.values.iter())) {
        Ok(0) => Ok(InsertOutcome::Ignored),
        Ok(_) => Ok(InsertOutcome::Inserted),
        Err(rusqlite::Error::SqliteFailure(err, message)) if is_unique_violation(&err) => {
            let columns = violated_columns(conn, schema, row, message)?;
            Ok(InsertOutcome::UniqueViolation { columns })
        }
        Err(e) => Err(e.into()),
    }
}

/// Find the row whose values for `columns` equal `values` exactly.
pub fn find_row(
    conn: &Connection,
    schema: &TableSchema,
    columns: &[String],
    values: &[Value],
) -> MergeResult<Option<Row>> {
    let where_clause = columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} = ?{}", quote_ident(c), i + 1))
        .collect::<Vec<_>>()
        .join(" AND ");
    let sql = format!(
        "SELECT {} FROM {} WHERE {} LIMIT 1",
        column_list(&schema.columns),
        quote_ident(&schema.name),
        where_clause
    );
    let width = schema.columns.len();

    let mut stmt = conn.prepare_cached(&sql)?;
    let row = stmt
        .query_row(params_from_iter(values.iter()), |row| {
            let values = (0..width)
                .map(|i| row.get::<_, Value>(i))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Row::new(values))
        })
        .optional()?;

    Ok(row)
}

/// Largest value of `key_column` in `table`, or `None` if the table is empty.
pub fn max_key(conn: &Connection, table: &str, key_column: &str) -> MergeResult<Option<i64>> {
    let sql = format!(
        "SELECT MAX({}) FROM {}",
        quote_ident(key_column),
        quote_ident(table)
    );
    let max = conn.query_row(&sql, [], |row| row.get::<_, Option<i64>>(0))?;
    Ok(max)
}

fn is_unique_violation(err: &rusqlite::ffi::Error) -> bool {
    err.code == ErrorCode::ConstraintViolation
        && (err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
            || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
}

/// Work out which unique constraint `row` collided with.
///
/// The first introspected constraint for which the store already holds a row
/// with the same values wins. If none matches, the store's own label is
/// handed back as-is for the resolver to split.
fn violated_columns(
    conn: &Connection,
    schema: &TableSchema,
    row: &Row,
    message: Option<String>,
) -> MergeResult<Vec<String>> {
    for constraint in &schema.unique_constraints {
        // Constraints over columns the source doesn't carry can't be probed.
        let Some(values) = constraint
            .columns
            .iter()
            .map(|c| schema.columns.iter().position(|x| x == c).map(|i| row.get(i).clone()))
            .collect::<Option<Vec<_>>>()
        else {
            continue;
        };

        // NULLs never collide under a unique index.
        if values.iter().any(|v| *v == Value::Null) {
            continue;
        }

        if find_row(conn, schema, &constraint.columns, &values)?.is_some() {
            return Ok(constraint.columns.clone());
        }
    }

    Ok(message.into_iter().collect())
}

fn column_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}
