//! Table introspection.
//!
//! Reads a table's declared column list and its unique indexes straight from
//! the store, so the merge never hard-codes column positions. Composite
//! primary keys show up as unique indexes too (`sqlite_autoindex_*`), which is
//! what lets junction tables report their collisions the same way.

use rusqlite::Connection;

use crate::error::{MergeError, MergeResult};

/// An ordered set of columns whose combined values are unique within a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueConstraint {
    /// Index name as reported by the store
    pub name: String,
    /// Participating columns, in index order
    pub columns: Vec<String>,
}

/// Column layout and uniqueness constraints of one table.
#[derive(Debug, Clone)]
pub struct TableSchema {
    /// Table name
    pub name: String,
    /// Columns in declared order
    pub columns: Vec<String>,
    /// One entry per unique index
    pub unique_constraints: Vec<UniqueConstraint>,
}

impl TableSchema {
    /// Position of `column` in the declared column list.
    pub fn index_of(&self, column: &str) -> MergeResult<usize> {
        self.columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| {
                MergeError::Schema(format!(
                    "column {} does not exist in table {}",
                    column, self.name
                ))
            })
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}

/// Introspect both the columns and the unique constraints of `table`.
pub fn introspect(conn: &Connection, table: &str) -> MergeResult<TableSchema> {
    Ok(TableSchema {
        name: table.to_string(),
        columns: columns(conn, table)?,
        unique_constraints: unique_constraints(conn, table)?,
    })
}

/// Column names of `table` in declared order.
///
/// Fails with [`MergeError::Schema`] when the table does not exist.
pub fn columns(conn: &Connection, table: &str) -> MergeResult<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
    let columns = stmt
        .query_map([table], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    if columns.is_empty() {
        return Err(MergeError::Schema(format!("table {} does not exist", table)));
    }
    Ok(columns)
}

/// Declared unique indexes of `table`.
///
/// Single-column constraints are returned as one-element column lists.
/// Indexes on expressions are skipped since they cannot be matched by column.
pub fn unique_constraints(conn: &Connection, table: &str) -> MergeResult<Vec<UniqueConstraint>> {
    let mut list = conn.prepare("SELECT name, \"unique\" FROM pragma_index_list(?1)")?;
    let indexes = list
        .query_map([table], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut info = conn.prepare("SELECT name FROM pragma_index_info(?1) ORDER BY seqno")?;
    let mut constraints = Vec::new();

    for (index_name, unique) in indexes {
        if unique != 1 {
            continue;
        }

        let names = info
            .query_map([&index_name], |row| row.get::<_, Option<String>>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        // An expression column has no name.
        let Some(columns) = names.into_iter().collect::<Option<Vec<_>>>() else {
            continue;
        };
        if columns.is_empty() {
            continue;
        }

        constraints.push(UniqueConstraint {
            name: index_name,
            columns,
        });
    }

    Ok(constraints)
}

/// Quote an identifier for interpolation into SQL text.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
