//! Locating the existing row behind a uniqueness collision.

use rusqlite::Connection;

use crate::error::MergeResult;
use crate::schema::TableSchema;
use crate::store::{self, Row};

/// Prefix SQLite puts in front of the violated-column label.
const UNIQUE_FAILED_PREFIX: &str = "UNIQUE constraint failed:";

/// Finds the destination row a colliding insert would have duplicated.
pub struct ConflictResolver<'a> {
    conn: &'a Connection,
    schema: &'a TableSchema,
}

impl<'a> ConflictResolver<'a> {
    pub fn new(conn: &'a Connection, schema: &'a TableSchema) -> Self {
        Self { conn, schema }
    }

    /// Return the destination row whose values for the violated columns equal
    /// those of `attempted`, or `None` when no such row exists.
    pub fn resolve(&self, violated: &[String], attempted: &Row) -> MergeResult<Option<Row>> {
        let columns = normalize_columns(&self.schema.name, violated);
        if columns.is_empty() {
            return Ok(None);
        }

        let mut values = Vec::with_capacity(columns.len());
        for column in &columns {
            let Ok(index) = self.schema.index_of(column) else {
                tracing::debug!(
                    table = %self.schema.name,
                    column = %column,
                    "violated column not in table schema"
                );
                return Ok(None);
            };
            values.push(attempted.get(index).clone());
        }

        store::find_row(self.conn, self.schema, &columns, &values)
    }
}

/// Turn the violated-column report into plain column names.
///
/// Entries may already be single names, or a combined store label such as
/// `UNIQUE constraint failed: Tag.Type, Tag.Name`; the label is split and the
/// table qualifier dropped.
pub fn normalize_columns(table: &str, violated: &[String]) -> Vec<String> {
    let qualifier = format!("{}.", table);

    violated
        .iter()
        .flat_map(|entry| {
            entry
                .trim()
                .trim_start_matches(UNIQUE_FAILED_PREFIX)
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(|c| c.strip_prefix(qualifier.as_str()).unwrap_or(c).to_string())
                .collect::<Vec<_>>()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::introspect;
    use crate::store::Value;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_plain_columns() {
        assert_eq!(
            normalize_columns("Tag", &strings(&["Type", "Name"])),
            strings(&["Type", "Name"])
        );
    }

    #[test]
    fn test_normalize_combined_label() {
        assert_eq!(
            normalize_columns("Tag", &strings(&["UNIQUE constraint failed: Tag.Type, Tag.Name"])),
            strings(&["Type", "Name"])
        );
        assert_eq!(
            normalize_columns("Location", &strings(&["Location.KeySymbol, Location.Type"])),
            strings(&["KeySymbol", "Type"])
        );
    }

    #[test]
    fn test_resolve_finds_existing_row() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE Tag (
                TagId INTEGER NOT NULL PRIMARY KEY,
                Type INTEGER NOT NULL,
                Name TEXT NOT NULL,
                UNIQUE (Type, Name)
            );
            INSERT INTO Tag VALUES (3, 1, 'Study');",
        )
        .unwrap();
        let schema = introspect(&conn, "Tag").unwrap();
        let resolver = ConflictResolver::new(&conn, &schema);

        let attempted = Row::new(vec![
            Value::Integer(8),
            Value::Integer(1),
            Value::Text("Study".to_string()),
        ]);
        let found = resolver
            .resolve(&strings(&["Tag.Type, Tag.Name"]), &attempted)
            .unwrap()
            .unwrap();
        assert_eq!(found.get(0), &Value::Integer(3));

        let other = Row::new(vec![
            Value::Integer(8),
            Value::Integer(2),
            Value::Text("Study".to_string()),
        ]);
        assert!(resolver.resolve(&strings(&["Type", "Name"]), &other).unwrap().is_none());
        assert!(resolver.resolve(&strings(&["Bogus"]), &other).unwrap().is_none());
        assert!(resolver.resolve(&[], &other).unwrap().is_none());
    }
}
