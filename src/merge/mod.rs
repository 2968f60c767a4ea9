//! Database merge: migrates every planned table from a source snapshot into a
//! destination snapshot of the same schema.
//!
//! Surrogate keys are reallocated in the destination and the old-to-new
//! translation is kept in an [`IdentifierMap`] for the whole run, so foreign
//! keys of later tables can be rewritten. Rows that collide with an existing
//! row on a unique constraint are either aliased to that row, skipped, or
//! ignored, depending on the table's [`ConflictPolicy`].
//!
//! The destination is written inside one transaction that is committed only
//! after the last table; any fatal error leaves it untouched.

mod conflict;
mod id_map;
mod plan;
mod table;

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};

use crate::error::{MergeError, MergeResult};
use crate::schema::{self, TableSchema};
use crate::store;

pub use conflict::{normalize_columns, ConflictResolver};
pub use id_map::{IdAllocator, IdentifierMap};
pub use plan::{table_names, validate_plan, ConflictPolicy, KeyShape, TableDescriptor, MERGE_PLAN};
pub use table::MergeVariant;
use table::TableMerger;

/// A row-local condition that caused a source row to be dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// A foreign key points at a parent row that has no destination identifier.
    UnresolvableDependency {
        table: String,
        column: String,
        referenced_table: String,
        value: String,
    },
    /// A unique constraint was violated but no matching destination row was found.
    ConflictUnresolved { table: String, columns: Vec<String> },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::UnresolvableDependency {
                table,
                column,
                referenced_table,
                value,
            } => write!(
                f,
                "{}.{} = {} has no mapping in {}",
                table, column, value, referenced_table
            ),
            Diagnostic::ConflictUnresolved { table, columns } => write!(
                f,
                "{} collided on ({}) but no existing row matched",
                table,
                columns.join(", ")
            ),
        }
    }
}

/// Per-table statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableReport {
    /// Table name
    pub table: String,
    /// Rows written to the destination
    pub inserted: u32,
    /// Source rows mapped onto an existing destination row
    pub aliased: u32,
    /// Source rows dropped as duplicates without an alias
    pub duplicates_skipped: u32,
    /// Source rows dropped because a foreign key could not be resolved
    pub unresolved_dependencies: u32,
    /// Source rows dropped because no conflicting row could be located
    pub unmatched_conflicts: u32,
}

impl TableReport {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            ..Self::default()
        }
    }
}

/// Outcome of a merge run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeReport {
    /// Total rows written across all tables
    pub total_writes: u32,
    /// Statistics per table, in plan order
    pub tables: Vec<TableReport>,
    /// Every dropped-row condition, in the order encountered
    pub diagnostics: Vec<Diagnostic>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl MergeReport {
    /// Statistics for `table`, if it was part of the run.
    pub fn table(&self, table: &str) -> Option<&TableReport> {
        self.tables.iter().find(|t| t.table == table)
    }
}

/// Report plus the identifier translation built during the run.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub report: MergeReport,
    pub id_map: IdentifierMap,
}

/// Main entry point: merge the database at `source_path` into the one at
/// `destination_path`.
///
/// The source is opened read-only. The destination is committed once, after
/// every table has been processed.
pub fn merge_databases(
    source_path: impl AsRef<Path>,
    destination_path: impl AsRef<Path>,
) -> MergeResult<MergeReport> {
    let source = store::open_source(source_path)?;
    let mut destination = store::open_destination(destination_path)?;
    let outcome = merge_connections(&source, &mut destination)?;
    Ok(outcome.report)
}

/// Merge `source` into `destination` using [`MERGE_PLAN`].
pub fn merge_connections(
    source: &Connection,
    destination: &mut Connection,
) -> MergeResult<MergeOutcome> {
    merge_with_plan(MERGE_PLAN, source, destination)
}

/// Merge `source` into `destination` following `plan`.
pub fn merge_with_plan(
    plan: &[TableDescriptor],
    source: &Connection,
    destination: &mut Connection,
) -> MergeResult<MergeOutcome> {
    validate_plan(plan)?;

    let started_at = Utc::now();
    let tx = destination.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let mut id_map = IdentifierMap::new();
    let mut diagnostics = Vec::new();
    let mut tables = Vec::with_capacity(plan.len());
    let mut total_writes = 0;

    for descriptor in plan {
        let schema = write_schema(source, &tx, descriptor)?;
        let rows = store::scan_rows(source, &schema)?;
        let row_count = rows.len();

        let merger = TableMerger::new(descriptor, &schema, &tx)?;
        let report = merger.run(rows, &mut id_map, &mut diagnostics)?;

        tracing::info!(
            table = descriptor.name,
            variant = ?MergeVariant::of(descriptor),
            source_rows = row_count,
            inserted = report.inserted,
            aliased = report.aliased,
            skipped = report.duplicates_skipped,
            unresolved = report.unresolved_dependencies,
            "merged table"
        );

        total_writes += report.inserted;
        tables.push(report);
    }

    tx.commit()?;

    tracing::info!(
        total_writes,
        dropped_rows = diagnostics.len(),
        "database merge committed"
    );

    Ok(MergeOutcome {
        report: MergeReport {
            total_writes,
            tables,
            diagnostics,
            started_at,
            finished_at: Utc::now(),
        },
        id_map,
    })
}

/// Build the schema used to move `descriptor`'s rows: the source's column
/// list with the destination's unique constraints.
///
/// Fails if the plan names a column the source lacks, or the source has a
/// column the destination lacks.
fn write_schema(
    source: &Connection,
    destination: &Connection,
    descriptor: &TableDescriptor,
) -> MergeResult<TableSchema> {
    let source_columns = schema::columns(source, descriptor.name)?;
    let destination_schema = schema::introspect(destination, descriptor.name)?;

    let planned = descriptor
        .key_columns
        .iter()
        .chain(descriptor.dependencies.iter().map(|(column, _)| column));
    for column in planned {
        if !source_columns.iter().any(|c| c == column) {
            return Err(MergeError::Schema(format!(
                "column {} declared for {} is missing from the source",
                column, descriptor.name
            )));
        }
    }

    if let Some(extra) = source_columns
        .iter()
        .find(|c| !destination_schema.has_column(c))
    {
        return Err(MergeError::Schema(format!(
            "column {}.{} exists in the source but not in the destination",
            descriptor.name, extra
        )));
    }

    Ok(TableSchema {
        name: descriptor.name.to_string(),
        columns: source_columns,
        unique_constraints: destination_schema.unique_constraints,
    })
}
