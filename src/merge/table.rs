//! Migration of one table's rows into the destination.

use rusqlite::Connection;

use super::conflict::{normalize_columns, ConflictResolver};
use super::id_map::{IdAllocator, IdentifierMap};
use super::plan::{ConflictPolicy, KeyShape, TableDescriptor};
use super::{Diagnostic, TableReport};
use crate::error::{MergeError, MergeResult};
use crate::schema::TableSchema;
use crate::store::{self, InsertMode, InsertOutcome, Row, Value};

/// Which migration protocol a table follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeVariant {
    /// Surrogate key, no foreign keys.
    Independent,
    /// Addressed only by a parent's foreign key.
    DependentChild,
    /// Surrogate key plus foreign keys.
    Dependent,
    /// Composite key made of foreign keys.
    Junction,
}

impl MergeVariant {
    pub fn of(descriptor: &TableDescriptor) -> Self {
        match descriptor.shape {
            KeyShape::Surrogate if descriptor.dependencies.is_empty() => MergeVariant::Independent,
            KeyShape::Surrogate => MergeVariant::Dependent,
            KeyShape::Child => MergeVariant::DependentChild,
            KeyShape::Composite => MergeVariant::Junction,
        }
    }
}

/// A foreign-key column resolved against the table schema.
struct ForeignKey {
    index: usize,
    column: &'static str,
    parent: &'static str,
}

/// Migrates the rows of a single table.
pub(crate) struct TableMerger<'a> {
    descriptor: &'a TableDescriptor,
    schema: &'a TableSchema,
    destination: &'a Connection,
    foreign_keys: Vec<ForeignKey>,
}

impl<'a> TableMerger<'a> {
    /// `schema` carries the columns read from the source and the unique
    /// constraints declared in the destination.
    pub fn new(
        descriptor: &'a TableDescriptor,
        schema: &'a TableSchema,
        destination: &'a Connection,
    ) -> MergeResult<Self> {
        let foreign_keys = descriptor
            .dependencies
            .iter()
            .map(|&(column, parent)| {
                Ok(ForeignKey {
                    index: schema.index_of(column)?,
                    column,
                    parent,
                })
            })
            .collect::<MergeResult<Vec<_>>>()?;

        Ok(Self {
            descriptor,
            schema,
            destination,
            foreign_keys,
        })
    }

    /// Migrate `rows`, updating `ids` and appending to `diagnostics`.
    pub fn run(
        &self,
        rows: Vec<Row>,
        ids: &mut IdentifierMap,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> MergeResult<TableReport> {
        let mut report = TableReport::new(self.descriptor.name);

        match MergeVariant::of(self.descriptor) {
            MergeVariant::Independent | MergeVariant::Dependent => {
                let key = self.surrogate_key()?;
                self.merge_keyed(key, rows, ids, diagnostics, &mut report)?
            }
            MergeVariant::DependentChild | MergeVariant::Junction => {
                self.merge_unkeyed(rows, ids, diagnostics, &mut report)?
            }
        }

        Ok(report)
    }

    fn surrogate_key(&self) -> MergeResult<&'static str> {
        self.descriptor.surrogate_key().ok_or_else(|| {
            MergeError::Plan(format!("{} has no surrogate key", self.descriptor.name))
        })
    }

    /// Variants (a) and (c): reallocate the surrogate key, remap foreign keys.
    fn merge_keyed(
        &self,
        key: &'static str,
        rows: Vec<Row>,
        ids: &mut IdentifierMap,
        diagnostics: &mut Vec<Diagnostic>,
        report: &mut TableReport,
    ) -> MergeResult<()> {
        let table = self.descriptor.name;
        let key_index = self.schema.index_of(key)?;
        let mut allocator = IdAllocator::for_table(self.destination, table, key)?;
        let resolver = ConflictResolver::new(self.destination, self.schema);

        for row in rows {
            let old_key = row.integer(key_index).ok_or_else(|| {
                MergeError::Schema(format!("{}.{} holds a non-integer key", table, key))
            })?;

            let mut new_row = row.clone();
            if let Err(diagnostic) = self.remap_foreign_keys(&mut new_row, ids) {
                report.unresolved_dependencies += 1;
                push_diagnostic(diagnostics, diagnostic);
                continue;
            }
            new_row.set(key_index, Value::Integer(allocator.peek()));

            match store::insert_row(self.destination, self.schema, &new_row, InsertMode::Strict)? {
                InsertOutcome::Inserted => {
                    ids.insert(table, old_key, allocator.advance()?);
                    report.inserted += 1;
                }
                InsertOutcome::Ignored => report.duplicates_skipped += 1,
                InsertOutcome::UniqueViolation { columns } => match self.descriptor.on_conflict {
                    ConflictPolicy::Alias => {
                        let existing = resolver
                            .resolve(&columns, &new_row)?
                            .and_then(|existing| existing.integer(key_index));
                        match existing {
                            Some(existing_key) => {
                                tracing::debug!(
                                    table,
                                    old_key,
                                    existing_key,
                                    "aliased duplicate row"
                                );
                                ids.insert(table, old_key, existing_key);
                                report.aliased += 1;
                            }
                            None => {
                                report.unmatched_conflicts += 1;
                                push_diagnostic(
                                    diagnostics,
                                    Diagnostic::ConflictUnresolved {
                                        table: table.to_string(),
                                        columns: normalize_columns(table, &columns),
                                    },
                                );
                            }
                        }
                    }
                    ConflictPolicy::Skip | ConflictPolicy::Ignore => {
                        report.duplicates_skipped += 1;
                    }
                },
            }
        }

        Ok(())
    }

    /// Variants (b) and (d): no identity of their own, so only foreign keys change
    /// and collisions are always treated as deduplication.
    fn merge_unkeyed(
        &self,
        rows: Vec<Row>,
        ids: &IdentifierMap,
        diagnostics: &mut Vec<Diagnostic>,
        report: &mut TableReport,
    ) -> MergeResult<()> {
        let mode = match self.descriptor.on_conflict {
            ConflictPolicy::Ignore => InsertMode::IgnoreDuplicates,
            ConflictPolicy::Alias | ConflictPolicy::Skip => InsertMode::Strict,
        };

        for row in rows {
            let mut new_row = row.clone();
            if let Err(diagnostic) = self.remap_foreign_keys(&mut new_row, ids) {
                report.unresolved_dependencies += 1;
                push_diagnostic(diagnostics, diagnostic);
                continue;
            }

            match store::insert_row(self.destination, self.schema, &new_row, mode)? {
                InsertOutcome::Inserted => report.inserted += 1,
                InsertOutcome::Ignored | InsertOutcome::UniqueViolation { .. } => {
                    report.duplicates_skipped += 1;
                }
            }
        }

        Ok(())
    }

    /// Rewrite every foreign key of `row` through `ids`.
    ///
    /// NULL references pass through. The first unmapped reference stops the
    /// rewrite; the caller discards the partially rewritten row.
    fn remap_foreign_keys(&self, row: &mut Row, ids: &IdentifierMap) -> Result<(), Diagnostic> {
        for fk in &self.foreign_keys {
            let resolved = match row.get(fk.index) {
                Value::Null => continue,
                Value::Integer(old) => ids.resolve(fk.parent, *old),
                _ => None,
            };

            match resolved {
                Some(new) => row.set(fk.index, Value::Integer(new)),
                None => {
                    return Err(Diagnostic::UnresolvableDependency {
                        table: self.descriptor.name.to_string(),
                        column: fk.column.to_string(),
                        referenced_table: fk.parent.to_string(),
                        value: display_value(row.get(fk.index)),
                    });
                }
            }
        }
        Ok(())
    }
}

fn push_diagnostic(diagnostics: &mut Vec<Diagnostic>, diagnostic: Diagnostic) {
    tracing::warn!(%diagnostic, "row dropped");
    diagnostics.push(diagnostic);
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(v) => v.to_string(),
        Value::Real(v) => v.to_string(),
        Value::Text(v) => v.clone(),
        Value::Blob(v) => format!("<{} byte blob>", v.len()),
    }
}
