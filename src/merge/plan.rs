//! The fixed merge plan: which tables are migrated, in what order, and how.

use std::collections::HashMap;

use crate::error::{MergeError, MergeResult};

/// How a table's rows are identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyShape {
    /// A single synthetic integer key that is reallocated on migration.
    Surrogate,
    /// Rows addressed only through a parent's foreign key; no identity of their own.
    Child,
    /// Two or more columns jointly form the key (junction tables).
    Composite,
}

/// What to do when a row collides with an existing one on a unique constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Map the source key to the existing row's key so dependents still resolve.
    Alias,
    /// Drop the row silently; its key stays unmapped.
    Skip,
    /// Insert with ignore-if-duplicate semantics.
    Ignore,
}

/// Declaration of one table in the merge plan.
#[derive(Debug, Clone)]
pub struct TableDescriptor {
    /// Table name in the database
    pub name: &'static str,
    /// Key columns: one for surrogate keys, two or more for composite keys
    pub key_columns: &'static [&'static str],
    /// Key shape
    pub shape: KeyShape,
    /// Foreign keys as (column, referenced table) pairs
    pub dependencies: &'static [(&'static str, &'static str)],
    /// Behaviour on uniqueness collisions
    pub on_conflict: ConflictPolicy,
}

impl TableDescriptor {
    /// A surrogate-keyed table. Collisions are skipped unless [`Self::alias_on_conflict`] is set.
    pub const fn surrogate(name: &'static str, key_columns: &'static [&'static str]) -> Self {
        Self {
            name,
            key_columns,
            shape: KeyShape::Surrogate,
            dependencies: &[],
            on_conflict: ConflictPolicy::Skip,
        }
    }

    /// A child table addressed by its parent's foreign key.
    pub const fn child(name: &'static str, key_columns: &'static [&'static str]) -> Self {
        Self {
            name,
            key_columns,
            shape: KeyShape::Child,
            dependencies: &[],
            on_conflict: ConflictPolicy::Skip,
        }
    }

    /// A junction table keyed by the combination of its columns.
    pub const fn composite(name: &'static str, key_columns: &'static [&'static str]) -> Self {
        Self {
            name,
            key_columns,
            shape: KeyShape::Composite,
            dependencies: &[],
            on_conflict: ConflictPolicy::Ignore,
        }
    }

    pub const fn with_dependencies(
        mut self,
        dependencies: &'static [(&'static str, &'static str)],
    ) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub const fn alias_on_conflict(mut self) -> Self {
        self.on_conflict = ConflictPolicy::Alias;
        self
    }

    /// The single key column of a surrogate-keyed table.
    pub fn surrogate_key(&self) -> Option<&'static str> {
        match (self.shape, self.key_columns) {
            (KeyShape::Surrogate, [key]) => Some(*key),
            _ => None,
        }
    }

    /// Returns true if migrated rows of this table get an identifier map.
    pub fn produces_id_map(&self) -> bool {
        self.surrogate_key().is_some()
    }
}

/// All migrated tables, in dependency order.
///
/// Tables without dependencies first, then the InputField child table, then
/// surrogate-keyed dependents, then junction tables.
pub static MERGE_PLAN: &[TableDescriptor] = &[
    TableDescriptor::surrogate("IndependentMedia", &["IndependentMediaId"]).alias_on_conflict(),
    TableDescriptor::surrogate("Location", &["LocationId"]).alias_on_conflict(),
    TableDescriptor::surrogate("Tag", &["TagId"]).alias_on_conflict(),
    TableDescriptor::child("InputField", &["LocationId", "TextTag"])
        .with_dependencies(&[("LocationId", "Location")]),
    TableDescriptor::surrogate("Bookmark", &["BookmarkId"]).with_dependencies(&[
        ("LocationId", "Location"),
        ("PublicationLocationId", "Location"),
    ]),
    TableDescriptor::surrogate("PlaylistItem", &["PlaylistItemId"]),
    TableDescriptor::surrogate("UserMark", &["UserMarkId"])
        .with_dependencies(&[("LocationId", "Location")])
        .alias_on_conflict(),
    TableDescriptor::surrogate("BlockRange", &["BlockRangeId"])
        .with_dependencies(&[("UserMarkId", "UserMark")]),
    TableDescriptor::surrogate("Note", &["NoteId"])
        .with_dependencies(&[("UserMarkId", "UserMark"), ("LocationId", "Location")])
        .alias_on_conflict(),
    TableDescriptor::surrogate("PlaylistItemMarker", &["PlaylistItemMarkerId"])
        .with_dependencies(&[("PlaylistItemId", "PlaylistItem")])
        .alias_on_conflict(),
    TableDescriptor::surrogate("TagMap", &["TagMapId"]).with_dependencies(&[
        ("TagId", "Tag"),
        ("PlaylistItemId", "PlaylistItem"),
        ("LocationId", "Location"),
        ("NoteId", "Note"),
    ]),
    TableDescriptor::composite(
        "PlaylistItemIndependentMediaMap",
        &["PlaylistItemId", "IndependentMediaId"],
    )
    .with_dependencies(&[
        ("PlaylistItemId", "PlaylistItem"),
        ("IndependentMediaId", "IndependentMedia"),
    ]),
    TableDescriptor::composite("PlaylistItemLocationMap", &["PlaylistItemId", "LocationId"])
        .with_dependencies(&[("PlaylistItemId", "PlaylistItem"), ("LocationId", "Location")]),
    TableDescriptor::composite(
        "PlaylistItemMarkerBibleVerseMap",
        &["PlaylistItemMarkerId", "VerseId"],
    )
    .with_dependencies(&[("PlaylistItemMarkerId", "PlaylistItemMarker")]),
    TableDescriptor::composite(
        "PlaylistItemMarkerParagraphMap",
        &[
            "PlaylistItemMarkerId",
            "MepsDocumentId",
            "ParagraphIndex",
            "MarkerIndexWithinParagraph",
        ],
    )
    .with_dependencies(&[("PlaylistItemMarkerId", "PlaylistItemMarker")]),
];

/// Names of every migrated table, in plan order.
pub fn table_names(plan: &[TableDescriptor]) -> Vec<&'static str> {
    plan.iter().map(|t| t.name).collect()
}

/// Check that `plan` is a valid topological order.
///
/// Every dependency must point at a surrogate-keyed table declared earlier,
/// since only those produce identifier maps.
pub fn validate_plan(plan: &[TableDescriptor]) -> MergeResult<()> {
    let mut seen: HashMap<&str, &TableDescriptor> = HashMap::new();

    for table in plan {
        if seen.contains_key(table.name) {
            return Err(MergeError::Plan(format!(
                "table {} is declared more than once",
                table.name
            )));
        }

        match table.shape {
            KeyShape::Surrogate if table.key_columns.len() != 1 => {
                return Err(MergeError::Plan(format!(
                    "surrogate-keyed table {} must have exactly one key column",
                    table.name
                )));
            }
            KeyShape::Composite if table.key_columns.len() < 2 => {
                return Err(MergeError::Plan(format!(
                    "composite-keyed table {} needs at least two key columns",
                    table.name
                )));
            }
            KeyShape::Child if table.dependencies.is_empty() => {
                return Err(MergeError::Plan(format!(
                    "child table {} must reference a parent",
                    table.name
                )));
            }
            _ => {}
        }

        for (column, parent) in table.dependencies {
            match seen.get(parent) {
                Some(p) if p.produces_id_map() => {}
                Some(_) => {
                    return Err(MergeError::Plan(format!(
                        "{}.{} references {}, which has no surrogate key to map",
                        table.name, column, parent
                    )));
                }
                None => {
                    return Err(MergeError::Plan(format!(
                        "{}.{} references {}, which is not declared before it",
                        table.name, column, parent
                    )));
                }
            }
        }

        seen.insert(table.name, table);
    }

    Ok(())
}
