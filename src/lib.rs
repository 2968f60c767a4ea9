//! JW Library backup merge.
//!
//! Combines two independently evolved copies of a JW Library user-data
//! backup into one, without losing or duplicating user data:
//! - **merge**: the database merge engine (key reallocation, foreign-key
//!   rewriting, conflict aliasing) driven by a fixed table plan
//! - **schema** / **store**: SQLite introspection and row access
//! - **bundle** / **pipeline**: unpacking, resource copying and repacking of
//!   `.jwlibrary` archives around the database merge
//! - **server**: the upload/merge/download HTTP endpoint
//!
//! # Example
//! ```no_run
//! use jwlibrary_merge::merge_databases;
//!
//! let report = merge_databases("backup2/userData.db", "backup1/userData.db")?;
//! println!("{} rows written", report.total_writes);
//! # Ok::<(), jwlibrary_merge::MergeError>(())
//! ```

pub mod bundle;
pub mod config;
pub mod error;
pub mod merge;
pub mod pipeline;
pub mod schema;
pub mod server;
pub mod store;
pub mod telemetry;

pub use config::ServiceConfig;
pub use error::{MergeError, MergeResult};
pub use merge::{
    merge_connections, merge_databases, merge_with_plan, Diagnostic, IdentifierMap, MergeOutcome,
    MergeReport, TableDescriptor, TableReport, MERGE_PLAN,
};
pub use pipeline::{merge_archives, PipelineOutput};
