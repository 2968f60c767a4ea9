//! End-to-end merge of two backup archives.
//!
//! Both archives are unpacked into the working directory, the larger
//! database becomes the destination, the smaller one is merged into it, the
//! source's media files are copied across, and the destination directory is
//! packed into `merged.jwlibrary`. The extraction directories are always
//! cleared afterwards.

use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::bundle::{self, DATABASE_FILE, RESOURCE_EXCLUDES};
use crate::error::{MergeError, MergeResult};
use crate::merge::{merge_databases, MergeReport};

/// Extraction directory of the first upload.
pub const MAIN_DIR: &str = "main";
/// Extraction directory of the second upload.
pub const TO_MERGE_DIR: &str = "toMerge";
/// Output archive name.
pub const MERGED_ARCHIVE: &str = "merged.jwlibrary";

/// Which extracted snapshot plays which role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roles {
    /// Directory whose database is migrated (the smaller one)
    pub source_dir: PathBuf,
    /// Directory whose database receives the rows (the larger one)
    pub destination_dir: PathBuf,
}

/// Result of a successful pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Path of the packed archive
    pub archive: PathBuf,
    /// Database merge report
    pub report: MergeReport,
    /// Number of media files copied from the source backup
    pub resources_copied: usize,
}

/// Merge the backups `main` and `to_merge` inside `work_dir`.
pub fn merge_archives(work_dir: &Path, main: &Path, to_merge: &Path) -> MergeResult<PipelineOutput> {
    let main_dir = work_dir.join(MAIN_DIR);
    let to_merge_dir = work_dir.join(TO_MERGE_DIR);

    let result = run(work_dir, main, to_merge, &main_dir, &to_merge_dir);

    let started = Instant::now();
    bundle::clear_dir(&main_dir);
    bundle::clear_dir(&to_merge_dir);
    tracing::info!(elapsed_ms = started.elapsed().as_millis() as u64, "cleanup completed");

    result
}

fn run(
    work_dir: &Path,
    main: &Path,
    to_merge: &Path,
    main_dir: &Path,
    to_merge_dir: &Path,
) -> MergeResult<PipelineOutput> {
    let total = Instant::now();

    for archive in [main, to_merge] {
        if !archive.exists() {
            return Err(MergeError::MissingInput(format!(
                "archive {} does not exist",
                archive.display()
            )));
        }
    }

    // Leftovers from an interrupted run would mix into this one.
    bundle::clear_dir(main_dir);
    bundle::clear_dir(to_merge_dir);

    bundle::extract(main, main_dir)?;
    bundle::extract(to_merge, to_merge_dir)?;

    let roles = choose_roles(main_dir, to_merge_dir)?;
    tracing::info!(
        source = %roles.source_dir.display(),
        destination = %roles.destination_dir.display(),
        "selected merge roles"
    );

    let started = Instant::now();
    let report = merge_databases(
        roles.source_dir.join(DATABASE_FILE),
        roles.destination_dir.join(DATABASE_FILE),
    )?;
    tracing::info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        total_writes = report.total_writes,
        "database merge completed"
    );

    let started = Instant::now();
    let resources_copied =
        bundle::copy_resources(&roles.source_dir, &roles.destination_dir, RESOURCE_EXCLUDES)?;
    bundle::refresh_manifest(&roles.destination_dir)?;
    tracing::info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        files = resources_copied,
        "resource copy completed"
    );

    let started = Instant::now();
    let archive = work_dir.join(MERGED_ARCHIVE);
    bundle::pack(&roles.destination_dir, &archive)?;
    tracing::info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        archive = %archive.display(),
        "packing completed"
    );

    tracing::info!(elapsed_ms = total.elapsed().as_millis() as u64, "merge pipeline completed");

    Ok(PipelineOutput {
        archive,
        report,
        resources_copied,
    })
}

/// The larger database is the destination; on a tie the first one is.
pub fn choose_roles(first_dir: &Path, second_dir: &Path) -> MergeResult<Roles> {
    let first_db = first_dir.join(DATABASE_FILE);
    let second_db = second_dir.join(DATABASE_FILE);

    for db in [&first_db, &second_db] {
        if !db.exists() {
            return Err(MergeError::MissingInput(format!(
                "{} does not exist",
                db.display()
            )));
        }
    }

    let roles = if bundle::file_size(&first_db)? >= bundle::file_size(&second_db)? {
        Roles {
            source_dir: second_dir.to_path_buf(),
            destination_dir: first_dir.to_path_buf(),
        }
    } else {
        Roles {
            source_dir: first_dir.to_path_buf(),
            destination_dir: second_dir.to_path_buf(),
        }
    };
    Ok(roles)
}
