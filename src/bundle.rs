//! Backup container handling.
//!
//! A `.jwlibrary` backup is a zip archive holding `userData.db`, a
//! `manifest.json`, a default thumbnail, and any media files referenced by
//! the database. These helpers unpack it, move resource files between
//! working directories, refresh the manifest and pack the result again.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use sha2::{Digest, Sha256};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{MergeError, MergeResult};

/// File name of the relational store inside a backup.
pub const DATABASE_FILE: &str = "userData.db";
/// File name of the backup manifest.
pub const MANIFEST_FILE: &str = "manifest.json";
/// Thumbnail every backup ships with.
pub const DEFAULT_THUMBNAIL_FILE: &str = "default_thumbnail.png";
/// Files that are never copied from the source backup into the destination.
pub const RESOURCE_EXCLUDES: &[&str] = &[MANIFEST_FILE, DATABASE_FILE, DEFAULT_THUMBNAIL_FILE];

/// Unpack `archive` into `dir`, creating `dir` if needed.
pub fn extract(archive: &Path, dir: &Path) -> MergeResult<()> {
    fs::create_dir_all(dir)?;
    let file = File::open(archive).map_err(|e| {
        MergeError::Io(format!("cannot open {}: {}", archive.display(), e))
    })?;
    let mut zip = ZipArchive::new(file)?;
    zip.extract(dir)?;
    Ok(())
}

/// Copy the regular files of `source_dir` into `destination_dir`, except the
/// names in `exclude`. Returns the number of files copied.
pub fn copy_resources(
    source_dir: &Path,
    destination_dir: &Path,
    exclude: &[&str],
) -> MergeResult<usize> {
    let mut copied = 0;

    for entry in fs::read_dir(source_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if exclude.iter().any(|e| name == *e) {
            continue;
        }
        if !entry.file_type()?.is_file() {
            tracing::debug!(path = %entry.path().display(), "skipping non-file resource");
            continue;
        }

        fs::copy(entry.path(), destination_dir.join(&name))?;
        copied += 1;
    }

    Ok(copied)
}

/// Point the manifest in `dir` at the current database: its SHA-256 digest
/// and a fresh modification date. A missing manifest is left missing.
pub fn refresh_manifest(dir: &Path) -> MergeResult<()> {
    let manifest_path = dir.join(MANIFEST_FILE);
    if !manifest_path.exists() {
        return Ok(());
    }

    let mut manifest: serde_json::Value = serde_json::from_slice(&fs::read(&manifest_path)?)?;
    let digest = file_sha256(&dir.join(DATABASE_FILE))?;

    if let Some(backup) = manifest
        .get_mut("userDataBackup")
        .and_then(serde_json::Value::as_object_mut)
    {
        backup.insert("hash".to_string(), serde_json::Value::String(digest));
        backup.insert(
            "lastModifiedDate".to_string(),
            serde_json::Value::String(Utc::now().format("%Y-%m-%dT%H:%M:%S%:z").to_string()),
        );
    }

    fs::write(&manifest_path, serde_json::to_vec(&manifest)?)?;
    Ok(())
}

/// Pack every file under `dir` into a new archive at `archive`, with entry
/// names relative to `dir`.
pub fn pack(dir: &Path, archive: &Path) -> MergeResult<()> {
    let mut files = Vec::new();
    collect_files(dir, &mut files)?;
    files.sort();

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writer = ZipWriter::new(File::create(archive)?);

    for path in files {
        let name = entry_name(dir, &path)?;
        writer.start_file(name, options)?;
        io::copy(&mut File::open(&path)?, &mut writer)?;
    }

    writer.finish()?;
    Ok(())
}

/// Remove everything inside `dir`, keeping `dir` itself. Failures are logged
/// and skipped.
pub fn clear_dir(dir: &Path) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let result = match entry.file_type() {
            Ok(t) if t.is_dir() => fs::remove_dir_all(&path),
            _ => fs::remove_file(&path),
        };
        if let Err(e) = result {
            tracing::warn!(path = %path.display(), error = %e, "failed to delete");
        }
    }
}

/// Size of `path` in bytes.
pub fn file_size(path: &Path) -> MergeResult<u64> {
    Ok(fs::metadata(path)?.len())
}

fn file_sha256(path: &Path) -> MergeResult<String> {
    let mut hasher = Sha256::new();
    io::copy(&mut File::open(path)?, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> MergeResult<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_files(&entry.path(), files)?;
        } else if file_type.is_file() {
            files.push(entry.path());
        }
    }
    Ok(())
}

fn entry_name(root: &Path, path: &Path) -> MergeResult<String> {
    let relative = path
        .strip_prefix(root)
        .map_err(|e| MergeError::Archive(format!("{}: {}", path.display(), e)))?;
    let parts = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>();
    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_pack_then_extract_keeps_layout() {
        let tmp = tempdir().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(src.join("media")).unwrap();
        fs::write(src.join(DATABASE_FILE), b"db").unwrap();
        fs::write(src.join("media").join("clip.mp4"), b"clip").unwrap();

        let archive = tmp.path().join("out.jwlibrary");
        pack(&src, &archive).unwrap();

        let out = tmp.path().join("out");
        extract(&archive, &out).unwrap();
        assert_eq!(fs::read(out.join(DATABASE_FILE)).unwrap(), b"db");
        assert_eq!(fs::read(out.join("media").join("clip.mp4")).unwrap(), b"clip");
    }

    #[test]
    fn test_copy_resources_skips_excluded() {
        let tmp = tempdir().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&dst).unwrap();
        for name in [MANIFEST_FILE, DATABASE_FILE, DEFAULT_THUMBNAIL_FILE, "a.jpg", "b.mp3"] {
            fs::write(src.join(name), name).unwrap();
        }

        let copied = copy_resources(&src, &dst, RESOURCE_EXCLUDES).unwrap();

        assert_eq!(copied, 2);
        assert!(dst.join("a.jpg").exists());
        assert!(dst.join("b.mp3").exists());
        assert!(!dst.join(DATABASE_FILE).exists());
        assert!(!dst.join(MANIFEST_FILE).exists());
    }

    #[test]
    fn test_refresh_manifest_updates_hash() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join(DATABASE_FILE), b"abc").unwrap();
        fs::write(
            tmp.path().join(MANIFEST_FILE),
            r#"{"name":"backup","userDataBackup":{"hash":"old","deviceName":"phone"}}"#,
        )
        .unwrap();

        refresh_manifest(tmp.path()).unwrap();

        let manifest: serde_json::Value =
            serde_json::from_slice(&fs::read(tmp.path().join(MANIFEST_FILE)).unwrap()).unwrap();
        assert_eq!(
            manifest["userDataBackup"]["hash"],
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(manifest["userDataBackup"]["deviceName"], "phone");
        assert_eq!(manifest["name"], "backup");
        assert!(manifest["userDataBackup"]["lastModifiedDate"].is_string());
    }

    #[test]
    fn test_refresh_manifest_without_manifest() {
        let tmp = tempdir().unwrap();
        refresh_manifest(tmp.path()).unwrap();
        assert!(!tmp.path().join(MANIFEST_FILE).exists());
    }

    #[test]
    fn test_clear_dir_keeps_dir() {
        let tmp = tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("nested")).unwrap();
        fs::write(tmp.path().join("nested").join("x"), b"x").unwrap();
        fs::write(tmp.path().join("y"), b"y").unwrap();

        clear_dir(tmp.path());

        assert!(tmp.path().exists());
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
    }
}
