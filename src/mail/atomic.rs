//! Atomic message writes
//!
//! Implements atomic delivery using:
//! 1. Write to a sibling temp file (`.<name>.<random>.tmp`) in the target directory
//! 2. Flush and fsync so the data reaches disk
//! 3. Rename onto the target without clobbering an existing file
//!
//! A reader of the target path sees either no file or the complete document.
//! A writer killed before the rename leaves the target untouched and at most an
//! orphaned `.tmp` file, which [`crate::mail::Mailbox::sweep_stale_temp`] removes.

use crate::{FolderMailError, Result};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Suffix of in-flight temp files
pub const TEMP_SUFFIX: &str = ".tmp";

/// Write `content` to `target` atomically, failing with `Conflict` if it exists
pub fn store(target: &Path, content: &str) -> Result<()> {
    let tmp = write_temp(target, content)?;

    tmp.persist_noclobber(target).map_err(|e| {
        if e.error.kind() == ErrorKind::AlreadyExists {
            FolderMailError::Conflict {
                path: target.to_path_buf(),
            }
        } else {
            FolderMailError::Io(e.error)
        }
    })?;

    sync_parent(target);
    debug!(path = %target.display(), bytes = content.len(), "Atomically wrote message");
    Ok(())
}

/// Write `content` to `target` atomically, replacing any existing file
///
/// Not used for protocol messages, which are immutable once delivered.
pub fn store_replacing(target: &Path, content: &str) -> Result<()> {
    let tmp = write_temp(target, content)?;
    tmp.persist(target).map_err(|e| FolderMailError::Io(e.error))?;

    sync_parent(target);
    debug!(path = %target.display(), bytes = content.len(), "Atomically replaced file");
    Ok(())
}

fn write_temp(target: &Path, content: &str) -> Result<NamedTempFile> {
    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let name = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            FolderMailError::Other(format!("Invalid target path: {}", target.display()))
        })?;

    let mut tmp = tempfile::Builder::new()
        .prefix(&format!(".{}.", name))
        .suffix(TEMP_SUFFIX)
        .tempfile_in(parent)?;

    tmp.write_all(content.as_bytes())?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    Ok(tmp)
}

/// Persist the rename itself; failure only weakens durability, not atomicity
#[cfg(unix)]
fn sync_parent(target: &Path) {
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = fs::File::open(parent).and_then(|dir| dir.sync_all()) {
            warn!(dir = %parent.display(), error = %e, "Failed to sync directory");
        }
    }
}

#[cfg(not(unix))]
fn sync_parent(_target: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_files(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(TEMP_SUFFIX))
            .collect()
    }

    #[test]
    fn test_store_writes_exact_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.md");

        store(&path, "---\nhello\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "---\nhello\n");
        assert!(temp_files(dir.path()).is_empty());
    }

    #[test]
    fn test_store_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("inbox").join("a.md");

        store(&path, "x").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_store_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.md");

        store(&path, "first").unwrap();
        let err = store(&path, "second").unwrap_err();

        assert!(err.is_conflict());
        assert_eq!(fs::read_to_string(&path).unwrap(), "first");
        assert!(temp_files(dir.path()).is_empty());
    }

    #[test]
    fn test_interrupted_write_leaves_target_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.md");
        store(&path, "complete document").unwrap();

        // A writer killed mid-write leaves only its temp file behind
        fs::write(dir.path().join(".a.md.XYZ123.tmp"), "partial").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "complete document");
        assert_eq!(temp_files(dir.path()).len(), 1);
    }

    #[test]
    fn test_store_replacing_overwrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");

        store_replacing(&path, "one").unwrap();
        store_replacing(&path, "two").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "two");
    }
}
