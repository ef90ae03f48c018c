//! Directory mailboxes
//!
//! A mailbox is a flat directory of immutable message documents. Messages are
//! indexed only by the routing keys in their filename (task id and type) and
//! found by glob scan.
//!
//! Directory structure:
//! ```text
//! <base>/
//!   inbox/    # written by the reporter, read by the fixer
//!     20260130_101500__T20260130-101500-AB__error_report.md
//!   outbox/   # written by the fixer, read by the reporter
//!     20260130_101731__T20260130-101500-AB__fix_instruction.md
//! ```
//!
//! "Most recent" means newest modification time first. Synced filesystems often
//! store mtimes with one or two second resolution, so equal mtimes are ordered
//! by filename, descending; filenames start with the creation time.

use super::atomic::{self, TEMP_SUFFIX};
use super::codec::{self, EXTENSION};
use super::message::{Message, MessageKind, TaskId};
use crate::{FolderMailError, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Routing-key filter for mailbox scans; `None` matches any value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageFilter {
    pub kind: Option<MessageKind>,
    pub task_id: Option<TaskId>,
}

impl MessageFilter {
    /// Match every message
    pub fn any() -> Self {
        Self::default()
    }

    /// Match one kind for one task
    pub fn new(kind: MessageKind, task_id: &TaskId) -> Self {
        Self {
            kind: Some(kind),
            task_id: Some(task_id.clone()),
        }
    }

    /// Restrict to a message kind
    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Restrict to a task
    pub fn with_task(mut self, task_id: &TaskId) -> Self {
        self.task_id = Some(task_id.clone());
        self
    }

    /// Glob pattern over filenames: `*__<task_id>__<type>.md`
    pub fn pattern(&self) -> String {
        format!(
            "*__{}__{}.{}",
            self.task_id.as_ref().map(TaskId::as_str).unwrap_or("*"),
            self.kind.map(|k| k.as_str()).unwrap_or("*"),
            EXTENSION
        )
    }
}

/// A directory mailbox
#[derive(Debug, Clone)]
pub struct Mailbox {
    dir: PathBuf,
}

impl Mailbox {
    /// Open a mailbox rooted at `dir`; the directory is created on first delivery
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Mailbox directory
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Create the mailbox directory if missing
    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    /// Deliver a document under `filename`; fails with `Conflict` if taken
    pub fn deliver(&self, filename: &str, content: &str) -> Result<PathBuf> {
        if !codec::is_valid_filename(filename) {
            return Err(codec::ParseError::InvalidFilename(filename.to_string()).into());
        }

        let path = self.dir.join(filename);
        atomic::store(&path, content)?;

        tracing::info!(mailbox = %self.dir.display(), file = filename, "Delivered message");
        Ok(path)
    }

    /// Conforming messages matching `filter`, newest first
    pub fn list_matching(&self, filter: &MessageFilter) -> Result<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let dir = self.dir.to_str().ok_or_else(|| {
            FolderMailError::Other(format!("Mailbox path is not UTF-8: {}", self.dir.display()))
        })?;
        let pattern = format!(
            "{}/{}",
            glob::Pattern::escape(dir.trim_end_matches(['/', '\\'])),
            filter.pattern()
        );

        let mut found: Vec<(SystemTime, String, PathBuf)> = Vec::new();
        for entry in glob::glob(&pattern)? {
            let path = entry.map_err(|e| FolderMailError::Io(e.into_error()))?;
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                continue;
            };
            if !codec::is_valid_filename(&name) {
                tracing::debug!(file = %name, "Skipping non-conforming filename");
                continue;
            }

            let metadata = match fs::metadata(&path) {
                Ok(m) => m,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            if !metadata.is_file() {
                continue;
            }
            found.push((metadata.modified()?, name, path));
        }

        found.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));

        tracing::debug!(
            mailbox = %self.dir.display(),
            pattern = %filter.pattern(),
            matches = found.len(),
            "Scanned mailbox"
        );
        Ok(found.into_iter().map(|(_, _, path)| path).collect())
    }

    /// Newest message matching `filter`
    pub fn latest_matching(&self, filter: &MessageFilter) -> Result<Option<PathBuf>> {
        Ok(self.list_matching(filter)?.into_iter().next())
    }

    /// Read a document as text
    pub fn read(&self, path: &Path) -> Result<String> {
        Ok(fs::read_to_string(path)?)
    }

    /// Read and decode a document
    pub fn read_message(&self, path: &Path) -> Result<Message> {
        let text = self.read(path)?;
        codec::decode(&text).map_err(|e| {
            tracing::warn!(path = %path.display(), error = %e, "Malformed message");
            FolderMailError::Parse(e)
        })
    }

    /// Remove temp files left by interrupted writers, older than `max_age`
    pub fn sweep_stale_temp(&self, max_age: Duration) -> Result<usize> {
        if !self.dir.exists() {
            return Ok(0);
        }

        let now = SystemTime::now();
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if !name.to_string_lossy().ends_with(TEMP_SUFFIX) {
                continue;
            }

            let modified = match entry.metadata().and_then(|m| m.modified()) {
                Ok(t) => t,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            let age = now.duration_since(modified).unwrap_or_default();
            if age < max_age {
                continue;
            }

            match fs::remove_file(entry.path()) {
                Ok(()) => {
                    tracing::info!(file = %entry.path().display(), "Removed stale temp file");
                    removed += 1;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }
}
