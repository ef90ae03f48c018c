//! Protocol lint
//!
//! Read-only audit of a base directory: both mailboxes exist, every `*.md`
//! file in them has a conforming name and starts with the header marker.

use crate::mail::{codec, INBOX_DIR, OUTBOX_DIR};
use crate::{FolderMailError, Result};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// One problem found by the linter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LintIssue {
    /// `inbox/` or `outbox/` does not exist
    MissingMailbox(PathBuf),
    /// File name does not match the message filename pattern
    BadFilename(PathBuf),
    /// First line is not the `---` marker
    MissingHeader(PathBuf),
}

impl fmt::Display for LintIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LintIssue::MissingMailbox(dir) => write!(f, "missing mailbox: {}", dir.display()),
            LintIssue::BadFilename(path) => write!(f, "bad filename: {}", display_name(path)),
            LintIssue::MissingHeader(path) => {
                write!(f, "missing header start marker in {}", display_name(path))
            }
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Outcome of linting a base directory
#[derive(Debug, Default, Clone)]
pub struct LintReport {
    /// Number of `*.md` files inspected
    pub checked: usize,
    pub issues: Vec<LintIssue>,
}

impl LintReport {
    pub fn is_ok(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Lint both mailboxes under `base`
pub fn lint_base(base: &Path) -> Result<LintReport> {
    let mut report = LintReport::default();

    for name in [INBOX_DIR, OUTBOX_DIR] {
        let dir = base.join(name);
        if !dir.is_dir() {
            report.issues.push(LintIssue::MissingMailbox(dir));
            continue;
        }
        lint_mailbox(&dir, &mut report)?;
    }

    tracing::debug!(
        base = %base.display(),
        checked = report.checked,
        issues = report.issues.len(),
        "Lint finished"
    );
    Ok(report)
}

fn lint_mailbox(dir: &Path, report: &mut LintReport) -> Result<()> {
    let pattern = format!(
        "{}/*.{}",
        glob::Pattern::escape(&dir.to_string_lossy()),
        codec::EXTENSION
    );

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in glob::glob(&pattern)? {
        let path = entry.map_err(|e| FolderMailError::Io(e.into_error()))?;
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();

    for path in files {
        report.checked += 1;

        let name = display_name(&path);
        if !codec::is_valid_filename(&name) {
            report.issues.push(LintIssue::BadFilename(path));
            continue;
        }

        let text = fs::read_to_string(&path)?;
        if !starts_with_marker(&text) {
            report.issues.push(LintIssue::MissingHeader(path));
        }
    }
    Ok(())
}

fn starts_with_marker(text: &str) -> bool {
    text.trim_start_matches('\u{feff}')
        .lines()
        .next()
        .map(|line| line.trim_end_matches('\r') == codec::MARKER)
        .unwrap_or(false)
}
