//! Base directory layout
//!
//! Creates the shared directory tree both agents expect and seeds the
//! authoring templates. Existing directories and templates are left alone, so
//! bootstrapping an in-use base is safe.

use crate::mail::{atomic, Mailbox, INBOX_DIR, OUTBOX_DIR};
use crate::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// Every directory under a base, in creation order
pub const DIRECTORIES: [&str; 8] = [
    INBOX_DIR,
    OUTBOX_DIR,
    "backup",
    "current",
    "docs",
    "templates",
    "tools",
    "workspace",
];

/// Starting point for a hand-written error report
pub const ERROR_REPORT_TEMPLATE: &str = "---
type: error_report
taskId: TYYYYMMDD-HHMMSS-XX
timestamp: {{TIMESTAMP}}
iteration: 1
agent: reporter
summary: \"(Summary)\"
---

# Error Report
## Goal / Task
...
## How to reproduce
...
## Related code
...
## Error message
...
## Stack trace / logs
...
";

/// Starting point for a hand-written fix instruction
pub const FIX_INSTRUCTION_TEMPLATE: &str = "---
type: fix_instruction
taskId: {{TASK_ID}}
timestamp: {{TIMESTAMP}}
iteration: {{ITERATION}}
agent: fixer
summary: \"Fix summary\"
risk: low
---

# Fix Instruction
## 1) Root cause
## 2) Change
## 3) How to test
";

const TEMPLATES: [(&str, &str); 2] = [
    ("error_report.md", ERROR_REPORT_TEMPLATE),
    ("fix_instruction.md", FIX_INSTRUCTION_TEMPLATE),
];

/// What a bootstrap run changed
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BootstrapReport {
    pub created_dirs: Vec<PathBuf>,
    pub written_templates: Vec<PathBuf>,
}

impl BootstrapReport {
    pub fn is_noop(&self) -> bool {
        self.created_dirs.is_empty() && self.written_templates.is_empty()
    }
}

/// Create the directory tree and templates under `base`
pub fn bootstrap(base: &Path) -> Result<BootstrapReport> {
    let mut report = BootstrapReport::default();

    for name in DIRECTORIES {
        let dir = base.join(name);
        if !dir.is_dir() {
            if name == INBOX_DIR || name == OUTBOX_DIR {
                Mailbox::new(&dir).ensure()?;
            } else {
                fs::create_dir_all(&dir)?;
            }
            tracing::info!(dir = %dir.display(), "Created directory");
            report.created_dirs.push(dir);
        }
    }

    let templates = base.join("templates");
    for (name, content) in TEMPLATES {
        let path = templates.join(name);
        match atomic::store(&path, content) {
            Ok(()) => report.written_templates.push(path),
            Err(e) if e.is_conflict() => {
                tracing::debug!(template = %path.display(), "Template exists, keeping it");
            }
            Err(e) => return Err(e),
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_bootstrap_creates_everything() {
        let dir = TempDir::new().unwrap();
        let report = bootstrap(dir.path()).unwrap();

        assert_eq!(report.created_dirs.len(), 8);
        assert_eq!(report.written_templates.len(), 2);
        for name in DIRECTORIES {
            assert!(dir.path().join(name).is_dir(), "{name} missing");
        }
        assert_eq!(
            fs::read_to_string(dir.path().join("templates/fix_instruction.md")).unwrap(),
            FIX_INSTRUCTION_TEMPLATE
        );
    }

    #[test]
    fn test_bootstrap_is_idempotent() {
        let dir = TempDir::new().unwrap();
        bootstrap(dir.path()).unwrap();

        let custom = dir.path().join("templates/error_report.md");
        fs::write(&custom, "my own template").unwrap();

        let report = bootstrap(dir.path()).unwrap();
        assert!(report.is_noop());
        assert_eq!(fs::read_to_string(custom).unwrap(), "my own template");
    }

    #[test]
    fn test_bootstrap_creates_usable_mailboxes() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("nested/base");
        bootstrap(&base).unwrap();

        let inbox = Mailbox::new(base.join(INBOX_DIR));
        assert!(inbox.path().is_dir());
        inbox
            .deliver("20260130_101500__T20260130-101500-AB__error_report.md", "---\n")
            .unwrap();
        assert!(base.join(OUTBOX_DIR).is_dir());
    }

    #[test]
    fn test_templates_start_with_marker() {
        for (_, content) in TEMPLATES {
            assert!(content.starts_with("---\n"));
        }
    }
}
