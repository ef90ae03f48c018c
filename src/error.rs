//! Error types for foldermail
//!
//! Defines the error enum covering every failure mode of the protocol.
//! Uses thiserror for ergonomic error handling.

use crate::mail::ParseError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for foldermail operations
pub type Result<T> = std::result::Result<T, FolderMailError>;

/// Error type for foldermail operations
///
/// A discovery timeout is not an error: waits return `Ok(None)`.
#[derive(Error, Debug)]
pub enum FolderMailError {
    /// Directory or file read/write failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A message file with the same name was already delivered
    #[error("Write conflict: {} already exists", path.display())]
    Conflict { path: PathBuf },

    /// Malformed message document or filename
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Operation not allowed in the conversation's current state
    #[error("Invalid transition for task {task_id}: cannot {event} while {state}")]
    InvalidTransition {
        task_id: String,
        state: String,
        event: String,
    },

    /// Protocol rule violation (iteration ordering, missing counterpart message)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid mailbox scan pattern
    #[error("Pattern error: {0}")]
    Pattern(#[from] glob::PatternError),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl FolderMailError {
    /// True for a filename collision on delivery
    pub fn is_conflict(&self) -> bool {
        matches!(self, FolderMailError::Conflict { .. })
    }
}
