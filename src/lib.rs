//! foldermail - File-system message protocol for two cooperating agents
//!
//! A reporter and a fixer that share a directory tree, but no socket, exchange
//! structured markdown documents through an `inbox/` and an `outbox/`. Each
//! side writes atomically and discovers the other side's messages by polling.
//!
//! # Architecture
//!
//! - **mail**: Codec, atomic store, mailboxes, discovery loop, protocol engine
//! - **config**: YAML configuration and validation
//! - **layout**: Base directory bootstrap and authoring templates
//! - **lint**: Read-only audit of both mailboxes
//! - **logging**: tracing subscriber setup

// Core modules
pub mod config;
pub mod error;
pub mod mail;

// Collaborators
pub mod layout;
pub mod lint;
pub mod logging;
pub mod style;

// Re-exports
pub use error::{FolderMailError, Result};
