//! Folder mail protocol
//!
//! Message codec, atomic delivery, mailboxes, discovery and the protocol
//! engine.
//!
//! # Overview
//!
//! Two agents that share nothing but a directory talk by dropping markdown
//! documents into it:
//! - **Reporter** writes `error_report` and `ack_applied` into `inbox/`
//! - **Fixer** writes `fix_instruction` into `outbox/`
//!
//! # Message Types
//!
//! - `error_report` - A failure with reproduction steps
//! - `fix_instruction` - Root cause, change and test plan
//! - `ack_read` - Receipt of a message
//! - `ack_applied` - The fix was applied, with the re-test result
//! - `status` - Free-form progress update
//!
//! # Filenames
//!
//! `YYYYMMDD_HHMMSS__<taskId>__<type>.md`, for example
//! `20260130_101500__T20260130-101500-AB__error_report.md`.

pub mod atomic;
mod cancel;
mod clock;
pub mod codec;
mod discovery;
mod documents;
mod mailbox;
mod message;
mod protocol;

pub use cancel::CancellationToken;
pub use clock::{Clock, FixedClock, SystemClock};
pub use codec::{
    build_filename, decode, encode, is_valid_filename, parse_filename, FileName, ParseError,
};
pub use discovery::{await_message, WaitOptions, DEFAULT_POLL_INTERVAL, DEFAULT_TIMEOUT};
pub use documents::{applied_body, read_body, status_body, ErrorReport, FixInstruction};
pub use mailbox::{Mailbox, MessageFilter};
pub use message::{
    is_reserved_key, sanitize_agent, sanitize_summary, Extra, Message, MessageKind, Risk, TaskId,
    SUMMARY_MAX_CHARS,
};
pub use protocol::{
    offset_hours, ProtocolClient, Role, TaskEvent, TaskState, DEFAULT_OFFSET_HOURS, INBOX_DIR,
    OUTBOX_DIR,
};
