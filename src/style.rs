//! Terminal styling utilities
//!
//! Consistent colors for the CLI. Uses crossterm for cross-platform terminal
//! colors.

use crate::mail::{MessageKind, Risk, TaskState};
use crossterm::style::{StyledContent, Stylize};

/// Message kind colors
/// - error_report: Red
/// - fix_instruction: Green
/// - ack_*: Cyan
/// - status: Grey
pub fn kind_style(kind: MessageKind) -> StyledContent<String> {
    let label = kind.to_string();
    match kind {
        MessageKind::ErrorReport => label.red(),
        MessageKind::FixInstruction => label.green(),
        MessageKind::AckRead | MessageKind::AckApplied => label.cyan(),
        MessageKind::Status => label.dark_grey(),
    }
}

pub fn risk_style(risk: Risk) -> StyledContent<String> {
    let label = risk.to_string();
    match risk {
        Risk::Low => label.green(),
        Risk::Medium => label.yellow(),
        Risk::High => label.red().bold(),
    }
}

/// Conversation state colors
pub fn state_style(state: TaskState) -> StyledContent<String> {
    let label = state.to_string();
    match state {
        TaskState::Created => label.white(),
        TaskState::AwaitingFix => label.yellow(),
        TaskState::FixReceived => label.cyan(),
        TaskState::Applied => label.green(),
        TaskState::TimedOut => label.red(),
    }
}

/// Section headers
pub fn header(text: &str) -> StyledContent<String> {
    text.to_string().bold()
}

/// Dim/muted text
pub fn dim(text: &str) -> StyledContent<String> {
    text.to_string().dark_grey()
}

/// Success text
pub fn success(text: &str) -> StyledContent<String> {
    text.to_string().green()
}

/// Warning text
pub fn warning(text: &str) -> StyledContent<String> {
    text.to_string().yellow()
}

/// Error text
pub fn error(text: &str) -> StyledContent<String> {
    text.to_string().red()
}

/// Task id styling
pub fn task_id(id: &str) -> StyledContent<String> {
    id.to_string().cyan()
}

/// Path styling
pub fn path(p: &str) -> StyledContent<String> {
    p.to_string().blue()
}
