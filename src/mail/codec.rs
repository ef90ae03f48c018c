//! Message document and filename codec
//!
//! A document is a metadata header between two `---` marker lines, a blank
//! line, then the free-form body:
//!
//! ```text
//! ---
//! type: fix_instruction
//! taskId: T20260130-101500-AB
//! timestamp: 2026-01-30T10:15:00+09:00
//! iteration: 2
//! agent: fixer
//! summary: "Guard against empty config"
//! risk: low
//! ---
//!
//! # Fix Instruction
//! ...
//! ```
//!
//! Filenames carry the routing keys: `<YYYYMMDD>_<HHMMSS>__<taskId>__<type>.md`.

use super::message::{
    is_field_key, is_reserved_key, Extra, Message, MessageKind, Risk, TaskId,
};
use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat};
use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

/// Header start and end marker line
pub const MARKER: &str = "---";

/// Filename extension of delivered messages
pub const EXTENSION: &str = "md";

/// Filename shape every delivered message must match
pub const FILENAME_PATTERN: &str = concat!(
    r"^([0-9]{8}_[0-9]{6})__(T[0-9]{8}-[0-9]{6}-[A-Za-z0-9]+)__",
    r"(error_report|fix_instruction|ack_read|ack_applied|status)\.md$"
);

lazy_static! {
    static ref FILENAME_RE: Regex = Regex::new(FILENAME_PATTERN).unwrap();
}

pub(crate) const REQUIRED_KEYS: [&str; 6] =
    ["type", "taskId", "timestamp", "iteration", "agent", "summary"];

/// Document and filename parse failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("missing header start marker")]
    MissingStartMarker,

    #[error("missing header end marker")]
    MissingEndMarker,

    #[error("missing required header key: {0}")]
    MissingKey(&'static str),

    #[error("duplicate header key: {0}")]
    DuplicateKey(String),

    #[error("malformed header line: {0}")]
    MalformedLine(String),

    #[error("iteration is not a non-negative integer: {0}")]
    InvalidIteration(String),

    #[error("unknown message type: {0}")]
    UnknownKind(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("invalid task id: {0}")]
    InvalidTaskId(String),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("filename does not match the protocol shape: {0}")]
    InvalidFilename(String),
}

/// Routing keys recovered from a message filename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileName {
    /// Producer's local wall-clock creation time
    pub created: NaiveDateTime,
    pub task_id: TaskId,
    pub kind: MessageKind,
}

/// Build the filename for a message created at `local` wall-clock time
pub fn build_filename(
    kind: MessageKind,
    task_id: &TaskId,
    local: &DateTime<FixedOffset>,
) -> String {
    format!(
        "{}__{}__{}.{}",
        local.format("%Y%m%d_%H%M%S"),
        task_id,
        kind,
        EXTENSION
    )
}

/// True if `name` matches the protocol filename shape
pub fn is_valid_filename(name: &str) -> bool {
    FILENAME_RE.is_match(name)
}

/// Recover routing keys from a message filename
pub fn parse_filename(name: &str) -> Result<FileName, ParseError> {
    let caps = FILENAME_RE
        .captures(name)
        .ok_or_else(|| ParseError::InvalidFilename(name.to_string()))?;

    let created = NaiveDateTime::parse_from_str(&caps[1], "%Y%m%d_%H%M%S")
        .map_err(|_| ParseError::InvalidFilename(name.to_string()))?;

    Ok(FileName {
        created,
        task_id: TaskId::parse(&caps[2])?,
        kind: caps[3].parse()?,
    })
}

/// Format a timestamp the way headers carry it
pub fn format_timestamp(ts: &DateTime<FixedOffset>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, false)
}

fn header_value<'a>(header: &'a [(String, String)], key: &str) -> Option<&'a str> {
    header
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn single_line(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

/// Encode a message into its document text
pub fn encode(message: &Message) -> String {
    let mut lines = vec![
        MARKER.to_string(),
        format!("type: {}", message.kind),
        format!("taskId: {}", message.task_id),
        format!("timestamp: {}", format_timestamp(&message.timestamp)),
        format!("iteration: {}", message.iteration),
        format!("agent: {}", single_line(&message.agent)),
        format!("summary: \"{}\"", message.summary.replace('"', "")),
    ];

    for (key, value) in message.extra.pairs() {
        lines.push(format!("{}: {}", key, single_line(&value)));
    }
    let mut written: Vec<&str> = Vec::new();
    for (key, value) in &message.fields {
        if !is_field_key(key)
            || is_reserved_key(message.kind, key)
            || written.contains(&key.as_str())
        {
            continue;
        }
        written.push(key);
        lines.push(format!("{}: {}", key, single_line(value).trim()));
    }
    lines.push(MARKER.to_string());

    format!("{}\n\n{}", lines.join("\n"), message.body)
}

/// Decode document text into a message
pub fn decode(text: &str) -> Result<Message, ParseError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text).replace("\r\n", "\n");

    let rest = match text.strip_prefix(MARKER) {
        Some(rest) if rest.is_empty() || rest.starts_with('\n') => rest,
        _ => return Err(ParseError::MissingStartMarker),
    };
    let rest = rest.strip_prefix('\n').unwrap_or(rest);

    let mut header: Vec<(String, String)> = Vec::new();
    let mut body: Option<&str> = None;
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        offset += line.len();
        let line = line.trim_end_matches('\n');
        if line == MARKER {
            let after = &rest[offset..];
            body = Some(after.strip_prefix('\n').unwrap_or(after));
            break;
        }
        if line.trim().is_empty() {
            continue;
        }
        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| ParseError::MalformedLine(line.to_string()))?;
        let key = key.trim();
        if header.iter().any(|(k, _)| k == key) {
            return Err(ParseError::DuplicateKey(key.to_string()));
        }
        header.push((key.to_string(), value.trim().to_string()));
    }
    let body = body.ok_or(ParseError::MissingEndMarker)?;

    let lookup = |key: &'static str| header_value(&header, key).ok_or(ParseError::MissingKey(key));

    let kind: MessageKind = lookup("type")?.parse()?;
    let task_id = TaskId::parse(lookup("taskId")?)?;

    let raw_ts = lookup("timestamp")?;
    let timestamp = DateTime::parse_from_rfc3339(raw_ts)
        .map_err(|_| ParseError::InvalidTimestamp(raw_ts.to_string()))?;

    let raw_iteration = lookup("iteration")?;
    if raw_iteration.is_empty() || !raw_iteration.chars().all(|c| c.is_ascii_digit()) {
        return Err(ParseError::InvalidIteration(raw_iteration.to_string()));
    }
    let iteration: u32 = raw_iteration
        .parse()
        .map_err(|_| ParseError::InvalidIteration(raw_iteration.to_string()))?;

    let agent = lookup("agent")?.to_string();
    let summary = lookup("summary")?;
    let summary = summary
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(summary)
        .to_string();

    let typed_keys = Extra::keys_for(kind);
    let typed = |key: &str| header_value(&header, key).map(str::to_string);
    let extra = match kind {
        MessageKind::FixInstruction => Extra::FixInstruction {
            risk: typed("risk").map(|r| r.parse::<Risk>()).transpose()?,
        },
        MessageKind::Status => Extra::Status {
            state: typed("state"),
        },
        _ => Extra::None,
    };

    let fields = header
        .iter()
        .filter(|(k, _)| !REQUIRED_KEYS.contains(&k.as_str()) && !typed_keys.contains(&k.as_str()))
        .cloned()
        .collect();

    Ok(Message {
        kind,
        task_id,
        iteration,
        agent,
        timestamp,
        summary,
        extra,
        fields,
        body: body.to_string(),
    })
}
