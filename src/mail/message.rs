//! Protocol message types
//!
//! Defines the message model exchanged between the reporter and the fixer.

use super::codec::{ParseError, REQUIRED_KEYS};
use chrono::{DateTime, FixedOffset};
use lazy_static::lazy_static;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum summary length in characters
pub const SUMMARY_MAX_CHARS: usize = 120;

/// Default length of the random task id suffix
pub const DEFAULT_SUFFIX_LEN: usize = 2;

const SUFFIX_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

lazy_static! {
    static ref TASK_ID_RE: Regex = Regex::new(r"^T[0-9]{8}-[0-9]{6}-[A-Za-z0-9]+$").unwrap();
}

/// Message type, which also decides the routing direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Reporter describes a failure
    ErrorReport,
    /// Fixer answers with a proposed change
    FixInstruction,
    /// Receipt of the counterpart's latest message
    AckRead,
    /// Reporter applied the fix and reports the outcome
    AckApplied,
    /// Free-form progress update
    Status,
}

impl MessageKind {
    /// All kinds, in wire order
    pub const ALL: [MessageKind; 5] = [
        MessageKind::ErrorReport,
        MessageKind::FixInstruction,
        MessageKind::AckRead,
        MessageKind::AckApplied,
        MessageKind::Status,
    ];

    /// Wire name used in headers and filenames
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::ErrorReport => "error_report",
            MessageKind::FixInstruction => "fix_instruction",
            MessageKind::AckRead => "ack_read",
            MessageKind::AckApplied => "ack_applied",
            MessageKind::Status => "status",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ParseError::UnknownKind(s.to_string()))
    }
}

/// Conversation identifier, `T<YYYYMMDD>-<HHMMSS>-<suffix>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId(String);

impl TaskId {
    /// Mint a new task id from a local creation time and a random suffix
    pub fn mint(local: &DateTime<FixedOffset>, suffix_len: usize) -> Self {
        let mut rng = rand::rng();
        let suffix: String = (0..suffix_len.max(1))
            .map(|_| SUFFIX_CHARSET[rng.random_range(0..SUFFIX_CHARSET.len())] as char)
            .collect();
        Self::from_parts(local, &suffix)
    }

    /// Build a task id from a local time and a caller-chosen suffix
    pub fn from_parts(local: &DateTime<FixedOffset>, suffix: &str) -> Self {
        Self(format!("T{}-{}", local.format("%Y%m%d-%H%M%S"), suffix))
    }

    /// Parse and validate an existing task id
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        if TASK_ID_RE.is_match(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(ParseError::InvalidTaskId(s.to_string()))
        }
    }

    /// Get the underlying string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TaskId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskId::parse(s)
    }
}

impl TryFrom<String> for TaskId {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        TaskId::parse(&s)
    }
}

impl From<TaskId> for String {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

/// Risk level attached to a fix instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Risk {
    #[default]
    Low,
    Medium,
    High,
}

impl Risk {
    pub fn as_str(&self) -> &'static str {
        match self {
            Risk::Low => "low",
            Risk::Medium => "medium",
            Risk::High => "high",
        }
    }
}

impl fmt::Display for Risk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Risk {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Risk::Low),
            "medium" => Ok(Risk::Medium),
            "high" => Ok(Risk::High),
            _ => Err(ParseError::InvalidValue {
                key: "risk".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Typed per-kind header fields
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Extra {
    #[default]
    None,
    /// `risk:` header of a fix instruction
    FixInstruction { risk: Option<Risk> },
    /// `state:` header of a status message
    Status { state: Option<String> },
}

impl Extra {
    /// Header pairs in wire order
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        match self {
            Extra::None => Vec::new(),
            Extra::FixInstruction { risk } => risk
                .iter()
                .map(|r| ("risk", r.as_str().to_string()))
                .collect(),
            Extra::Status { state } => state.iter().map(|s| ("state", s.clone())).collect(),
        }
    }

    /// Header keys this kind claims as typed fields
    pub(crate) fn keys_for(kind: MessageKind) -> &'static [&'static str] {
        match kind {
            MessageKind::FixInstruction => &["risk"],
            MessageKind::Status => &["state"],
            _ => &[],
        }
    }

    /// Whether these typed fields belong to `kind`
    pub fn fits(&self, kind: MessageKind) -> bool {
        match self {
            Extra::None => Self::keys_for(kind).is_empty(),
            Extra::FixInstruction { .. } => kind == MessageKind::FixInstruction,
            Extra::Status { .. } => kind == MessageKind::Status,
        }
    }
}

/// Whether `key` is a required header key or a typed key of `kind`
pub fn is_reserved_key(kind: MessageKind, key: &str) -> bool {
    REQUIRED_KEYS.contains(&key) || Extra::keys_for(kind).contains(&key)
}

/// Untyped header keys are one token with no colon or whitespace
pub(crate) fn is_field_key(key: &str) -> bool {
    !key.is_empty() && !key.chars().any(|c| c == ':' || c.is_whitespace())
}

/// Fold line breaks into spaces and trim
pub fn sanitize_agent(agent: &str) -> String {
    agent.replace(['\r', '\n'], " ").trim().to_string()
}

/// Strip double quotes and line breaks, then cap at [`SUMMARY_MAX_CHARS`]
pub fn sanitize_summary(summary: &str) -> String {
    let single_line: String = summary
        .chars()
        .filter(|c| *c != '"')
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .collect();
    single_line
        .trim()
        .chars()
        .take(SUMMARY_MAX_CHARS)
        .collect::<String>()
        .trim_end()
        .to_string()
}

/// A protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub task_id: TaskId,
    pub iteration: u32,
    pub agent: String,
    /// Creation instant in the protocol's fixed offset
    pub timestamp: DateTime<FixedOffset>,
    /// Always sanitized, see [`sanitize_summary`]
    pub summary: String,
    pub extra: Extra,
    /// Header keys not claimed by the kind, in document order
    pub fields: Vec<(String, String)>,
    pub body: String,
}

impl Message {
    /// Create a message with an empty body
    pub fn new(
        kind: MessageKind,
        task_id: TaskId,
        iteration: u32,
        agent: impl Into<String>,
        timestamp: DateTime<FixedOffset>,
        summary: &str,
    ) -> Self {
        let extra = match kind {
            MessageKind::FixInstruction => Extra::FixInstruction { risk: None },
            MessageKind::Status => Extra::Status { state: None },
            _ => Extra::None,
        };
        Self {
            kind,
            task_id,
            iteration,
            agent: sanitize_agent(&agent.into()),
            timestamp,
            summary: sanitize_summary(summary),
            extra,
            fields: Vec::new(),
            body: String::new(),
        }
    }

    /// Set the body
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Set the typed extra fields; extras of another kind are ignored
    pub fn with_extra(mut self, extra: Extra) -> Self {
        if extra.fits(self.kind) {
            self.extra = extra;
        } else {
            tracing::warn!(kind = %self.kind, ?extra, "Ignoring extra fields of another kind");
        }
        self
    }

    /// Append an untyped header field
    ///
    /// Reserved keys, malformed keys and repeats of an existing field are
    /// ignored so they cannot shadow the header on decode.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        if !self.accepts_field(&key) {
            tracing::warn!(kind = %self.kind, key = %key, "Ignoring header field");
            return self;
        }
        let value = value.into().replace(['\r', '\n'], " ").trim().to_string();
        self.fields.push((key, value));
        self
    }

    /// Whether `key` can be added as an untyped field
    pub fn accepts_field(&self, key: &str) -> bool {
        is_field_key(key)
            && !is_reserved_key(self.kind, key)
            && !self.fields.iter().any(|(k, _)| k == key)
    }

    /// Risk of a fix instruction, if stated
    pub fn risk(&self) -> Option<Risk> {
        match &self.extra {
            Extra::FixInstruction { risk } => *risk,
            _ => None,
        }
    }
}
