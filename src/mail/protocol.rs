//! Protocol engine
//!
//! Composes the codec, atomic store, mailboxes and discovery loop into the
//! reporter and fixer operations, and tracks each task conversation through
//! its states:
//!
//! ```text
//! Created --wait--> AwaitingFix --fix found--> FixReceived --ack_applied--> Applied
//!                       |   ^
//!               timeout |   | wait again
//!                       v   |
//!                     TimedOut
//! ```
//!
//! Reporter messages (`error_report`, `ack_applied`) go to `inbox/`; fixer
//! messages (`fix_instruction`) go to `outbox/`. `ack_read` and `status` go to
//! the sender's outgoing mailbox.
//!
//! # Example
//!
//! ```no_run
//! use foldermail::mail::{ErrorReport, ProtocolClient, Role, WaitOptions};
//! use std::time::Duration;
//!
//! # async fn demo() -> foldermail::Result<()> {
//! let client = ProtocolClient::new("/mnt/shared/bridge", Role::Reporter);
//! let report = ErrorReport::new("Parse config", "run app", "load()", "panicked");
//! let task_id = client.send_error_report(&report)?;
//!
//! let options = WaitOptions::default().with_timeout(Duration::from_secs(300));
//! if let Some(path) = client.wait_for_fix_instruction(&task_id, options).await? {
//!     let instruction = client.read_fix_instruction(&path)?;
//!     // ... apply it ...
//!     client.send_ack_applied(&task_id, 1, "Applied the fix", "all tests pass")?;
//! }
//! # Ok(())
//! # }
//! ```

use super::cancel::CancellationToken;
use super::clock::{Clock, SystemClock};
use super::codec;
use super::discovery::{self, WaitOptions};
use super::documents::{self, ErrorReport, FixInstruction};
use super::mailbox::{Mailbox, MessageFilter};
use super::message::{sanitize_agent, Extra, Message, MessageKind, TaskId, DEFAULT_SUFFIX_LEN};
use crate::config::ProtocolConfig;
use crate::{FolderMailError, Result};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Reporter mailbox directory name
pub const INBOX_DIR: &str = "inbox";

/// Fixer mailbox directory name
pub const OUTBOX_DIR: &str = "outbox";

/// Default header timestamp offset (UTC+9)
pub const DEFAULT_OFFSET_HOURS: i32 = 9;

/// Which side of the conversation this client speaks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Sends error reports and acknowledgments, receives fix instructions
    Reporter,
    /// Receives error reports, sends fix instructions
    Fixer,
}

impl Role {
    /// Agent name used when none is configured
    pub fn default_agent(&self) -> &'static str {
        match self {
            Role::Reporter => "reporter",
            Role::Fixer => "fixer",
        }
    }
}

/// State of one task conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Error report delivered
    Created,
    /// A wait for the fix instruction is in progress
    AwaitingFix,
    /// A fix instruction is in the outbox
    FixReceived,
    /// The fix was applied and acknowledged
    Applied,
    /// The last wait ended without a fix instruction
    TimedOut,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Created => "created",
            TaskState::AwaitingFix => "awaiting_fix",
            TaskState::FixReceived => "fix_received",
            TaskState::Applied => "applied",
            TaskState::TimedOut => "timed_out",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Applied)
    }

    /// Next state after `event`, or `None` if the event is not allowed
    pub fn on(self, event: TaskEvent) -> Option<TaskState> {
        use TaskEvent::*;
        use TaskState::*;

        match (self, event) {
            (Applied, _) => None,
            (_, WaitStarted) => Some(AwaitingFix),
            (AwaitingFix, FixFound) => Some(FixReceived),
            (AwaitingFix, WaitTimedOut) => Some(TimedOut),
            (AwaitingFix, WaitCancelled) => Some(AwaitingFix),
            (FixReceived, AckApplied) => Some(Applied),
            _ => None,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events that move a conversation between states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskEvent {
    WaitStarted,
    FixFound,
    WaitTimedOut,
    WaitCancelled,
    AckApplied,
}

impl TaskEvent {
    fn as_str(&self) -> &'static str {
        match self {
            TaskEvent::WaitStarted => "wait for a fix instruction",
            TaskEvent::FixFound => "receive a fix instruction",
            TaskEvent::WaitTimedOut => "time out",
            TaskEvent::WaitCancelled => "cancel a wait",
            TaskEvent::AckApplied => "acknowledge an applied fix",
        }
    }
}

/// File-system protocol client for one base directory
pub struct ProtocolClient {
    base: PathBuf,
    inbox: Mailbox,
    outbox: Mailbox,
    role: Role,
    agent: String,
    offset: FixedOffset,
    suffix_len: usize,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
    states: Mutex<HashMap<TaskId, TaskState>>,
}

impl ProtocolClient {
    /// Create a client for `base` with default settings
    pub fn new(base: impl Into<PathBuf>, role: Role) -> Self {
        let base = base.into();
        Self {
            inbox: Mailbox::new(base.join(INBOX_DIR)),
            outbox: Mailbox::new(base.join(OUTBOX_DIR)),
            base,
            role,
            agent: role.default_agent().to_string(),
            offset: offset_hours(DEFAULT_OFFSET_HOURS),
            suffix_len: DEFAULT_SUFFIX_LEN,
            clock: Arc::new(SystemClock),
            cancel: CancellationToken::new(),
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Create a client from configuration, sweeping stale temp files if enabled
    pub fn from_config(config: &ProtocolConfig, role: Role) -> Result<Self> {
        let client = Self::new(&config.base_dir, role)
            .with_offset(config.offset()?)
            .with_suffix_len(config.task_suffix_len);
        let client = match &config.agent {
            Some(agent) => client.with_agent(agent.clone()),
            None => client,
        };

        if config.sweep_stale_temp {
            let removed = client.sweep_stale_temp(config.stale_temp_age())?;
            if removed > 0 {
                tracing::info!(removed, "Swept stale temp files");
            }
        }
        Ok(client)
    }

    /// Set the agent name written into headers
    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = sanitize_agent(&agent.into());
        self
    }

    /// Set the header timestamp offset
    pub fn with_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = offset;
        self
    }

    /// Set the random task id suffix length
    pub fn with_suffix_len(mut self, len: usize) -> Self {
        self.suffix_len = len.max(1);
        self
    }

    /// Replace the wall clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use an externally owned cancellation token for all waits
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that aborts in-progress waits when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn inbox(&self) -> &Mailbox {
        &self.inbox
    }

    pub fn outbox(&self) -> &Mailbox {
        &self.outbox
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }

    // ---- Reporter operations ----

    /// Mint a task id and deliver an `error_report` to the inbox
    pub fn send_error_report(&self, report: &ErrorReport) -> Result<TaskId> {
        check_iteration(report.iteration)?;

        let now = self.clock.now();
        let task_id = TaskId::mint(&now, self.suffix_len);
        let message = self
            .message(
                &now,
                MessageKind::ErrorReport,
                &task_id,
                report.iteration,
                &report.description,
            )
            .with_body(report.body());

        self.deliver(&self.inbox, &message, &now)?;
        self.set_state(&task_id, TaskState::Created)?;

        tracing::info!(task_id = %task_id, iteration = report.iteration, "Sent error report");
        Ok(task_id)
    }

    /// Wait for a `fix_instruction` for `task_id` in the outbox
    ///
    /// `Ok(None)` means the deadline passed (or the client's token was
    /// cancelled); callers decide whether to re-wait, escalate or give up.
    pub async fn wait_for_fix_instruction(
        &self,
        task_id: &TaskId,
        options: WaitOptions,
    ) -> Result<Option<PathBuf>> {
        let state = self.conversation_state(task_id)?;
        self.transition(task_id, state, TaskEvent::WaitStarted)?;

        let filter = MessageFilter::new(MessageKind::FixInstruction, task_id);
        let found = discovery::await_message(&self.outbox, &filter, options, &self.cancel).await?;

        let event = match (&found, self.cancel.is_cancelled()) {
            (Some(_), _) => TaskEvent::FixFound,
            (None, true) => TaskEvent::WaitCancelled,
            (None, false) => TaskEvent::WaitTimedOut,
        };
        self.transition(task_id, TaskState::AwaitingFix, event)?;
        Ok(found)
    }

    /// Read a fix instruction document as text
    pub fn read_fix_instruction(&self, path: &Path) -> Result<String> {
        self.outbox.read(path)
    }

    /// Read and decode any message document
    pub fn read_message(&self, path: &Path) -> Result<Message> {
        self.outbox.read_message(path)
    }

    /// Deliver an `ack_applied` for `task_id` to the inbox
    ///
    /// `iteration` must be at least the iteration of the newest fix instruction.
    pub fn send_ack_applied(
        &self,
        task_id: &TaskId,
        iteration: u32,
        applied_summary: &str,
        test_result: &str,
    ) -> Result<PathBuf> {
        check_iteration(iteration)?;

        let state = self.conversation_state(task_id)?;
        let next = self.next_state(task_id, state, TaskEvent::AckApplied)?;

        let fix_iteration = self
            .highest_iteration(&self.outbox, MessageKind::FixInstruction, task_id)?
            .ok_or_else(|| {
                FolderMailError::Protocol(format!("No fix instruction found for task {}", task_id))
            })?;
        if iteration < fix_iteration {
            return Err(FolderMailError::Protocol(format!(
                "ack_applied iteration {} is below fix instruction iteration {} for task {}",
                iteration, fix_iteration, task_id
            )));
        }

        let now = self.clock.now();
        let message = self
            .message(&now, MessageKind::AckApplied, task_id, iteration, applied_summary)
            .with_body(documents::applied_body(applied_summary, test_result));
        let path = self.deliver(&self.inbox, &message, &now)?;
        self.set_state(task_id, next)?;

        tracing::info!(task_id = %task_id, iteration, "Sent ack_applied");
        Ok(path)
    }

    /// Acknowledge receipt of the counterpart's newest message for `task_id`
    pub fn send_ack_read(&self, task_id: &TaskId, iteration: u32) -> Result<PathBuf> {
        check_iteration(iteration)?;

        let incoming = self.incoming();
        let latest = incoming
            .latest_matching(&MessageFilter::any().with_task(task_id))?
            .ok_or_else(|| {
                FolderMailError::Protocol(format!(
                    "Nothing to acknowledge for task {} in {}",
                    task_id,
                    incoming.path().display()
                ))
            })?;
        let name = latest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let now = self.clock.now();
        let message = self
            .message(&now, MessageKind::AckRead, task_id, iteration, &format!("Read {}", name))
            .with_field("ref", name.clone())
            .with_body(documents::read_body(&name));
        self.deliver(self.outgoing(), &message, &now)
    }

    /// Deliver a `status` update for `task_id`
    pub fn send_status(
        &self,
        task_id: &TaskId,
        iteration: u32,
        state: Option<&str>,
        note: &str,
    ) -> Result<PathBuf> {
        check_iteration(iteration)?;

        let now = self.clock.now();
        let message = self
            .message(&now, MessageKind::Status, task_id, iteration, note)
            .with_extra(Extra::Status {
                state: state.map(str::to_string),
            })
            .with_body(documents::status_body(note));
        self.deliver(self.outgoing(), &message, &now)
    }

    // ---- Fixer operations ----

    /// Wait for an `error_report` in the inbox, for one task or any task
    pub async fn wait_for_error_report(
        &self,
        task_id: Option<&TaskId>,
        options: WaitOptions,
    ) -> Result<Option<PathBuf>> {
        let filter = MessageFilter {
            kind: Some(MessageKind::ErrorReport),
            task_id: task_id.cloned(),
        };
        discovery::await_message(&self.inbox, &filter, options, &self.cancel).await
    }

    /// Deliver a `fix_instruction` to the outbox
    ///
    /// The task must have an error report, and the instruction's iteration may
    /// not be below the report's.
    pub fn send_fix_instruction(&self, fix: &FixInstruction) -> Result<PathBuf> {
        check_iteration(fix.iteration)?;

        let report_iteration = self
            .highest_iteration(&self.inbox, MessageKind::ErrorReport, &fix.task_id)?
            .ok_or_else(|| {
                FolderMailError::Protocol(format!("No error report found for task {}", fix.task_id))
            })?;
        if fix.iteration < report_iteration {
            return Err(FolderMailError::Protocol(format!(
                "fix_instruction iteration {} is below error report iteration {} for task {}",
                fix.iteration, report_iteration, fix.task_id
            )));
        }

        let now = self.clock.now();
        let message = self
            .message(&now, MessageKind::FixInstruction, &fix.task_id, fix.iteration, &fix.summary)
            .with_extra(Extra::FixInstruction {
                risk: Some(fix.risk),
            })
            .with_body(fix.body());
        let path = self.deliver(&self.outbox, &message, &now)?;

        tracing::info!(
            task_id = %fix.task_id,
            iteration = fix.iteration,
            risk = %fix.risk,
            "Sent fix instruction"
        );
        Ok(path)
    }

    /// Wait for the reporter's `ack_applied` for `task_id`
    pub async fn wait_for_ack(
        &self,
        task_id: &TaskId,
        options: WaitOptions,
    ) -> Result<Option<PathBuf>> {
        let filter = MessageFilter::new(MessageKind::AckApplied, task_id);
        discovery::await_message(&self.inbox, &filter, options, &self.cancel).await
    }

    // ---- Conversation state ----

    /// Current state of `task_id`
    ///
    /// Message-backed states (`FixReceived`, `Applied`) come from the
    /// mailboxes, so a fresh process sees the same conversation. Wait outcomes
    /// are only known to the process that waited.
    pub fn conversation_state(&self, task_id: &TaskId) -> Result<TaskState> {
        let tracked = self.tracked_state(task_id)?;

        let any_of = |mailbox: &Mailbox, kind| -> Result<bool> {
            Ok(mailbox
                .latest_matching(&MessageFilter::new(kind, task_id))?
                .is_some())
        };

        if any_of(&self.inbox, MessageKind::AckApplied)? {
            return Ok(TaskState::Applied);
        }
        if any_of(&self.outbox, MessageKind::FixInstruction)? {
            return Ok(TaskState::FixReceived);
        }
        if let Some(state) = tracked {
            return Ok(state);
        }
        if any_of(&self.inbox, MessageKind::ErrorReport)? {
            return Ok(TaskState::Created);
        }
        Err(FolderMailError::Protocol(format!("Unknown task {}", task_id)))
    }

    /// Remove orphaned temp files from both mailboxes
    pub fn sweep_stale_temp(&self, max_age: Duration) -> Result<usize> {
        Ok(self.inbox.sweep_stale_temp(max_age)? + self.outbox.sweep_stale_temp(max_age)?)
    }

    // ---- Internals ----

    fn incoming(&self) -> &Mailbox {
        match self.role {
            Role::Reporter => &self.outbox,
            Role::Fixer => &self.inbox,
        }
    }

    fn outgoing(&self) -> &Mailbox {
        match self.role {
            Role::Reporter => &self.inbox,
            Role::Fixer => &self.outbox,
        }
    }

    /// Filenames use the local clock; headers carry `now` in the protocol offset
    fn message(
        &self,
        now: &DateTime<FixedOffset>,
        kind: MessageKind,
        task_id: &TaskId,
        iteration: u32,
        summary: &str,
    ) -> Message {
        let timestamp = now.with_timezone(&self.offset);
        Message::new(kind, task_id.clone(), iteration, self.agent.clone(), timestamp, summary)
    }

    fn deliver(
        &self,
        mailbox: &Mailbox,
        message: &Message,
        now: &DateTime<FixedOffset>,
    ) -> Result<PathBuf> {
        let filename = codec::build_filename(message.kind, &message.task_id, now);
        mailbox.deliver(&filename, &codec::encode(message)).map_err(|e| {
            if e.is_conflict() {
                tracing::error!(
                    task_id = %message.task_id,
                    kind = %message.kind,
                    file = %filename,
                    "Message filename already taken"
                );
            }
            e
        })
    }

    fn highest_iteration(
        &self,
        mailbox: &Mailbox,
        kind: MessageKind,
        task_id: &TaskId,
    ) -> Result<Option<u32>> {
        let mut highest = None;
        for path in mailbox.list_matching(&MessageFilter::new(kind, task_id))? {
            let message = mailbox.read_message(&path)?;
            highest = highest.max(Some(message.iteration));
        }
        Ok(highest)
    }

    fn tracked_state(&self, task_id: &TaskId) -> Result<Option<TaskState>> {
        let states = self
            .states
            .lock()
            .map_err(|_| FolderMailError::Other("Task state table poisoned".to_string()))?;
        Ok(states.get(task_id).copied())
    }

    fn set_state(&self, task_id: &TaskId, state: TaskState) -> Result<()> {
        let mut states = self
            .states
            .lock()
            .map_err(|_| FolderMailError::Other("Task state table poisoned".to_string()))?;
        states.insert(task_id.clone(), state);
        tracing::debug!(task_id = %task_id, state = %state, "Task state changed");
        Ok(())
    }

    fn next_state(
        &self,
        task_id: &TaskId,
        state: TaskState,
        event: TaskEvent,
    ) -> Result<TaskState> {
        state
            .on(event)
            .ok_or_else(|| FolderMailError::InvalidTransition {
                task_id: task_id.to_string(),
                state: state.to_string(),
                event: event.as_str().to_string(),
            })
    }

    fn transition(
        &self,
        task_id: &TaskId,
        state: TaskState,
        event: TaskEvent,
    ) -> Result<TaskState> {
        let next = self.next_state(task_id, state, event)?;
        self.set_state(task_id, next)?;
        Ok(next)
    }
}

/// Fixed offset `hours` east of UTC, or UTC if out of range
pub fn offset_hours(hours: i32) -> FixedOffset {
    FixedOffset::east_opt(hours.saturating_mul(3600)).unwrap_or_else(|| Utc.fix())
}

fn check_iteration(iteration: u32) -> Result<()> {
    if iteration == 0 {
        return Err(FolderMailError::Protocol(
            "iteration must be a positive integer".to_string(),
        ));
    }
    Ok(())
}
