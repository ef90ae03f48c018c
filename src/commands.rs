//! CLI command definitions
//!
//! All CLI structs and subcommand enums are defined here.

use clap::{Parser, Subcommand, ValueEnum};
use foldermail::mail::{MessageKind, Risk, Role};
use std::path::PathBuf;

/// foldermail - File-system message protocol between a reporter and a fixer
#[derive(Parser, Debug)]
#[command(name = "foldermail")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (default: ~/.config/foldermail/config.yaml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Shared base directory (overrides the config file)
    #[arg(short, long, global = true, env = "FOLDERMAIL_BASE")]
    pub base: Option<PathBuf>,

    /// Agent name written into message headers
    #[arg(short, long, global = true, env = "FOLDERMAIL_AGENT")]
    pub agent: Option<String>,

    /// Which side of the conversation this process speaks for
    #[arg(short, long, global = true, value_enum, default_value_t = RoleArg::Reporter)]
    pub role: RoleArg,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the base directory layout and templates
    Init {
        /// Also write the config file with the resolved base directory
        #[arg(long)]
        save_config: bool,
    },

    /// Send an error report (reporter)
    Report {
        /// Goal or task description; becomes the summary
        #[arg(short, long)]
        description: String,

        /// How to reproduce the failure
        #[arg(long, default_value = "")]
        repro: String,

        /// Related code snippet
        #[arg(long, default_value = "")]
        code: String,

        /// Code fence language for the snippet
        #[arg(long, default_value = "")]
        language: String,

        /// Error message
        #[arg(short, long)]
        error: String,

        /// Stack trace or log excerpt
        #[arg(long, default_value = "")]
        stacktrace: String,

        #[arg(short, long, default_value_t = 1)]
        iteration: u32,

        /// Wait for the fix instruction after sending
        #[arg(short, long)]
        wait: bool,

        /// Wait timeout in seconds (default from config)
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Wait for a message to appear
    Wait {
        /// Task id (required unless waiting for any error report)
        task_id: Option<String>,

        /// Message type to wait for
        #[arg(short, long, default_value = "fix_instruction")]
        kind: MessageKind,

        /// Timeout in seconds (default from config)
        #[arg(long)]
        timeout: Option<u64>,

        /// Poll interval in milliseconds (default from config)
        #[arg(long)]
        poll_ms: Option<u64>,
    },

    /// Print a message document
    Read {
        path: PathBuf,

        /// Print the file as-is instead of the decoded header and body
        #[arg(long)]
        raw: bool,
    },

    /// Acknowledge a fix instruction (applied by default)
    Ack {
        task_id: String,

        #[arg(short, long)]
        iteration: u32,

        /// Send ack_read for the newest incoming message instead
        #[arg(long)]
        read: bool,

        /// What was applied
        #[arg(short, long, default_value = "")]
        summary: String,

        /// Re-run or test output
        #[arg(short, long, default_value = "")]
        test_result: String,
    },

    /// Send a status update
    Status {
        task_id: String,

        #[arg(short, long)]
        iteration: u32,

        /// Optional state label
        #[arg(long)]
        state: Option<String>,

        /// Status note
        note: String,
    },

    /// Send a fix instruction (fixer)
    Fix {
        task_id: String,

        #[arg(short, long, default_value_t = 1)]
        iteration: u32,

        /// One-line summary of the fix
        #[arg(short, long)]
        summary: String,

        #[arg(long, default_value = "low")]
        risk: Risk,

        /// Root cause analysis
        #[arg(long, default_value = "")]
        cause: String,

        /// The change to make
        #[arg(long, default_value = "")]
        change: String,

        /// How to verify the fix
        #[arg(long, default_value = "")]
        test_plan: String,
    },

    /// List messages, newest first
    List {
        /// Mailbox to list
        #[arg(short = 'm', long, value_enum, default_value_t = MailboxArg::All)]
        mailbox: MailboxArg,

        /// Filter by task id
        #[arg(short, long)]
        task: Option<String>,

        /// Filter by message type
        #[arg(short, long)]
        kind: Option<MessageKind>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show the conversation state of a task
    State { task_id: String },

    /// Check mailbox filenames and headers
    Lint,

    /// Remove orphaned temp files
    Sweep {
        /// Minimum age in seconds (default from config)
        #[arg(long)]
        max_age: Option<u64>,
    },

    /// Atomically write a file
    Write {
        path: PathBuf,

        #[arg(long)]
        content: String,

        /// Replace the file if it exists
        #[arg(long)]
        force: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoleArg {
    Reporter,
    Fixer,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Reporter => Role::Reporter,
            RoleArg::Fixer => Role::Fixer,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum MailboxArg {
    Inbox,
    Outbox,
    All,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_fix() {
        let cli = Cli::parse_from([
            "foldermail",
            "--role",
            "fixer",
            "fix",
            "T20260130-101500-AB",
            "--summary",
            "Guard index",
            "--risk",
            "high",
        ]);
        assert_eq!(cli.role, RoleArg::Fixer);
        match cli.command {
            Commands::Fix { risk, iteration, .. } => {
                assert_eq!(risk, Risk::High);
                assert_eq!(iteration, 1);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_wait_kind() {
        let cli = Cli::parse_from(["foldermail", "wait", "--kind", "error_report"]);
        match cli.command {
            Commands::Wait { task_id, kind, .. } => {
                assert!(task_id.is_none());
                assert_eq!(kind, MessageKind::ErrorReport);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
