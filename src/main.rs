//! foldermail - File-system message protocol
//!
//! Main entry point for the foldermail CLI.

mod commands;

use clap::Parser;
use commands::{Cli, Commands, MailboxArg};
use foldermail::config::{validate_config_result, ProtocolConfig};
use foldermail::mail::{
    atomic, parse_filename, ErrorReport, FixInstruction, Mailbox, MessageFilter, MessageKind,
    ProtocolClient, Role, TaskId, WaitOptions, INBOX_DIR, OUTBOX_DIR,
};
use foldermail::{layout, lint, style, FolderMailError, Result};
use serde::Serialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

/// Exit code when a wait ends without a message
const EXIT_TIMED_OUT: i32 = 2;

/// Whether a command produced what it was asked for
enum Outcome {
    Done,
    TimedOut,
}

fn main() {
    if let Err(e) = foldermail::logging::init() {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let cli = Cli::parse();

    match run(cli) {
        Ok(Outcome::Done) => {}
        Ok(Outcome::TimedOut) => process::exit(EXIT_TIMED_OUT),
        Err(e) => {
            eprintln!("{} {}", style::error("Error:"), e);
            process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<Outcome> {
    // `write` works on any path and needs no configuration
    if let Commands::Write {
        ref path,
        ref content,
        force,
    } = cli.command
    {
        return handle_write_command(path, content, force);
    }

    let config = resolve_config(&cli)?;
    validate_config_result(&config)?;
    let role: Role = cli.role.into();
    let config_path = cli.config.clone().unwrap_or_else(ProtocolConfig::default_path);

    tracing::info!(base = %config.base_dir.display(), ?role, "Configuration resolved");

    match cli.command {
        Commands::Init { save_config } => handle_init_command(&config, &config_path, save_config),
        Commands::Lint => handle_lint_command(&config.base_dir),
        Commands::Sweep { max_age } => {
            let mut config = config;
            config.sweep_stale_temp = false;
            let client = ProtocolClient::from_config(&config, role)?;
            let age = max_age
                .map(Duration::from_secs)
                .unwrap_or_else(|| config.stale_temp_age());
            let removed = client.sweep_stale_temp(age)?;
            println!("Removed {} stale temp file(s)", removed);
            Ok(Outcome::Done)
        }
        Commands::Report {
            description,
            repro,
            code,
            language,
            error,
            stacktrace,
            iteration,
            wait,
            timeout,
        } => {
            let client = ProtocolClient::from_config(&config, Role::Reporter)?;
            let report = ErrorReport::new(description, repro, code, error)
                .with_language(language)
                .with_stacktrace(stacktrace)
                .with_iteration(iteration);
            let task_id = client.send_error_report(&report)?;
            println!("{}", task_id);

            if !wait {
                return Ok(Outcome::Done);
            }
            let options = wait_options(&config, timeout, None);
            let found =
                block_on_cancellable(&client, client.wait_for_fix_instruction(&task_id, options))?;
            print_found(&client, found)
        }
        Commands::Wait {
            task_id,
            kind,
            timeout,
            poll_ms,
        } => {
            let client = ProtocolClient::from_config(&config, role)?;
            let options = wait_options(&config, timeout, poll_ms);
            let task_id = task_id.map(|id| TaskId::parse(&id)).transpose()?;
            handle_wait_command(&client, task_id.as_ref(), kind, options)
        }
        Commands::Read { path, raw } => {
            let client = ProtocolClient::from_config(&config, role)?;
            if raw {
                print!("{}", client.read_fix_instruction(&path)?);
            } else {
                print_message(&client, &path)?;
            }
            Ok(Outcome::Done)
        }
        Commands::Ack {
            task_id,
            iteration,
            read,
            summary,
            test_result,
        } => {
            let client = ProtocolClient::from_config(&config, role)?;
            let task_id = TaskId::parse(&task_id)?;
            let path = if read {
                client.send_ack_read(&task_id, iteration)?
            } else {
                client.send_ack_applied(&task_id, iteration, &summary, &test_result)?
            };
            println!("{}", path.display());
            Ok(Outcome::Done)
        }
        Commands::Status {
            task_id,
            iteration,
            state,
            note,
        } => {
            let client = ProtocolClient::from_config(&config, role)?;
            let task_id = TaskId::parse(&task_id)?;
            let path = client.send_status(&task_id, iteration, state.as_deref(), &note)?;
            println!("{}", path.display());
            Ok(Outcome::Done)
        }
        Commands::Fix {
            task_id,
            iteration,
            summary,
            risk,
            cause,
            change,
            test_plan,
        } => {
            let client = ProtocolClient::from_config(&config, Role::Fixer)?;
            let fix = FixInstruction::new(TaskId::parse(&task_id)?, iteration, summary)
                .with_risk(risk)
                .with_cause(cause)
                .with_change(change)
                .with_test_plan(test_plan);
            let path = client.send_fix_instruction(&fix)?;
            println!("{}", path.display());
            Ok(Outcome::Done)
        }
        Commands::List {
            mailbox,
            task,
            kind,
            json,
        } => {
            let client = ProtocolClient::from_config(&config, role)?;
            let filter = MessageFilter {
                kind,
                task_id: task.map(|id| TaskId::parse(&id)).transpose()?,
            };
            handle_list_command(&client, mailbox, &filter, json)
        }
        Commands::State { task_id } => {
            let client = ProtocolClient::from_config(&config, role)?;
            let task_id = TaskId::parse(&task_id)?;
            let state = client.conversation_state(&task_id)?;
            if state.is_terminal() {
                println!(
                    "{} {} {}",
                    style::task_id(task_id.as_str()),
                    style::state_style(state),
                    style::dim("(conversation finished)")
                );
            } else {
                println!("{} {}", style::task_id(task_id.as_str()), style::state_style(state));
            }
            Ok(Outcome::Done)
        }
        Commands::Write {
            path,
            content,
            force,
        } => handle_write_command(&path, &content, force),
    }
}

/// Config file if present, then command-line overrides
fn resolve_config(cli: &Cli) -> Result<ProtocolConfig> {
    let path = cli.config.clone().unwrap_or_else(ProtocolConfig::default_path);

    let mut config = match ProtocolConfig::load(&path) {
        Ok(config) => config,
        Err(FolderMailError::Config(_)) if !path.exists() => match cli.base {
            Some(ref base) => ProtocolConfig::new(base),
            None => {
                return Err(FolderMailError::Config(format!(
                    "No configuration found at {}.\n\n\
                     Pass a base directory with --base <dir> (or FOLDERMAIL_BASE), or run:\n  \
                     foldermail --base <dir> init --save-config",
                    path.display()
                )))
            }
        },
        Err(e) => return Err(e),
    };

    if let Some(ref base) = cli.base {
        config.base_dir = base.clone();
    }
    if let Some(ref agent) = cli.agent {
        config.agent = Some(agent.clone());
    }
    Ok(config)
}

fn wait_options(
    config: &ProtocolConfig,
    timeout: Option<u64>,
    poll_ms: Option<u64>,
) -> WaitOptions {
    let mut options = config.wait_options();
    if let Some(secs) = timeout {
        options = options.with_timeout(Duration::from_secs(secs));
    }
    if let Some(ms) = poll_ms {
        options = options.with_poll_interval(Duration::from_millis(ms));
    }
    options
}

/// Run a wait on a fresh runtime; Ctrl-C cancels it
fn block_on_cancellable<F, T>(client: &ProtocolClient, wait: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let runtime = tokio::runtime::Runtime::new()?;
    let token = client.cancellation_token();

    runtime.block_on(async move {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupted, cancelling wait");
                token.cancel();
            }
        });
        wait.await
    })
}

fn handle_init_command(
    config: &ProtocolConfig,
    config_path: &Path,
    save_config: bool,
) -> Result<Outcome> {
    let report = layout::bootstrap(&config.base_dir)?;

    for dir in &report.created_dirs {
        println!("  {} {}", style::success("created"), style::path(&dir.display().to_string()));
    }
    for template in &report.written_templates {
        println!("  {} {}", style::success("wrote"), style::path(&template.display().to_string()));
    }
    if report.is_noop() {
        println!("{}", style::dim("Layout already complete"));
    }

    if save_config {
        config.save(config_path)?;
        println!(
            "  {} {}",
            style::success("saved"),
            style::path(&config_path.display().to_string())
        );
    }

    println!(
        "{} {}",
        style::header("Ready:"),
        style::path(&config.base_dir.display().to_string())
    );
    Ok(Outcome::Done)
}

fn handle_wait_command(
    client: &ProtocolClient,
    task_id: Option<&TaskId>,
    kind: MessageKind,
    options: WaitOptions,
) -> Result<Outcome> {
    let required = || {
        task_id.ok_or_else(|| {
            FolderMailError::Config(format!("A task id is required to wait for {}", kind))
        })
    };

    let found = match kind {
        MessageKind::FixInstruction => {
            let task_id = required()?;
            block_on_cancellable(client, client.wait_for_fix_instruction(task_id, options))?
        }
        MessageKind::ErrorReport => {
            block_on_cancellable(client, client.wait_for_error_report(task_id, options))?
        }
        MessageKind::AckApplied => {
            let task_id = required()?;
            block_on_cancellable(client, client.wait_for_ack(task_id, options))?
        }
        other => {
            return Err(FolderMailError::Config(format!(
                "Waiting for {} messages is not supported",
                other
            )))
        }
    };

    print_found(client, found)
}

fn print_found(client: &ProtocolClient, found: Option<PathBuf>) -> Result<Outcome> {
    match found {
        Some(path) => {
            println!("{}", path.display());
            Ok(Outcome::Done)
        }
        None if client.cancellation_token().is_cancelled() => {
            eprintln!("{}", style::warning("Wait cancelled"));
            Ok(Outcome::TimedOut)
        }
        None => {
            eprintln!("{}", style::warning("Timed out waiting for a message"));
            Ok(Outcome::TimedOut)
        }
    }
}

fn print_message(client: &ProtocolClient, path: &Path) -> Result<()> {
    let message = client.read_message(path)?;

    println!(
        "{} {} {}",
        style::kind_style(message.kind),
        style::task_id(message.task_id.as_str()),
        style::dim(&format!("iteration {}", message.iteration))
    );
    println!("{} {}", style::dim("agent:"), message.agent);
    println!("{} {}", style::dim("time: "), message.timestamp.to_rfc3339());
    if let Some(risk) = message.risk() {
        println!("{} {}", style::dim("risk: "), style::risk_style(risk));
    }
    for (key, value) in &message.fields {
        println!("{} {}", style::dim(&format!("{}:", key)), value);
    }
    println!("{}", style::header(&message.summary));
    println!();
    print!("{}", message.body);
    Ok(())
}

/// One row of `list --json`
#[derive(Serialize)]
struct ListedMessage {
    mailbox: &'static str,
    file: String,
    task_id: Option<String>,
    kind: Option<MessageKind>,
    created: Option<String>,
}

fn handle_list_command(
    client: &ProtocolClient,
    mailbox: MailboxArg,
    filter: &MessageFilter,
    json: bool,
) -> Result<Outcome> {
    let boxes: Vec<(&'static str, &Mailbox)> = match mailbox {
        MailboxArg::Inbox => vec![(INBOX_DIR, client.inbox())],
        MailboxArg::Outbox => vec![(OUTBOX_DIR, client.outbox())],
        MailboxArg::All => vec![(INBOX_DIR, client.inbox()), (OUTBOX_DIR, client.outbox())],
    };

    let mut rows = Vec::new();
    for (label, mailbox) in boxes {
        let paths = mailbox.list_matching(filter)?;
        if !json {
            println!("{} {}", style::header(label), style::dim(&format!("({})", paths.len())));
        }

        for path in paths {
            let file = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let parsed = parse_filename(&file).ok();

            if !json {
                match parsed {
                    Some(ref parsed) => println!(
                        "  {}  {}  {}",
                        style::dim(&parsed.created.format("%Y-%m-%d %H:%M:%S").to_string()),
                        style::task_id(parsed.task_id.as_str()),
                        style::kind_style(parsed.kind)
                    ),
                    None => println!("  {}", file),
                }
                continue;
            }

            rows.push(ListedMessage {
                mailbox: label,
                task_id: parsed.as_ref().map(|p| p.task_id.to_string()),
                kind: parsed.as_ref().map(|p| p.kind),
                created: parsed
                    .as_ref()
                    .map(|p| p.created.format("%Y-%m-%dT%H:%M:%S").to_string()),
                file,
            });
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    }
    Ok(Outcome::Done)
}

fn handle_lint_command(base: &Path) -> Result<Outcome> {
    let report = lint::lint_base(base)?;

    if report.is_ok() {
        println!("{} {}", style::success("OK"), style::dim(&format!("({} files)", report.checked)));
        return Ok(Outcome::Done);
    }

    for issue in &report.issues {
        println!("{} {}", style::error("FAIL:"), issue);
    }
    Err(FolderMailError::Protocol(format!(
        "{} lint issue(s) in {}",
        report.issues.len(),
        base.display()
    )))
}

fn handle_write_command(path: &Path, content: &str, force: bool) -> Result<Outcome> {
    if force {
        atomic::store_replacing(path, content)?;
    } else {
        atomic::store(path, content)?;
    }
    println!("WROTE: {}", path.display());
    Ok(Outcome::Done)
}
