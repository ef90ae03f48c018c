//! Integration tests for foldermail
//!
//! These tests drive a reporter and a fixer against one shared base directory,
//! the way two processes on different machines would.

use chrono::DateTime;
use foldermail::config::ProtocolConfig;
use foldermail::mail::{
    atomic, decode, encode, Clock, ErrorReport, FixInstruction, FixedClock, Mailbox,
    MessageFilter, MessageKind, ProtocolClient, Role, TaskState, WaitOptions, INBOX_DIR,
    OUTBOX_DIR,
};
use foldermail::{layout, lint, FolderMailError};
use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime};
use tempfile::TempDir;

/// Clock fixed at 2026-01-30 `time` in UTC+9
fn clock_at(time: &str) -> Arc<dyn Clock> {
    Arc::new(FixedClock(
        DateTime::parse_from_rfc3339(&format!("2026-01-30T{time}+09:00")).unwrap(),
    ))
}

fn reporter(base: &Path, time: &str) -> ProtocolClient {
    ProtocolClient::new(base, Role::Reporter)
        .with_agent("antigravity")
        .with_clock(clock_at(time))
}

fn fixer(base: &Path, time: &str) -> ProtocolClient {
    ProtocolClient::new(base, Role::Fixer)
        .with_agent("codex")
        .with_clock(clock_at(time))
}

fn sample_report() -> ErrorReport {
    ErrorReport::new(
        "Load \"settings\" on startup",
        "1. run app\n2. open settings",
        "let cfg = load(path)?;",
        "thread 'main' panicked at 'index out of bounds'",
    )
    .with_language("rust")
    .with_stacktrace("at src/config.rs:42")
}

mod end_to_end_tests {
    use super::*;

    #[tokio::test]
    async fn test_report_fix_ack_conversation() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path().to_path_buf();
        layout::bootstrap(&base).unwrap();

        // Reporter sends the error report
        let reporter = reporter(&base, "10:15:00");
        let task_id = reporter.send_error_report(&sample_report()).unwrap();
        assert!(task_id.as_str().starts_with("T20260130-101500-"));

        let report_path = base
            .join(INBOX_DIR)
            .join(format!("20260130_101500__{}__error_report.md", task_id));
        assert!(report_path.is_file());
        let report_before = fs::read_to_string(&report_path).unwrap();
        assert!(report_before.contains("summary: \"Load settings on startup\""));

        // Fixer answers while the reporter is waiting
        let fixer_base = base.clone();
        let fixer_task = task_id.clone();
        let answer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let fixer = fixer(&fixer_base, "10:17:31");
            let found = fixer
                .wait_for_error_report(Some(&fixer_task), WaitOptions::default())
                .await
                .unwrap();
            assert!(found.is_some());
            fixer
                .send_fix_instruction(
                    &FixInstruction::new(fixer_task, 1, "Guard empty settings file")
                        .with_cause("index into empty vec")
                        .with_change("return default when file is empty")
                        .with_test_plan("cargo test config"),
                )
                .unwrap()
        });

        let started = Instant::now();
        let options = WaitOptions::new(Duration::from_secs(5), Duration::from_millis(50));
        let found = reporter
            .wait_for_fix_instruction(&task_id, options)
            .await
            .unwrap()
            .expect("fix instruction should arrive before the timeout");
        assert!(started.elapsed() < Duration::from_secs(5));

        let fix_path = answer.await.unwrap();
        assert_eq!(found, fix_path);
        assert_eq!(
            found.file_name().unwrap().to_string_lossy(),
            format!("20260130_101731__{}__fix_instruction.md", task_id)
        );
        assert_eq!(reporter.conversation_state(&task_id).unwrap(), TaskState::FixReceived);

        let instruction = reporter.read_fix_instruction(&found).unwrap();
        assert!(instruction.contains("## 2) Change\nreturn default when file is empty"));

        // Reporter applies the fix and acknowledges it
        let reporter = reporter.with_clock(clock_at("10:20:05"));
        let ack_path = reporter
            .send_ack_applied(&task_id, 2, "Applied the guard", "14 passed")
            .unwrap();
        let ack = reporter.read_message(&ack_path).unwrap();
        assert_eq!(ack.kind, MessageKind::AckApplied);
        assert_eq!(ack.iteration, 2);
        assert!(ack_path.starts_with(base.join(INBOX_DIR)));

        // The original report is untouched
        assert_eq!(fs::read_to_string(&report_path).unwrap(), report_before);
        assert_eq!(reporter.conversation_state(&task_id).unwrap(), TaskState::Applied);

        // The fixer sees the acknowledgment
        let fixer = fixer(&base, "10:21:00");
        let seen = fixer
            .wait_for_ack(&task_id, WaitOptions::new(Duration::ZERO, Duration::from_millis(10)))
            .await
            .unwrap();
        assert_eq!(seen, Some(ack_path));

        assert!(lint::lint_base(&base).unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_timeout_then_rewait() {
        let temp_dir = TempDir::new().unwrap();
        let reporter = reporter(temp_dir.path(), "10:15:00");
        let task_id = reporter.send_error_report(&sample_report()).unwrap();

        let options = WaitOptions::new(Duration::from_millis(200), Duration::from_millis(50));
        let started = Instant::now();
        assert!(reporter
            .wait_for_fix_instruction(&task_id, options)
            .await
            .unwrap()
            .is_none());
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(200), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(200 + 50 + 500), "{elapsed:?}");
        assert_eq!(reporter.conversation_state(&task_id).unwrap(), TaskState::TimedOut);

        // Acknowledging before any fix arrived is rejected
        let err = reporter
            .send_ack_applied(&task_id, 1, "nothing", "n/a")
            .unwrap_err();
        assert!(matches!(err, FolderMailError::InvalidTransition { .. }));

        fixer(temp_dir.path(), "10:30:00")
            .send_fix_instruction(&FixInstruction::new(task_id.clone(), 1, "late fix"))
            .unwrap();
        assert!(reporter
            .wait_for_fix_instruction(&task_id, options)
            .await
            .unwrap()
            .is_some());
    }
}

mod delivery_tests {
    use super::*;

    #[test]
    fn test_same_second_writes_conflict() {
        let temp_dir = TempDir::new().unwrap();
        let reporter = reporter(temp_dir.path(), "10:15:00");
        let task_id = reporter.send_error_report(&sample_report()).unwrap();

        let fixer = fixer(temp_dir.path(), "10:17:31");
        let first = fixer
            .send_fix_instruction(&FixInstruction::new(task_id.clone(), 1, "first"))
            .unwrap();
        let before = fs::read_to_string(&first).unwrap();

        let err = fixer
            .send_fix_instruction(&FixInstruction::new(task_id, 1, "second"))
            .unwrap_err();
        assert!(matches!(err, FolderMailError::Conflict { ref path } if path == &first));
        assert_eq!(fs::read_to_string(&first).unwrap(), before);
    }

    #[test]
    fn test_interrupted_write_leaves_target_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let inbox = Mailbox::new(temp_dir.path().join(INBOX_DIR));
        let name = "20260130_101500__T20260130-101500-AB__error_report.md";
        let target = inbox.path().join(name);
        inbox.deliver(name, "---\ncomplete\n").unwrap();

        // A writer killed mid-write leaves only its temp file behind
        let orphan = inbox.path().join(format!(".{}.X1Y2Z3{}", name, atomic::TEMP_SUFFIX));
        fs::write(&orphan, "---\npart").unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "---\ncomplete\n");
        assert_eq!(inbox.list_matching(&MessageFilter::any()).unwrap(), vec![target]);

        // Startup sweep removes it
        let mut config = ProtocolConfig::new(temp_dir.path());
        config.stale_temp_age_secs = 0;
        ProtocolClient::from_config(&config, Role::Fixer).unwrap();
        assert!(!orphan.exists());
    }

    #[test]
    fn test_most_recent_by_mtime() {
        let temp_dir = TempDir::new().unwrap();
        let outbox = Mailbox::new(temp_dir.path().join(OUTBOX_DIR));
        let names = [
            "20260130_101700__T20260130-101500-AB__fix_instruction.md",
            "20260130_101800__T20260130-101500-AB__fix_instruction.md",
            "20260130_101900__T20260130-101500-AB__fix_instruction.md",
        ];
        let now = SystemTime::now();
        // Middle file is the newest on disk, first file the oldest
        for (name, age_secs) in names.iter().zip([300u64, 10, 100]) {
            let path = outbox.deliver(name, "---\n").unwrap();
            File::options()
                .write(true)
                .open(&path)
                .unwrap()
                .set_modified(now - Duration::from_secs(age_secs))
                .unwrap();
        }

        let listed: Vec<String> = outbox
            .list_matching(&MessageFilter::any().with_kind(MessageKind::FixInstruction))
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(listed, vec![names[1], names[2], names[0]]);
    }

    #[test]
    fn test_concurrent_reader_never_sees_partial_documents() {
        const COUNT: usize = 100;
        let temp_dir = TempDir::new().unwrap();
        let inbox = Mailbox::new(temp_dir.path().join(INBOX_DIR));
        inbox.ensure().unwrap();

        let document = format!("---\n{}\n", "x".repeat(64 * 1024));
        let expected_len = document.len();

        let writer_inbox = inbox.clone();
        let writer = thread::spawn(move || {
            for i in 0..COUNT {
                let name = format!("20260130_10{i:04}__T20260130-101500-AB__status.md");
                writer_inbox.deliver(&name, &document).unwrap();
            }
        });

        while !writer.is_finished() {
            for path in inbox.list_matching(&MessageFilter::any()).unwrap() {
                let len = fs::read(&path).unwrap().len();
                assert_eq!(len, expected_len, "partial document at {}", path.display());
            }
        }
        writer.join().unwrap();

        let delivered = inbox.list_matching(&MessageFilter::any()).unwrap();
        assert_eq!(delivered.len(), COUNT);
        for path in delivered {
            assert_eq!(fs::read(&path).unwrap().len(), expected_len);
        }
    }
}

mod codec_tests {
    use super::*;

    #[test]
    fn test_delivered_document_decodes() {
        let temp_dir = TempDir::new().unwrap();
        let reporter = reporter(temp_dir.path(), "10:15:00");
        let task_id = reporter.send_error_report(&sample_report()).unwrap();

        let path = reporter
            .inbox()
            .latest_matching(&MessageFilter::new(MessageKind::ErrorReport, &task_id))
            .unwrap()
            .unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let message = decode(&text).unwrap();

        assert_eq!(message.task_id, task_id);
        assert_eq!(message.agent, "antigravity");
        assert!(!message.summary.contains('"'));
        assert_eq!(encode(&message), text);
    }
}

mod config_tests {
    use super::*;

    #[test]
    fn test_client_from_saved_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut config = ProtocolConfig::new(temp_dir.path().join("bridge"));
        config.agent = Some("claude".to_string());
        config.wait.timeout_secs = 5;
        config.save(&config_path).unwrap();

        let loaded = ProtocolConfig::load(&config_path).unwrap();
        assert_eq!(loaded.wait_options().timeout, Duration::from_secs(5));

        let client = ProtocolClient::from_config(&loaded, Role::Reporter).unwrap();
        assert_eq!(client.agent(), "claude");
        assert_eq!(client.inbox().path(), temp_dir.path().join("bridge").join(INBOX_DIR));
    }
}
