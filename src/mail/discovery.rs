//! Mailbox discovery loop
//!
//! Waits for a matching message by re-scanning the mailbox on a fixed interval
//! until a deadline. Polling is used instead of filesystem change notification
//! because synced and network filesystems do not deliver change events reliably.

use super::cancel::CancellationToken;
use super::mailbox::{Mailbox, MessageFilter};
use crate::Result;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;

/// Default wait timeout (120 seconds)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default poll interval (1 second)
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Floor for the poll interval so a zero interval cannot spin
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Timeout and poll interval for one wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl WaitOptions {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }

    /// Set the timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the poll interval
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Wait for the newest message matching `filter`
///
/// Scans immediately, then once per poll interval; the last sleep is clipped
/// to the deadline so one final scan happens at the deadline. Returns
/// `Ok(None)` when the deadline passes or `cancel` fires with no match. A
/// timeout too large to represent as an instant means no deadline: the wait
/// ends only on a match or cancellation. Scan errors are returned as-is; only
/// discovery is retried.
pub async fn await_message(
    mailbox: &Mailbox,
    filter: &MessageFilter,
    options: WaitOptions,
    cancel: &CancellationToken,
) -> Result<Option<PathBuf>> {
    let started = Instant::now();
    let deadline = started.checked_add(options.timeout);
    let poll_interval = options.poll_interval.max(MIN_POLL_INTERVAL);
    let mut scans: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            tracing::info!(pattern = %filter.pattern(), scans, "Wait cancelled");
            return Ok(None);
        }

        scans = scans.saturating_add(1);
        if let Some(path) = mailbox.latest_matching(filter)? {
            tracing::info!(
                path = %path.display(),
                scans,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Found matching message"
            );
            return Ok(Some(path));
        }

        let now = Instant::now();
        let nap = match deadline {
            Some(deadline) if now >= deadline => {
                tracing::info!(
                    pattern = %filter.pattern(),
                    scans,
                    timeout_secs = options.timeout.as_secs_f64(),
                    "Wait timed out"
                );
                return Ok(None);
            }
            Some(deadline) => poll_interval.min(deadline - now),
            None => poll_interval,
        };

        tokio::select! {
            _ = tokio::time::sleep(nap) => {}
            _ = cancel.cancelled() => {
                tracing::info!(pattern = %filter.pattern(), scans, "Wait cancelled");
                return Ok(None);
            }
        }
    }
}
