//! Waits for an uploaded file to leave the hosted service's processing state.
//!
//! The wait is a bounded state machine: one status check per interval, a
//! finite ceiling on total wait, a small tolerance for failed status checks,
//! and a cancellation token the caller can trip at any point.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{AnalysisError, AnalysisResult};
use crate::remote::{FileState, FileStore, RemoteFile};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Submitted,
    Pending,
    Ready,
    Failed,
    TimedOut,
    Cancelled,
}

impl PollState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, PollState::Submitted | PollState::Pending)
    }
}

impl fmt::Display for PollState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PollState::Submitted => "submitted",
            PollState::Pending => "pending",
            PollState::Ready => "ready",
            PollState::Failed => "failed",
            PollState::TimedOut => "timed-out",
            PollState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    /// Sleep between status checks.
    pub interval: Duration,
    /// Ceiling on total time spent waiting.
    pub timeout: Duration,
    /// Consecutive failed status checks tolerated before giving up.
    pub max_status_errors: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(600),
            max_status_errors: 3,
        }
    }
}

/// A file the hosted service reports as usable, plus how long that took.
#[derive(Debug, Clone)]
pub struct ReadyFile {
    pub file: RemoteFile,
    pub status_checks: u32,
    pub waited: Duration,
}

struct Poll<'a> {
    name: &'a str,
    state: PollState,
}

impl Poll<'_> {
    fn transition(&mut self, next: PollState) {
        debug_assert!(!self.state.is_terminal(), "{} left terminal state {}", self.name, self.state);
        debug!("[poll] {} {} -> {}", self.name, self.state, next);
        self.state = next;
    }
}

fn timed_out(poll: &mut Poll<'_>, started: Instant) -> AnalysisError {
    poll.transition(PollState::TimedOut);
    let waited = started.elapsed();
    warn!(
        "[poll] ⏱️  {} still processing after {:.2}s, giving up",
        poll.name,
        waited.as_secs_f64()
    );
    AnalysisError::Timeout {
        waited_secs: waited.as_secs_f64(),
    }
}

/// Blocks until `submitted` is no longer processing, honoring `policy` and `cancel`.
pub async fn await_ready(
    store: &dyn FileStore,
    submitted: RemoteFile,
    policy: &PollPolicy,
    cancel: &CancellationToken,
) -> AnalysisResult<ReadyFile> {
    let started = Instant::now();
    let deadline = started + policy.timeout;
    let name = submitted.name.clone();
    let mut poll = Poll {
        name: &name,
        state: PollState::Submitted,
    };
    let mut file = submitted;
    let mut status_checks = 0u32;
    let mut consecutive_errors = 0u32;

    loop {
        match file.state {
            FileState::Processing => {
                if poll.state != PollState::Pending {
                    poll.transition(PollState::Pending);
                }
            }
            FileState::Failed => {
                poll.transition(PollState::Failed);
                let reason = file
                    .error
                    .as_ref()
                    .map(|e| e.message.clone())
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "the service reported FAILED".to_string());
                return Err(AnalysisError::remote(format!(
                    "processing of {} failed: {}",
                    name, reason
                )));
            }
            FileState::Active | FileState::Unspecified => {
                poll.transition(PollState::Ready);
                let waited = started.elapsed();
                info!(
                    "[poll] ✅ {} ready after {:.2}s ({} status checks)",
                    name,
                    waited.as_secs_f64(),
                    status_checks
                );
                return Ok(ReadyFile {
                    file,
                    status_checks,
                    waited,
                });
            }
        }

        // Never sleep past the ceiling
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(timed_out(&mut poll, started));
        }
        tokio::select! {
            _ = cancel.cancelled() => {
                poll.transition(PollState::Cancelled);
                return Err(AnalysisError::Cancelled);
            }
            _ = tokio::time::sleep(policy.interval.min(remaining)) => {}
        }
        if Instant::now() >= deadline {
            return Err(timed_out(&mut poll, started));
        }

        status_checks += 1;
        // A status request that never answers is bounded by the same ceiling
        let checked = tokio::select! {
            _ = cancel.cancelled() => {
                poll.transition(PollState::Cancelled);
                return Err(AnalysisError::Cancelled);
            }
            _ = tokio::time::sleep_until(deadline) => {
                return Err(timed_out(&mut poll, started));
            }
            checked = store.get_file(&name) => checked,
        };
        match checked {
            Ok(latest) => {
                consecutive_errors = 0;
                file = latest;
            }
            Err(e) => {
                consecutive_errors += 1;
                warn!(
                    "[poll] status check {} for {} failed ({}/{}): {}",
                    status_checks, name, consecutive_errors, policy.max_status_errors, e
                );
                if consecutive_errors > policy.max_status_errors {
                    poll.transition(PollState::Failed);
                    return Err(AnalysisError::remote(format!(
                        "status check for {} failed {} times in a row: {}",
                        name, consecutive_errors, e
                    )));
                }
            }
        }
    }
}
