//! Platform-aware process termination
//!
//! Graceful stop first (SIGTERM to the process group on Unix, `taskkill /T`
//! on Windows), then a forced kill of the group if the process is still alive
//! after the grace window.

use std::time::Duration;

use super::record::ProcessRecord;

/// How long a process gets to exit after the graceful request
pub const GRACEFUL_WINDOW: Duration = Duration::from_secs(3);

/// How long to wait for confirmation after the forced kill
pub const FORCED_KILL_WINDOW: Duration = Duration::from_secs(2);

#[cfg(windows)]
const TASKKILL_WINDOW: Duration = Duration::from_secs(5);

/// What `terminate_process` ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationOutcome {
    /// The process had exited before termination started
    AlreadyExited,
    /// The process exited within the grace window
    Graceful,
    /// The process had to be killed
    Forced,
    /// Another task was already terminating it; the process has since exited
    Joined,
    /// The process survived the forced kill window
    StillRunning,
}

impl TerminationOutcome {
    pub fn is_stopped(self) -> bool {
        !matches!(self, TerminationOutcome::StillRunning)
    }
}

/// Terminate a process and its descendants
///
/// Never fails; problems are logged and reflected in the returned outcome.
pub async fn terminate_process(record: &ProcessRecord) -> TerminationOutcome {
    if let Ok(Some(_)) = record.try_wait().await {
        return TerminationOutcome::AlreadyExited;
    }

    if !record.begin_termination() {
        return match record.wait_timeout(GRACEFUL_WINDOW + FORCED_KILL_WINDOW).await {
            Ok(Some(_)) => TerminationOutcome::Joined,
            _ => TerminationOutcome::StillRunning,
        };
    }

    tracing::debug!(
        pid = ?record.pid(),
        program = %record.program(),
        "Requesting graceful termination"
    );
    request_graceful_stop(record).await;

    match record.wait_timeout(GRACEFUL_WINDOW).await {
        Ok(Some(_)) => return TerminationOutcome::Graceful,
        Ok(None) => {
            tracing::info!(
                pid = ?record.pid(),
                grace_ms = GRACEFUL_WINDOW.as_millis(),
                "Process ignored graceful termination, killing"
            );
        }
        Err(e) => {
            tracing::warn!(pid = ?record.pid(), error = %e, "Failed waiting for process exit");
        }
    }

    if let Err(e) = record.start_kill().await {
        tracing::warn!(pid = ?record.pid(), error = %e, "Failed to kill process");
    }

    match record.wait_timeout(FORCED_KILL_WINDOW).await {
        Ok(Some(_)) => TerminationOutcome::Forced,
        Ok(None) => {
            tracing::error!(pid = ?record.pid(), "Process still running after forced kill");
            TerminationOutcome::StillRunning
        }
        Err(e) => {
            tracing::warn!(pid = ?record.pid(), error = %e, "Failed to confirm process exit");
            TerminationOutcome::StillRunning
        }
    }
}

#[cfg(unix)]
async fn request_graceful_stop(record: &ProcessRecord) {
    if let Err(e) = record.signal(libc::SIGTERM).await {
        tracing::debug!(pid = ?record.pid(), error = %e, "SIGTERM failed");
    }
}

/// `taskkill /T` reaches descendants that are outside the job object
#[cfg(windows)]
async fn request_graceful_stop(record: &ProcessRecord) {
    use std::process::Stdio;

    let Some(pid) = record.pid() else {
        return;
    };

    let status = tokio::process::Command::new("taskkill")
        .args(["/F", "/T", "/PID", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match tokio::time::timeout(TASKKILL_WINDOW, status).await {
        Ok(Ok(status)) if status.success() => {}
        Ok(Ok(status)) => {
            tracing::debug!(pid, code = ?status.code(), "taskkill reported failure");
        }
        Ok(Err(e)) => tracing::warn!(pid, error = %e, "Failed to run taskkill"),
        Err(_) => tracing::warn!(pid, "taskkill timed out"),
    }
}

#[cfg(not(any(unix, windows)))]
async fn request_graceful_stop(record: &ProcessRecord) {
    if let Err(e) = record.start_kill().await {
        tracing::debug!(pid = ?record.pid(), error = %e, "Kill failed");
    }
}
