//! Spawned agent process with process group support
//!
//! Wraps process-wrap's `ChildWrapper` so a process can be waited on by the
//! decode loop while another task terminates it.

use std::io;
use std::process::ExitStatus;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use process_wrap::tokio::ChildWrapper;
use tokio::process::{ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::Mutex;

/// How often `wait` checks for exit
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

static NEXT_RECORD_ID: AtomicU64 = AtomicU64::new(1);

/// Pipes taken from a freshly spawned process
#[derive(Debug)]
pub struct ProcessIo {
    pub stdin: Option<ChildStdin>,
    pub stdout: ChildStdout,
    pub stderr: Option<ChildStderr>,
}

/// A tracked OS process
///
/// Shared as `Arc<ProcessRecord>`; identity (for compare-and-remove) is the
/// allocation, see [`ProcessRecord::same_as`].
#[derive(Debug)]
pub struct ProcessRecord {
    record_id: u64,
    pid: Option<u32>,
    program: String,
    started_at: Instant,
    child: Mutex<Box<dyn ChildWrapper>>,
    exit_status: OnceLock<ExitStatus>,
    terminated: AtomicBool,
}

impl ProcessRecord {
    pub(crate) fn new(child: Box<dyn ChildWrapper>, program: impl Into<String>) -> Self {
        Self {
            record_id: NEXT_RECORD_ID.fetch_add(1, Ordering::Relaxed),
            pid: child.id(),
            program: program.into(),
            started_at: Instant::now(),
            child: Mutex::new(child),
            exit_status: OnceLock::new(),
            terminated: AtomicBool::new(false),
        }
    }

    /// Process-local sequence number, unique per record
    pub fn record_id(&self) -> u64 {
        self.record_id
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn same_as(&self, other: &ProcessRecord) -> bool {
        std::ptr::eq(self, other)
    }

    /// Exit status if the process has already been reaped
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status.get().copied()
    }

    /// Check for exit without blocking
    pub async fn try_wait(&self) -> io::Result<Option<ExitStatus>> {
        if let Some(status) = self.exit_status() {
            return Ok(Some(status));
        }
        let status = self.child.lock().await.try_wait()?;
        if let Some(status) = status {
            let _ = self.exit_status.set(status);
        }
        Ok(status)
    }

    /// Wait for the process to exit
    ///
    /// Polls instead of holding the child lock, so termination can proceed
    /// while a decode loop is waiting.
    pub async fn wait(&self) -> io::Result<ExitStatus> {
        loop {
            if let Some(status) = self.try_wait().await? {
                return Ok(status);
            }
            tokio::time::sleep(EXIT_POLL_INTERVAL).await;
        }
    }

    /// Wait up to `limit` for exit; `Ok(None)` if still running
    pub async fn wait_timeout(&self, limit: Duration) -> io::Result<Option<ExitStatus>> {
        match tokio::time::timeout(limit, self.wait()).await {
            Ok(result) => result.map(Some),
            Err(_) => Ok(None),
        }
    }

    pub async fn is_alive(&self) -> bool {
        matches!(self.try_wait().await, Ok(None))
    }

    /// Send a signal to the whole process group (Unix only)
    #[cfg(unix)]
    pub async fn signal(&self, sig: i32) -> io::Result<()> {
        self.child.lock().await.signal(sig)
    }

    /// Start killing the process group without waiting for exit
    pub async fn start_kill(&self) -> io::Result<()> {
        self.child.lock().await.start_kill()
    }

    /// Record that the bridge itself asked this process to stop
    ///
    /// Returns `false` if termination had already begun.
    pub(crate) fn begin_termination(&self) -> bool {
        !self.terminated.swap(true, Ordering::SeqCst)
    }

    /// Whether termination was requested by the bridge (interrupt, eviction, shutdown)
    pub fn was_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }
}
