//! Process lifecycle management
//!
//! Spawns agent processes in their own process group, tracks which channel
//! owns which process, and handles termination and scratch-dir bookkeeping.

use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use process_wrap::tokio::{CommandWrap, KillOnDrop};
#[cfg(windows)]
use process_wrap::tokio::JobObject;
#[cfg(unix)]
use process_wrap::tokio::ProcessGroup;

use super::record::{ProcessIo, ProcessRecord};
use super::scratch;
use super::terminate::{TerminationOutcome, terminate_process};
use crate::types::{BridgeError, Result};

/// How long a finished send waits for its process to be reaped
pub const REAP_WINDOW: Duration = Duration::from_secs(5);

/// Program and arguments to launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

/// Owner of every agent process the bridge has started
///
/// The channel → process table only records ownership; evicting a prior
/// process is the channel registry's job.
#[derive(Debug)]
pub struct ProcessLifecycleManager {
    /// Map of channel_id -> live process
    processes: DashMap<String, Arc<ProcessRecord>>,
    scratch_root: PathBuf,
}

impl ProcessLifecycleManager {
    pub fn new(scratch_root: impl Into<PathBuf>) -> Self {
        Self {
            processes: DashMap::new(),
            scratch_root: scratch_root.into(),
        }
    }

    /// Launch a child process
    ///
    /// Stdin, stdout and stderr are piped; the child leads its own process
    /// group (a job object on Windows) so termination reaches descendants.
    pub fn spawn(
        &self,
        command: &CommandSpec,
        working_dir: &Path,
        env: &HashMap<String, String>,
    ) -> Result<(Arc<ProcessRecord>, ProcessIo)> {
        let program = command.program.to_string_lossy().into_owned();

        let mut wrapped = CommandWrap::with_new(&command.program, |cmd| {
            cmd.args(&command.args)
                .current_dir(working_dir)
                .envs(env)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());
        });
        #[cfg(unix)]
        wrapped.wrap(ProcessGroup::leader());
        #[cfg(windows)]
        wrapped.wrap(JobObject);
        wrapped.wrap(KillOnDrop);

        let mut child = wrapped
            .spawn()
            .map_err(|e| BridgeError::spawn(program.clone(), e))?;

        let stdin = child.stdin().take();
        let stderr = child.stderr().take();
        let stdout = child
            .stdout()
            .take()
            .ok_or_else(|| BridgeError::internal("child stdout was not piped"))?;

        let record = Arc::new(ProcessRecord::new(child, program));
        tracing::info!(
            pid = ?record.pid(),
            program = %record.program(),
            working_dir = %working_dir.display(),
            "Spawned agent process"
        );

        Ok((
            record,
            ProcessIo {
                stdin,
                stdout,
                stderr,
            },
        ))
    }

    /// Record that `channel_id` owns `record`
    ///
    /// Returns the mapping it replaced, which is left running.
    pub fn register_process(
        &self,
        channel_id: &str,
        record: Arc<ProcessRecord>,
    ) -> Option<Arc<ProcessRecord>> {
        tracing::debug!(channel_id = %channel_id, pid = ?record.pid(), "Registering process");
        self.processes.insert(channel_id.to_string(), record)
    }

    /// Remove the mapping only if it still points at `record`
    ///
    /// A late cleanup of a finished process must not evict a newer process
    /// registered under the same channel.
    pub fn unregister_process(&self, channel_id: &str, record: &Arc<ProcessRecord>) -> bool {
        let removed = self
            .processes
            .remove_if(channel_id, |_, current| Arc::ptr_eq(current, record))
            .is_some();

        if removed {
            tracing::debug!(channel_id = %channel_id, pid = ?record.pid(), "Unregistered process");
        } else {
            tracing::debug!(
                channel_id = %channel_id,
                pid = ?record.pid(),
                "Skipped unregister, channel owned by a newer process"
            );
        }
        removed
    }

    /// Process currently registered for a channel
    pub fn process(&self, channel_id: &str) -> Option<Arc<ProcessRecord>> {
        self.processes.get(channel_id).map(|entry| entry.clone())
    }

    pub fn channel_ids(&self) -> Vec<String> {
        self.processes.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Terminate a process, gracefully first
    pub async fn terminate_process(&self, record: &ProcessRecord) -> TerminationOutcome {
        terminate_process(record).await
    }

    /// Wait for a finished send's process to be fully reaped
    pub async fn wait_for_termination(&self, record: &ProcessRecord) -> bool {
        match record.wait_timeout(REAP_WINDOW).await {
            Ok(Some(_)) => true,
            Ok(None) => {
                tracing::warn!(pid = ?record.pid(), "Process not reaped within window");
                false
            }
            Err(e) => {
                tracing::warn!(pid = ?record.pid(), error = %e, "Failed waiting for process");
                false
            }
        }
    }

    /// Terminate every tracked process and clear the table
    ///
    /// Idempotent. Returns the number of processes that were terminated.
    pub async fn cleanup_all_processes(&self) -> usize {
        let records: Vec<(String, Arc<ProcessRecord>)> = self
            .processes
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        self.processes.clear();

        if records.is_empty() {
            return 0;
        }

        let outcomes = futures::future::join_all(
            records
                .iter()
                .map(|(_, record)| terminate_process(record.as_ref())),
        )
        .await;

        let mut terminated = 0;
        for ((channel_id, record), outcome) in records.iter().zip(outcomes) {
            match outcome {
                TerminationOutcome::AlreadyExited => {}
                TerminationOutcome::StillRunning => {
                    tracing::warn!(
                        channel_id = %channel_id,
                        pid = ?record.pid(),
                        "Process survived shutdown cleanup"
                    );
                }
                TerminationOutcome::Graceful
                | TerminationOutcome::Forced
                | TerminationOutcome::Joined => terminated += 1,
            }
        }

        tracing::info!(terminated, tracked = records.len(), "Cleaned up agent processes");
        terminated
    }

    /// Number of tracked processes that are still running
    pub async fn active_process_count(&self) -> usize {
        let records: Vec<Arc<ProcessRecord>> =
            self.processes.iter().map(|entry| entry.clone()).collect();
        let mut active = 0;
        for record in records {
            if record.is_alive().await {
                active += 1;
            }
        }
        active
    }

    pub fn scratch_root(&self) -> &Path {
        &self.scratch_root
    }

    /// Create the shared scratch directory
    ///
    /// Failure is logged and yields `None`; the agent then uses the system
    /// temp dir.
    pub async fn prepare_scratch_dir(&self) -> Option<PathBuf> {
        match scratch::prepare(&self.scratch_root).await {
            Ok(dir) => Some(dir),
            Err(e) => {
                tracing::warn!(
                    dir = %self.scratch_root.display(),
                    error = %e,
                    "Failed to prepare scratch dir"
                );
                None
            }
        }
    }

    /// Marker files present before a process starts
    pub async fn snapshot_markers(&self, dir: &Path) -> HashSet<String> {
        scratch::snapshot_markers(dir).await
    }

    /// Delete markers created since `preserved` was taken
    pub async fn cleanup_markers(&self, dir: &Path, preserved: &HashSet<String>) -> usize {
        scratch::cleanup_markers(dir, preserved).await
    }
}
