//! Channel registry
//!
//! Binds a logical channel (one conversation) to at most one live agent
//! process and provides targeted and global cancellation.

use std::sync::Arc;

use dashmap::DashSet;

use crate::process::{ProcessLifecycleManager, ProcessRecord, terminate_process};

/// Maps channel ids to their live process and tracks interrupted channels
///
/// Interrupting a channel with no process is always a no-op.
#[derive(Debug)]
pub struct ChannelRegistry {
    processes: Arc<ProcessLifecycleManager>,
    /// Channels interrupted since their current send started
    interrupted: DashSet<String>,
}

impl ChannelRegistry {
    pub fn new(processes: Arc<ProcessLifecycleManager>) -> Self {
        Self {
            processes,
            interrupted: DashSet::new(),
        }
    }

    pub fn processes(&self) -> &Arc<ProcessLifecycleManager> {
        &self.processes
    }

    /// Install `record` as the channel's process
    ///
    /// Any prior process for the channel is terminated first, and the
    /// channel's interrupted flag is cleared.
    pub async fn register_and_evict_prior(&self, channel_id: &str, record: Arc<ProcessRecord>) {
        if let Some(prior) = self.processes.process(channel_id) {
            if !Arc::ptr_eq(&prior, &record) {
                tracing::info!(
                    channel_id = %channel_id,
                    prior_pid = ?prior.pid(),
                    new_pid = ?record.pid(),
                    "Evicting prior process for channel"
                );
                let outcome = terminate_process(&prior).await;
                tracing::debug!(channel_id = %channel_id, outcome = ?outcome, "Prior process evicted");
                self.processes.unregister_process(channel_id, &prior);
            }
        }

        self.interrupted.remove(channel_id);

        if let Some(displaced) = self.processes.register_process(channel_id, record.clone()) {
            // Raced with another registration for the same channel
            if !Arc::ptr_eq(&displaced, &record) {
                tracing::warn!(
                    channel_id = %channel_id,
                    pid = ?displaced.pid(),
                    "Concurrent registration displaced a process, terminating it"
                );
                terminate_process(&displaced).await;
            }
        }
    }

    /// Interrupt the channel's current process
    ///
    /// Returns `false` (and changes nothing) if no process is registered.
    pub async fn interrupt(&self, channel_id: &str) -> bool {
        let Some(record) = self.processes.process(channel_id) else {
            tracing::debug!(channel_id = %channel_id, "Interrupt ignored, no active process");
            return false;
        };
        self.interrupt_record(channel_id, record).await
    }

    /// Interrupt the channel only while `record` is still its process
    ///
    /// A newer send that has since taken the channel is left running.
    pub async fn interrupt_if_current(&self, channel_id: &str, record: &Arc<ProcessRecord>) -> bool {
        match self.processes.process(channel_id) {
            Some(current) if Arc::ptr_eq(&current, record) => {
                self.interrupt_record(channel_id, current).await
            }
            _ => {
                tracing::debug!(
                    channel_id = %channel_id,
                    pid = ?record.pid(),
                    "Interrupt skipped, process no longer owns the channel"
                );
                false
            }
        }
    }

    async fn interrupt_record(&self, channel_id: &str, record: Arc<ProcessRecord>) -> bool {
        self.interrupted.insert(channel_id.to_string());
        tracing::info!(channel_id = %channel_id, pid = ?record.pid(), "Interrupting channel");

        let outcome = terminate_process(&record).await;
        self.processes.unregister_process(channel_id, &record);

        tracing::info!(channel_id = %channel_id, outcome = ?outcome, "Channel interrupted");
        true
    }

    /// Read and clear the channel's interrupted flag
    pub fn was_interrupted(&self, channel_id: &str) -> bool {
        self.interrupted.remove(channel_id).is_some()
    }

    pub fn has_process(&self, channel_id: &str) -> bool {
        self.processes.process(channel_id).is_some()
    }

    /// Terminate every registered process and clear all interrupted flags
    pub async fn cleanup_all(&self) -> usize {
        let terminated = self.processes.cleanup_all_processes().await;
        self.interrupted.clear();
        terminated
    }
}
