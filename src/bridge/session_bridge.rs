//! Session bridge
//!
//! Turns one send into one agent process: spawn, write the request to
//! stdin, decode the merged output line by line, then resolve the outcome
//! and clean up. Each bridge owns its channel registry and permission
//! table; nothing is process-global.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tracing::Instrument;

use super::callback::SessionCallback;
use super::outcome::{SendOutcome, SessionAccumulator};
use crate::channel::ChannelRegistry;
use crate::permission::{
    DecisionListener, PermissionFileChannel, PermissionPresenter, PermissionRendezvous,
};
use crate::process::{CommandSpec, EnvironmentBuilder, ProcessLifecycleManager, ProcessRecord};
use crate::protocol::{DecodedEvent, ProtocolLineDecoder, StdoutLineCodec};
use crate::tracing::ErrorTraceExt;
use crate::types::{BridgeConfig, Provider, SessionRequest, SessionResult};

/// Working-directory values front ends send when no project is open
const UNSET_CWD_VALUES: [&str; 2] = ["undefined", "null"];

/// Streaming bridge to one agent provider
///
/// Cheap to clone; clones share processes, channels and pending permissions.
#[derive(Debug, Clone)]
pub struct SessionBridge {
    provider: Provider,
    config: Arc<BridgeConfig>,
    processes: Arc<ProcessLifecycleManager>,
    channels: Arc<ChannelRegistry>,
    permissions: PermissionRendezvous,
}

impl SessionBridge {
    pub fn new(
        provider: Provider,
        config: BridgeConfig,
        presenter: Arc<dyn PermissionPresenter>,
    ) -> Self {
        Self::with_listener(provider, config, presenter, None)
    }

    pub fn with_listener(
        provider: Provider,
        config: BridgeConfig,
        presenter: Arc<dyn PermissionPresenter>,
        listener: Option<Arc<dyn DecisionListener>>,
    ) -> Self {
        let processes = Arc::new(ProcessLifecycleManager::new(config.scratch_root.clone()));
        let channels = Arc::new(ChannelRegistry::new(processes.clone()));
        let permissions = PermissionRendezvous::with_listener(
            channels.clone(),
            presenter,
            listener,
            config.permission_timeout,
        );

        tracing::info!(
            provider = %provider,
            runtime = %config.runtime.display(),
            bridge_dir = %config.bridge_dir.display(),
            "Session bridge created"
        );

        Self {
            provider,
            config: Arc::new(config),
            processes,
            channels,
            permissions,
        }
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn processes(&self) -> &Arc<ProcessLifecycleManager> {
        &self.processes
    }

    pub fn channels(&self) -> &Arc<ChannelRegistry> {
        &self.channels
    }

    pub fn permissions(&self) -> &PermissionRendezvous {
        &self.permissions
    }

    /// File channel feeding this bridge's permission table
    pub fn permission_file_channel(&self) -> PermissionFileChannel {
        PermissionFileChannel::new(self.config.permission_dir.clone(), self.permissions.clone())
    }

    /// Start a send on `channel_id`
    ///
    /// Returns immediately. The handle always resolves to a result; failures
    /// are reported in it rather than as a task error.
    pub fn send(
        &self,
        channel_id: impl Into<String>,
        request: SessionRequest,
        callback: Arc<dyn SessionCallback>,
    ) -> JoinHandle<SessionResult> {
        let bridge = self.clone();
        let channel_id = channel_id.into();
        tokio::spawn(async move { bridge.run_send(&channel_id, request, callback.as_ref()).await })
    }

    /// Run a send to completion on the current task
    pub async fn run_send(
        &self,
        channel_id: &str,
        request: SessionRequest,
        callback: &dyn SessionCallback,
    ) -> SessionResult {
        let span = tracing::info_span!(
            "send",
            channel_id = %channel_id,
            provider = %self.provider,
            command = request.command_name(),
        );
        self.run_send_inner(channel_id, request, callback)
            .instrument(span)
            .await
    }

    async fn run_send_inner(
        &self,
        channel_id: &str,
        request: SessionRequest,
        callback: &dyn SessionCallback,
    ) -> SessionResult {
        let payload = match request.to_stdin_json() {
            Ok(payload) => payload,
            Err(e) => {
                e.trace_error();
                let message = e.to_string();
                callback.on_error(&message);
                return SessionResult::spawn_failed(message);
            }
        };

        let scratch_dir = self.processes.prepare_scratch_dir().await;
        let preserved = match &scratch_dir {
            Some(dir) => self.processes.snapshot_markers(dir).await,
            None => HashSet::new(),
        };

        let working_dir = self.resolve_working_dir(&request);
        let mut env_builder = EnvironmentBuilder::new(&self.config)
            .channel_id(channel_id)
            .project_dir(&working_dir);
        if let Some(dir) = &scratch_dir {
            env_builder = env_builder.scratch_dir(dir);
        }
        let env = env_builder.build();
        let command = self.command_for(&request);

        let (record, io) = match self.processes.spawn(&command, &working_dir, &env) {
            Ok(spawned) => spawned,
            Err(e) => {
                e.trace_error();
                let message = e.to_string();
                callback.on_error(&message);
                return SessionResult::spawn_failed(message);
            }
        };

        self.channels
            .register_and_evict_prior(channel_id, record.clone())
            .await;

        // Written concurrently so a chatty child cannot stall on a full stdout pipe
        let stdin_task = tokio::spawn(write_request(io.stdin, payload));

        let stdout = FramedRead::new(io.stdout, StdoutLineCodec::new());
        let mut lines: BoxStream<'static, std::io::Result<String>> = match io.stderr {
            Some(stderr) => {
                futures::stream::select(stdout, FramedRead::new(stderr, StdoutLineCodec::new()))
                    .boxed()
            }
            None => stdout.boxed(),
        };

        let mut decoder = ProtocolLineDecoder::new(self.provider);
        let mut accumulator = SessionAccumulator::new();
        let mut line_count = 0usize;
        let mut error_reported = false;

        while let Some(line) = lines.next().await {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed reading agent output, stopping decode");
                    break;
                }
            };
            line_count += 1;
            accumulator.push_raw_line(&line);

            let Some(event) = decoder.decode_line(&line) else {
                continue;
            };
            if let DecodedEvent::DiagnosticLine(diagnostic) = &event {
                tracing::warn!(diagnostic = %diagnostic, "Agent reported a diagnostic");
            }

            accumulator.apply(&event);
            callback.on_event(&event);
            if let DecodedEvent::SendError(message) = &event {
                tracing::warn!(error = %message, "Agent reported send error");
                // Only the first one reaches the callback
                if !error_reported {
                    error_reported = true;
                    callback.on_error(message);
                }
            }
        }
        drop(lines);
        drop(stdin_task.await);

        let exit_code = match record.wait().await {
            Ok(status) => status.code(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed waiting for agent process");
                None
            }
        };

        let interrupted = self.take_interrupted(channel_id, &record) || record.was_terminated();
        let (result, outcome) = accumulator.finish(interrupted, exit_code);

        tracing::info!(
            exit_code = ?exit_code,
            interrupted,
            line_count,
            message_count = result.message_count(),
            content_len = result.final_content.len(),
            "Send finished"
        );

        // A send error already delivered is this send's terminal callback
        if !error_reported {
            match &outcome {
                SendOutcome::Completed | SendOutcome::Cancelled => callback.on_complete(&result),
                SendOutcome::Failed(message) => callback.on_error(message),
            }
        }

        self.processes.unregister_process(channel_id, &record);
        self.processes.wait_for_termination(&record).await;
        if let Some(dir) = &scratch_dir {
            let removed = self.processes.cleanup_markers(dir, &preserved).await;
            if removed > 0 {
                tracing::debug!(removed, "Removed scratch markers");
            }
        }

        result
    }

    /// Consume the channel's interrupted flag, unless a newer send owns it
    fn take_interrupted(&self, channel_id: &str, record: &Arc<ProcessRecord>) -> bool {
        let owns_channel = self
            .processes
            .process(channel_id)
            .is_none_or(|current| Arc::ptr_eq(&current, record));
        owns_channel && self.channels.was_interrupted(channel_id)
    }

    /// Interrupt the channel's running send, if any
    pub async fn interrupt(&self, channel_id: &str) -> bool {
        self.channels.interrupt(channel_id).await
    }

    pub async fn active_process_count(&self) -> usize {
        self.processes.active_process_count().await
    }

    /// Terminate every process this bridge started
    pub async fn shutdown(&self) -> usize {
        tracing::info!(provider = %self.provider, "Shutting down session bridge");
        self.channels.cleanup_all().await
    }

    /// Command line for a request
    pub fn command_for(&self, request: &SessionRequest) -> CommandSpec {
        CommandSpec::new(&self.config.runtime)
            .arg(self.config.entry_script_path())
            .arg(self.provider.as_str())
            .arg(request.command_name())
    }

    /// Working directory for a request's process
    ///
    /// Falls back to the bridge directory when the requested one is blank,
    /// a placeholder, or not an existing directory.
    pub fn resolve_working_dir(&self, request: &SessionRequest) -> PathBuf {
        request
            .cwd
            .as_ref()
            .filter(|cwd| {
                let raw = cwd.to_string_lossy();
                let raw = raw.trim();
                !raw.is_empty() && !UNSET_CWD_VALUES.contains(&raw) && cwd.is_dir()
            })
            .cloned()
            .unwrap_or_else(|| self.config.bridge_dir.clone())
    }
}

/// Write the request payload and close stdin
///
/// Failures are logged only; the exit code decides the outcome.
async fn write_request(stdin: Option<ChildStdin>, payload: String) {
    let Some(mut stdin) = stdin else {
        tracing::warn!("Agent stdin not available, request not written");
        return;
    };

    if let Err(e) = stdin.write_all(payload.as_bytes()).await {
        tracing::warn!(error = %e, "Failed to write request to agent stdin");
        return;
    }
    if let Err(e) = stdin.shutdown().await {
        tracing::debug!(error = %e, "Failed to close agent stdin");
    }
    tracing::debug!(bytes = payload.len(), "Request written to agent stdin");
}
