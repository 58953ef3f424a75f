//! File-based permission IPC with agent processes
//!
//! An agent asks for permission by writing `request-<id>.json` into the
//! permission directory and polling for `response-<id>.json`. This channel
//! picks requests up, routes them through the [`PermissionRendezvous`], and
//! writes the answer back.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashSet;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::decision::PermissionDecision;
use super::rendezvous::PermissionRendezvous;
use crate::types::Result;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Grace period for the agent to finish writing a request file
const WRITE_SETTLE: Duration = Duration::from_millis(100);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestFile {
    request_id: String,
    tool_name: String,
    #[serde(default)]
    inputs: serde_json::Value,
    #[serde(default)]
    channel_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ResponseFile {
    allow: bool,
}

/// Poller for the permission directory
#[derive(Debug, Clone)]
pub struct PermissionFileChannel {
    dir: PathBuf,
    rendezvous: PermissionRendezvous,
    poll_interval: Duration,
    /// Tools the user chose to always allow
    remembered: Arc<DashSet<String>>,
    /// Request files currently being handled
    processing: Arc<DashSet<String>>,
}

impl PermissionFileChannel {
    pub fn new(dir: impl Into<PathBuf>, rendezvous: PermissionRendezvous) -> Self {
        Self {
            dir: dir.into(),
            rendezvous,
            poll_interval: DEFAULT_POLL_INTERVAL,
            remembered: Arc::new(DashSet::new()),
            processing: Arc::new(DashSet::new()),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_remembered(&self, tool_name: &str) -> bool {
        self.remembered.contains(tool_name)
    }

    /// Forget every standing allow
    pub fn clear_remembered(&self) {
        self.remembered.clear();
    }

    /// Run the poll loop until `cancel` fires
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    async fn run(self, cancel: CancellationToken) {
        tracing::info!(dir = %self.dir.display(), "Permission file channel started");
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        tracing::warn!(dir = %self.dir.display(), error = %e, "Permission poll failed");
                    }
                }
            }
        }
        tracing::info!("Permission file channel stopped");
    }

    /// Scan the directory once; returns the number of new requests picked up
    pub async fn poll_once(&self) -> Result<usize> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let mut picked = 0;
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !(name.starts_with("request-") && name.ends_with(".json")) {
                continue;
            }
            if !self.processing.insert(name.clone()) {
                continue;
            }

            picked += 1;
            let channel = self.clone();
            let path = entry.path();
            tokio::spawn(async move {
                channel.handle_request_file(&path).await;
                channel.processing.remove(&name);
            });
        }
        Ok(picked)
    }

    async fn handle_request_file(&self, path: &Path) {
        tokio::time::sleep(WRITE_SETTLE).await;

        let request = match read_request(path).await {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Discarding unreadable permission request");
                remove_quietly(path).await;
                return;
            }
        };
        remove_quietly(path).await;

        let channel_id = request.channel_id.as_deref().unwrap_or_default();
        if self.remembered.contains(&request.tool_name) {
            self.rendezvous
                .record_remembered(&request.request_id, channel_id, &request.tool_name);
            self.respond(&request.request_id, true).await;
            return;
        }

        let (_, decision) =
            self.rendezvous
                .create_request(channel_id, &request.tool_name, request.inputs);
        let decision = decision.await;

        if decision == PermissionDecision::AllowRemember {
            self.remembered.insert(request.tool_name.clone());
        }
        self.respond(&request.request_id, decision.is_allowed()).await;
    }

    async fn respond(&self, request_id: &str, allow: bool) {
        if let Err(e) = write_response(&self.dir, request_id, allow).await {
            tracing::error!(request_id = %request_id, error = %e, "Failed to write permission response");
        }
    }
}

async fn read_request(path: &Path) -> Result<RequestFile> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&content)?)
}

/// Write `response-<id>.json` atomically via a temp file and rename
async fn write_response(dir: &Path, request_id: &str, allow: bool) -> Result<()> {
    let body = serde_json::to_vec(&ResponseFile { allow })?;
    let target = dir.join(format!("response-{request_id}.json"));
    let staging = dir.join(format!(".response-{request_id}.json.tmp"));

    tokio::fs::write(&staging, body).await?;
    tokio::fs::rename(&staging, &target).await?;
    tracing::debug!(request_id = %request_id, allow, "Permission response written");
    Ok(())
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::debug!(path = %path.display(), error = %e, "Failed to remove request file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelRegistry;
    use crate::permission::{ChannelPresenter, DecisionListener, DecisionSource, PermissionOutcome};
    use crate::process::ProcessLifecycleManager;

    #[derive(Debug, Default)]
    struct RecordingListener {
        outcomes: std::sync::Mutex<Vec<PermissionOutcome>>,
    }

    impl DecisionListener for RecordingListener {
        fn on_decision(&self, outcome: &PermissionOutcome) {
            self.outcomes.lock().unwrap().push(outcome.clone());
        }
    }

    fn rendezvous(
        timeout: Duration,
    ) -> (
        PermissionRendezvous,
        tokio::sync::mpsc::UnboundedReceiver<crate::permission::PermissionPrompt>,
    ) {
        rendezvous_with_listener(timeout, None)
    }

    fn rendezvous_with_listener(
        timeout: Duration,
        listener: Option<Arc<dyn DecisionListener>>,
    ) -> (
        PermissionRendezvous,
        tokio::sync::mpsc::UnboundedReceiver<crate::permission::PermissionPrompt>,
    ) {
        let channels = Arc::new(ChannelRegistry::new(Arc::new(ProcessLifecycleManager::new(
            std::env::temp_dir().join("agent-bridge-test-scratch"),
        ))));
        let (presenter, prompts) = ChannelPresenter::new();
        (
            PermissionRendezvous::with_listener(channels, Arc::new(presenter), listener, timeout),
            prompts,
        )
    }

    fn write_request(dir: &Path, request_id: &str, tool_name: &str) {
        let body = serde_json::json!({
            "requestId": request_id,
            "toolName": tool_name,
            "inputs": {"file_path": "/tmp/x"},
            "channelId": "tab-1"
        });
        std::fs::write(dir.join(format!("request-{request_id}.json")), body.to_string()).unwrap();
    }

    async fn read_response(dir: &Path, request_id: &str) -> serde_json::Value {
        let path = dir.join(format!("response-{request_id}.json"));
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(content) = tokio::fs::read_to_string(&path).await {
                    return serde_json::from_str(&content).unwrap();
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_request_is_presented_and_answered() {
        let tmp = tempfile::tempdir().unwrap();
        let (rendezvous, mut prompts) = rendezvous(Duration::from_secs(35));
        let channel = PermissionFileChannel::new(tmp.path(), rendezvous.clone());

        write_request(tmp.path(), "r1", "Write");
        assert_eq!(channel.poll_once().await.unwrap(), 1);
        // Already in flight
        assert_eq!(channel.poll_once().await.unwrap(), 0);

        let prompt = prompts.recv().await.unwrap();
        assert_eq!(prompt.channel_id, "tab-1");
        assert_eq!(prompt.tool_name, "Write");
        assert_eq!(prompt.inputs["file_path"], "/tmp/x");
        assert!(!tmp.path().join("request-r1.json").exists());

        rendezvous.resolve(&prompt.request_id, PermissionDecision::Allow);
        assert_eq!(read_response(tmp.path(), "r1").await, serde_json::json!({"allow": true}));
        assert!(!channel.is_remembered("Write"));
    }

    #[tokio::test]
    async fn test_allow_remember_skips_later_prompts() {
        let tmp = tempfile::tempdir().unwrap();
        let (rendezvous, mut prompts) = rendezvous(Duration::from_secs(35));
        let channel = PermissionFileChannel::new(tmp.path(), rendezvous.clone());

        write_request(tmp.path(), "r1", "Edit");
        channel.poll_once().await.unwrap();
        let prompt = prompts.recv().await.unwrap();
        rendezvous.resolve(&prompt.request_id, PermissionDecision::AllowRemember);
        assert_eq!(read_response(tmp.path(), "r1").await["allow"], true);
        assert!(channel.is_remembered("Edit"));

        write_request(tmp.path(), "r2", "Edit");
        channel.poll_once().await.unwrap();
        assert_eq!(read_response(tmp.path(), "r2").await["allow"], true);
        assert!(prompts.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_remembered_allow_is_reported_to_listener() {
        let tmp = tempfile::tempdir().unwrap();
        let listener = Arc::new(RecordingListener::default());
        let (rendezvous, mut prompts) =
            rendezvous_with_listener(Duration::from_secs(35), Some(listener.clone()));
        let channel = PermissionFileChannel::new(tmp.path(), rendezvous.clone());

        write_request(tmp.path(), "r1", "Edit");
        channel.poll_once().await.unwrap();
        let prompt = prompts.recv().await.unwrap();
        rendezvous.resolve(&prompt.request_id, PermissionDecision::AllowRemember);
        read_response(tmp.path(), "r1").await;

        write_request(tmp.path(), "r2", "Edit");
        channel.poll_once().await.unwrap();
        assert_eq!(read_response(tmp.path(), "r2").await["allow"], true);

        let outcomes = listener.outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].source, DecisionSource::User);
        assert_eq!(outcomes[1].request_id, "r2");
        assert_eq!(outcomes[1].channel_id, "tab-1");
        assert_eq!(outcomes[1].tool_name, "Edit");
        assert_eq!(outcomes[1].decision, PermissionDecision::AllowRemember);
        assert_eq!(outcomes[1].source, DecisionSource::Remembered);
    }

    #[tokio::test]
    async fn test_timeout_writes_deny() {
        let tmp = tempfile::tempdir().unwrap();
        let (rendezvous, _prompts) = rendezvous(Duration::from_millis(50));
        let channel = PermissionFileChannel::new(tmp.path(), rendezvous);

        write_request(tmp.path(), "r1", "Bash");
        channel.poll_once().await.unwrap();
        assert_eq!(read_response(tmp.path(), "r1").await, serde_json::json!({"allow": false}));
    }

    #[tokio::test]
    async fn test_malformed_request_is_discarded() {
        let tmp = tempfile::tempdir().unwrap();
        let (rendezvous, _prompts) = rendezvous(Duration::from_secs(35));
        let channel = PermissionFileChannel::new(tmp.path(), rendezvous.clone());

        let path = tmp.path().join("request-bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        channel.poll_once().await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while path.exists() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(rendezvous.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_spawned_loop_stops_on_cancel() {
        let tmp = tempfile::tempdir().unwrap();
        let (rendezvous, mut prompts) = rendezvous(Duration::from_secs(35));
        let cancel = CancellationToken::new();
        let handle = PermissionFileChannel::new(tmp.path(), rendezvous)
            .with_poll_interval(Duration::from_millis(20))
            .spawn(cancel.clone());

        write_request(tmp.path(), "r1", "Read");
        let prompt = tokio::time::timeout(Duration::from_secs(5), prompts.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(prompt.tool_name, "Read");

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
