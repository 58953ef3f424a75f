//! Permission rendezvous
//!
//! Correlates permission requests with their eventual decision:
//! - `create_request` stores a pending entry, asks the presenter to show it,
//!   and returns immediately with a future
//! - `resolve` removes the entry before completing it, so whichever of the
//!   decision and the deadline removes it first wins
//! - the deadline completes the request with `Deny`
//! - any `Deny` interrupts the owning channel, as long as the process that
//!   owned it when the request was opened still does

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

use super::decision::{DecisionSource, PermissionDecision, PermissionOutcome};
use super::presenter::{DecisionListener, PermissionPresenter, PermissionPrompt};
use crate::channel::ChannelRegistry;
use crate::process::ProcessRecord;

/// A request awaiting its decision
#[derive(Debug)]
struct PendingPermissionRequest {
    channel_id: String,
    /// Channel's process when the request was opened
    owner: Option<Arc<ProcessRecord>>,
    tool_name: String,
    created_at: Instant,
    responder: oneshot::Sender<PermissionDecision>,
    /// Deadline task, aborted on explicit resolution
    deadline: Option<AbortHandle>,
}

/// Completes with the request's decision
///
/// Resolves to `Deny` if the rendezvous is dropped first.
#[derive(Debug)]
pub struct PermissionFuture {
    rx: oneshot::Receiver<PermissionDecision>,
}

impl Future for PermissionFuture {
    type Output = PermissionDecision;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(PermissionDecision::Deny))
    }
}

#[derive(Debug)]
struct RendezvousInner {
    pending: DashMap<String, PendingPermissionRequest>,
    channels: Arc<ChannelRegistry>,
    presenter: Arc<dyn PermissionPresenter>,
    listener: Option<Arc<dyn DecisionListener>>,
    timeout: Duration,
}

/// Pending-request table shared by every channel of a bridge
///
/// Cheap to clone; clones share the same table.
#[derive(Debug, Clone)]
pub struct PermissionRendezvous {
    inner: Arc<RendezvousInner>,
}

impl PermissionRendezvous {
    pub fn new(
        channels: Arc<ChannelRegistry>,
        presenter: Arc<dyn PermissionPresenter>,
        timeout: Duration,
    ) -> Self {
        Self::with_listener(channels, presenter, None, timeout)
    }

    pub fn with_listener(
        channels: Arc<ChannelRegistry>,
        presenter: Arc<dyn PermissionPresenter>,
        listener: Option<Arc<dyn DecisionListener>>,
        timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(RendezvousInner {
                pending: DashMap::new(),
                channels,
                presenter,
                listener,
                timeout,
            }),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// Open a request and return its id and decision future
    ///
    /// Must be called within a tokio runtime (the deadline is a spawned task).
    pub fn create_request(
        &self,
        channel_id: &str,
        tool_name: &str,
        inputs: serde_json::Value,
    ) -> (String, PermissionFuture) {
        let request_id = uuid::Uuid::new_v4().to_string();
        let (responder, rx) = oneshot::channel();

        self.inner.pending.insert(
            request_id.clone(),
            PendingPermissionRequest {
                channel_id: channel_id.to_string(),
                owner: self.inner.channels.processes().process(channel_id),
                tool_name: tool_name.to_string(),
                created_at: Instant::now(),
                responder,
                deadline: None,
            },
        );

        let deadline = {
            let rendezvous = self.clone();
            let request_id = request_id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(rendezvous.inner.timeout).await;
                if rendezvous.complete(&request_id, PermissionDecision::Deny, DecisionSource::Timeout) {
                    tracing::warn!(
                        request_id = %request_id,
                        timeout_secs = rendezvous.inner.timeout.as_secs(),
                        "Permission request timed out, denying"
                    );
                }
            })
            .abort_handle()
        };
        if let Some(mut entry) = self.inner.pending.get_mut(&request_id) {
            entry.deadline = Some(deadline);
        }

        tracing::info!(
            request_id = %request_id,
            channel_id = %channel_id,
            tool_name = %tool_name,
            "Permission requested"
        );

        self.inner.presenter.present(PermissionPrompt {
            request_id: request_id.clone(),
            channel_id: channel_id.to_string(),
            tool_name: tool_name.to_string(),
            inputs,
        });

        (request_id, PermissionFuture { rx })
    }

    /// Deliver a decision
    ///
    /// Returns `false` if the request is unknown or already resolved (for
    /// example after its deadline).
    pub fn resolve(&self, request_id: &str, decision: PermissionDecision) -> bool {
        let resolved = self.complete(request_id, decision, DecisionSource::User);
        if !resolved {
            tracing::debug!(
                request_id = %request_id,
                decision = %decision,
                "Ignoring decision for unknown or expired request"
            );
        }
        resolved
    }

    /// Report a request allowed by a standing policy without prompting
    ///
    /// Nothing is stored; listeners see it like any other decision.
    pub fn record_remembered(&self, request_id: &str, channel_id: &str, tool_name: &str) {
        tracing::info!(
            request_id = %request_id,
            channel_id = %channel_id,
            tool_name = %tool_name,
            "Permission allowed by remembered decision"
        );
        if let Some(listener) = &self.inner.listener {
            listener.on_decision(&PermissionOutcome {
                request_id: request_id.to_string(),
                channel_id: channel_id.to_string(),
                tool_name: tool_name.to_string(),
                decision: PermissionDecision::AllowRemember,
                source: DecisionSource::Remembered,
            });
        }
    }

    pub fn is_pending(&self, request_id: &str) -> bool {
        self.inner.pending.contains_key(request_id)
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Remove and complete a request; only the first caller succeeds
    fn complete(
        &self,
        request_id: &str,
        decision: PermissionDecision,
        source: DecisionSource,
    ) -> bool {
        let Some((request_id, pending)) = self.inner.pending.remove(request_id) else {
            return false;
        };

        if source == DecisionSource::User {
            if let Some(deadline) = &pending.deadline {
                deadline.abort();
            }
        }

        tracing::info!(
            request_id = %request_id,
            channel_id = %pending.channel_id,
            tool_name = %pending.tool_name,
            decision = %decision,
            source = ?source,
            waited_ms = pending.created_at.elapsed().as_millis(),
            "Permission resolved"
        );

        if pending.responder.send(decision).is_err() {
            tracing::debug!(request_id = %request_id, "Permission future was dropped");
        }

        let outcome = PermissionOutcome {
            request_id,
            channel_id: pending.channel_id,
            tool_name: pending.tool_name,
            decision,
            source,
        };

        if let Some(listener) = &self.inner.listener {
            listener.on_decision(&outcome);
        }

        if decision == PermissionDecision::Deny {
            match pending.owner {
                Some(owner) => {
                    // Interrupt off the caller's task so resolution never waits on termination
                    let channels = self.inner.channels.clone();
                    let channel_id = outcome.channel_id;
                    tokio::spawn(async move {
                        channels.interrupt_if_current(&channel_id, &owner).await;
                    });
                }
                None => tracing::debug!(
                    channel_id = %outcome.channel_id,
                    "Denied request had no running process to interrupt"
                ),
            }
        }

        true
    }
}
