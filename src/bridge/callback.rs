//! Callbacks through which a send reports progress

use tokio::sync::mpsc;

use crate::protocol::DecodedEvent;
use crate::types::SessionResult;

/// Receives one send's events, in stream order
///
/// Exactly one of `on_error` or `on_complete` fires per send: `on_complete`
/// for success and cancellation, `on_error` for failures (immediately for an
/// agent-reported send error, after exit otherwise). Once a send error has
/// been reported, nothing else terminal follows, even if the send is then
/// cancelled.
pub trait SessionCallback: Send + Sync {
    fn on_event(&self, event: &DecodedEvent);

    fn on_error(&self, message: &str);

    fn on_complete(&self, result: &SessionResult);
}

/// Everything a send reports, as a single value
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeUpdate {
    Event(DecodedEvent),
    Error(String),
    Complete(SessionResult),
}

/// Callback that forwards updates over an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelCallback {
    tx: mpsc::UnboundedSender<BridgeUpdate>,
}

impl ChannelCallback {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BridgeUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, update: BridgeUpdate) {
        // The receiver may be gone; the send keeps running regardless
        drop(self.tx.send(update));
    }
}

impl SessionCallback for ChannelCallback {
    fn on_event(&self, event: &DecodedEvent) {
        self.forward(BridgeUpdate::Event(event.clone()));
    }

    fn on_error(&self, message: &str) {
        self.forward(BridgeUpdate::Error(message.to_string()));
    }

    fn on_complete(&self, result: &SessionResult) {
        self.forward(BridgeUpdate::Complete(result.clone()));
    }
}
