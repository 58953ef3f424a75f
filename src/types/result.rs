//! Final outcome of a single send

use serde::Serialize;

/// Result of one send, built up during the decode loop
///
/// Finalized once the process has exited and the channel's interrupted
/// state is known.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResult {
    pub success: bool,
    /// `None` on success and on cancellation
    pub error: Option<String>,
    /// The send was cancelled by an interrupt or by the bridge itself
    pub cancelled: bool,
    /// Structured messages in arrival order
    pub messages: Vec<serde_json::Value>,
    pub final_content: String,
    /// Every line read from the process, newline-joined
    pub raw_output: String,
    /// Session or thread id announced by the agent
    pub session_id: Option<String>,
    /// `None` when the process could not be started or was killed by a signal
    pub exit_code: Option<i32>,
}

impl SessionResult {
    /// Result for a send that never got a running process
    pub fn spawn_failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}
