//! Result accumulation and final outcome resolution

use crate::protocol::DecodedEvent;
use crate::types::{BridgeError, SessionResult};

/// Substituted for an unexplained exit code 1
pub const ENVIRONMENT_HINT: &str =
    "Agent runtime environment error, check the runtime executable path in settings";

/// How a send ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Completed,
    /// Interrupted, or stopped by the bridge; never an error
    Cancelled,
    Failed(String),
}

/// Decide the outcome once the process has exited and output is drained
///
/// Cancellation beats everything, an explicit send error beats the exit
/// code, and an exit code of 1 with no diagnostic is treated as an
/// environment problem.
pub fn resolve_outcome(
    interrupted: bool,
    send_error: Option<&str>,
    exit_code: Option<i32>,
    last_diagnostic: Option<&str>,
) -> SendOutcome {
    if interrupted {
        return SendOutcome::Cancelled;
    }
    if let Some(message) = send_error {
        return SendOutcome::Failed(message.to_string());
    }

    // Killed by a signal we did not send
    let code = exit_code.unwrap_or(-1);
    if code == 0 {
        return SendOutcome::Completed;
    }

    let message = BridgeError::ExitCode(code).to_string();
    let message = match last_diagnostic {
        Some(diagnostic) => format!("{message} | Last diagnostic: {diagnostic}"),
        None if code == 1 => format!("{ENVIRONMENT_HINT} ({message})"),
        None => message,
    };
    SendOutcome::Failed(message)
}

/// Builds a [`SessionResult`] from the decoded stream
///
/// The last `SendError` seen becomes the result's error.
#[derive(Debug, Default)]
pub struct SessionAccumulator {
    result: SessionResult,
    send_error: Option<String>,
    last_diagnostic: Option<String>,
}

impl SessionAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_raw_line(&mut self, line: &str) {
        self.result.raw_output.push_str(line);
        self.result.raw_output.push('\n');
    }

    pub fn apply(&mut self, event: &DecodedEvent) {
        match event {
            DecodedEvent::ContentDelta(delta) => self.result.final_content.push_str(delta),
            DecodedEvent::ContentChunk(chunk) => {
                // Providers may echo the full text after streaming deltas
                if !self.result.final_content.contains(chunk.as_str()) {
                    self.result.final_content.push_str(chunk);
                }
            }
            DecodedEvent::StructuredMessage(value) => self.result.messages.push(value.clone()),
            // Latest wins when the agent reports several
            DecodedEvent::SendError(message) => self.send_error = Some(message.clone()),
            DecodedEvent::SessionIdAnnounced(id) => self.result.session_id = Some(id.clone()),
            DecodedEvent::DiagnosticLine(line) => self.last_diagnostic = Some(line.clone()),
            DecodedEvent::MessageStart
            | DecodedEvent::MessageEnd
            | DecodedEvent::Thinking(_)
            | DecodedEvent::SlashCommandsAnnounced(_) => {}
        }
    }

    pub fn send_error(&self) -> Option<&str> {
        self.send_error.as_deref()
    }

    pub fn last_diagnostic(&self) -> Option<&str> {
        self.last_diagnostic.as_deref()
    }

    pub fn final_content(&self) -> &str {
        &self.result.final_content
    }

    /// Apply the outcome rule and produce the final result
    pub fn finish(self, interrupted: bool, exit_code: Option<i32>) -> (SessionResult, SendOutcome) {
        let outcome = resolve_outcome(
            interrupted,
            self.send_error.as_deref(),
            exit_code,
            self.last_diagnostic.as_deref(),
        );

        let mut result = self.result;
        result.exit_code = exit_code;
        match &outcome {
            SendOutcome::Completed => result.success = true,
            SendOutcome::Cancelled => result.cancelled = true,
            SendOutcome::Failed(message) => result.error = Some(message.clone()),
        }
        (result, outcome)
    }
}
