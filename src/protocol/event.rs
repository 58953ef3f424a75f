//! Typed events decoded from agent output

use serde::Serialize;

/// One classified protocol line
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum DecodedEvent {
    /// `[MESSAGE_START]`
    MessageStart,
    /// `[MESSAGE_END]`
    MessageEnd,
    /// `[CONTENT]`: a whole content block
    ContentChunk(String),
    /// `[CONTENT_DELTA]`: an incremental piece of content
    ContentDelta(String),
    /// `[THINKING]`
    Thinking(String),
    /// `[SESSION_ID]` or `[THREAD_ID]`
    SessionIdAnnounced(String),
    /// `[SLASH_COMMANDS]`: command names available in the session
    SlashCommandsAnnounced(Vec<String>),
    /// `[MESSAGE]` envelope, or a `[JSON_START]`..`[JSON_END]` block
    StructuredMessage(serde_json::Value),
    /// `[SEND_ERROR]`: the send failed
    SendError(String),
    /// `[UNCAUGHT_ERROR]`, `[UNHANDLED_REJECTION]` or `[COMMAND_ERROR]`, the whole line
    DiagnosticLine(String),
}

impl DecodedEvent {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            DecodedEvent::MessageStart => "message_start",
            DecodedEvent::MessageEnd => "message_end",
            DecodedEvent::ContentChunk(_) => "content_chunk",
            DecodedEvent::ContentDelta(_) => "content_delta",
            DecodedEvent::Thinking(_) => "thinking",
            DecodedEvent::SessionIdAnnounced(_) => "session_id_announced",
            DecodedEvent::SlashCommandsAnnounced(_) => "slash_commands_announced",
            DecodedEvent::StructuredMessage(_) => "structured_message",
            DecodedEvent::SendError(_) => "send_error",
            DecodedEvent::DiagnosticLine(_) => "diagnostic_line",
        }
    }

    /// `type` field of a structured message
    pub fn message_type(&self) -> Option<&str> {
        match self {
            DecodedEvent::StructuredMessage(value) => {
                value.get("type").and_then(|t| t.as_str())
            }
            _ => None,
        }
    }
}
