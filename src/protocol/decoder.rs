//! Tag classification for agent output lines
//!
//! Every line is classified by its leading tag into at most one
//! [`DecodedEvent`]. Between `[JSON_START]` and `[JSON_END]` lines are
//! buffered verbatim instead, since a JSON payload can contain text that
//! looks like a tag.

use super::event::DecodedEvent;
use crate::types::{BridgeError, Provider, Result};

pub const TAG_MESSAGE: &str = "[MESSAGE]";
pub const TAG_MESSAGE_START: &str = "[MESSAGE_START]";
pub const TAG_MESSAGE_END: &str = "[MESSAGE_END]";
pub const TAG_CONTENT: &str = "[CONTENT]";
pub const TAG_CONTENT_DELTA: &str = "[CONTENT_DELTA]";
pub const TAG_THINKING: &str = "[THINKING]";
pub const TAG_SLASH_COMMANDS: &str = "[SLASH_COMMANDS]";
pub const TAG_SEND_ERROR: &str = "[SEND_ERROR]";
pub const TAG_JSON_START: &str = "[JSON_START]";
pub const TAG_JSON_END: &str = "[JSON_END]";

/// Runtime diagnostics, kept for failure messages
pub const DIAGNOSTIC_TAGS: [&str; 3] = ["[UNCAUGHT_ERROR]", "[UNHANDLED_REJECTION]", "[COMMAND_ERROR]"];

/// Stateful decoder for one process's output
#[derive(Debug)]
pub struct ProtocolLineDecoder {
    provider: Provider,
    in_json_block: bool,
    json_block: String,
}

impl ProtocolLineDecoder {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            in_json_block: false,
            json_block: String::new(),
        }
    }

    pub fn in_json_block(&self) -> bool {
        self.in_json_block
    }

    /// Decode one complete line
    ///
    /// Malformed payloads are logged and skipped; they never end the stream.
    pub fn decode_line(&mut self, line: &str) -> Option<DecodedEvent> {
        if self.in_json_block {
            if line.starts_with(TAG_JSON_END) {
                self.in_json_block = false;
                return self.finish_json_block();
            }
            self.json_block.push_str(line);
            self.json_block.push('\n');
            return None;
        }

        if line.starts_with(TAG_JSON_START) {
            self.in_json_block = true;
            self.json_block.clear();
            return None;
        }

        match classify_line(line, self.provider) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(error = %e, "Skipping malformed protocol line");
                None
            }
        }
    }

    fn finish_json_block(&mut self) -> Option<DecodedEvent> {
        let block = std::mem::take(&mut self.json_block);
        match serde_json::from_str::<serde_json::Value>(&block) {
            Ok(value) if value.is_object() => Some(DecodedEvent::StructuredMessage(value)),
            Ok(_) => {
                tracing::debug!("Ignoring JSON block that is not an object");
                None
            }
            Err(e) => {
                tracing::debug!(error = %e, bytes = block.len(), "Skipping malformed JSON block");
                None
            }
        }
    }
}

/// Classify a single line outside JSON-block mode
///
/// `Ok(None)` means the line carries no protocol tag.
pub fn classify_line(line: &str, provider: Provider) -> Result<Option<DecodedEvent>> {
    if DIAGNOSTIC_TAGS.iter().any(|tag| line.starts_with(tag)) {
        return Ok(Some(DecodedEvent::DiagnosticLine(line.to_string())));
    }

    let event = if line.starts_with(TAG_MESSAGE_START) {
        DecodedEvent::MessageStart
    } else if line.starts_with(TAG_MESSAGE_END) {
        DecodedEvent::MessageEnd
    } else if let Some(payload) = payload(line, TAG_MESSAGE) {
        let value = serde_json::from_str(payload)
            .map_err(|e| BridgeError::protocol_parse(format!("{TAG_MESSAGE} payload: {e}")))?;
        DecodedEvent::StructuredMessage(value)
    } else if let Some(payload) = payload(line, TAG_SEND_ERROR) {
        DecodedEvent::SendError(error_message(payload))
    } else if let Some(payload) = payload(line, TAG_CONTENT_DELTA) {
        DecodedEvent::ContentDelta(payload.to_string())
    } else if let Some(payload) = payload(line, TAG_CONTENT) {
        DecodedEvent::ContentChunk(payload.to_string())
    } else if let Some(payload) = payload(line, TAG_THINKING) {
        DecodedEvent::Thinking(payload.to_string())
    } else if let Some(payload) = payload(line, provider.session_tag()) {
        if payload.is_empty() {
            return Err(BridgeError::protocol_parse("empty session id"));
        }
        DecodedEvent::SessionIdAnnounced(payload.to_string())
    } else if let Some(payload) = payload(line, TAG_SLASH_COMMANDS) {
        DecodedEvent::SlashCommandsAnnounced(slash_commands(payload)?)
    } else {
        return Ok(None);
    };

    Ok(Some(event))
}

/// Trimmed text after `tag`, if the line starts with it
fn payload<'a>(line: &'a str, tag: &str) -> Option<&'a str> {
    line.strip_prefix(tag).map(str::trim)
}

/// `error` field of a JSON payload, else the raw payload
fn error_message(payload: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(payload) {
        Ok(serde_json::Value::Object(map)) => match map.get("error") {
            Some(serde_json::Value::String(message)) => message.clone(),
            Some(other) if !other.is_null() => other.to_string(),
            _ => payload.to_string(),
        },
        _ => payload.to_string(),
    }
}

/// Command names from an array of strings or of `{ "name": ... }` objects
fn slash_commands(payload: &str) -> Result<Vec<String>> {
    let values: Vec<serde_json::Value> = serde_json::from_str(payload)
        .map_err(|e| BridgeError::protocol_parse(format!("{TAG_SLASH_COMMANDS} payload: {e}")))?;

    Ok(values
        .into_iter()
        .filter_map(|value| match value {
            serde_json::Value::String(name) => Some(name),
            serde_json::Value::Object(mut map) => match map.remove("name") {
                Some(serde_json::Value::String(name)) => Some(name),
                _ => None,
            },
            _ => None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tokio_util::codec::FramedRead;

    use crate::protocol::StdoutLineCodec;

    fn decode_all(provider: Provider, lines: &[&str]) -> Vec<DecodedEvent> {
        let mut decoder = ProtocolLineDecoder::new(provider);
        lines
            .iter()
            .filter_map(|line| decoder.decode_line(line))
            .collect()
    }

    #[test]
    fn test_classify_tags() {
        let events = decode_all(
            Provider::Claude,
            &[
                "[MESSAGE_START]",
                r#"[MESSAGE] {"type":"assistant","id":1}"#,
                "[CONTENT] Full answer ",
                "[CONTENT_DELTA] Hel",
                "[THINKING] pondering",
                "[SESSION_ID] sess-42",
                r#"[SLASH_COMMANDS] ["/help",{"name":"/review"},42]"#,
                "[MESSAGE_END]",
            ],
        );

        assert_eq!(
            events,
            vec![
                DecodedEvent::MessageStart,
                DecodedEvent::StructuredMessage(json!({"type": "assistant", "id": 1})),
                DecodedEvent::ContentChunk("Full answer".to_string()),
                DecodedEvent::ContentDelta("Hel".to_string()),
                DecodedEvent::Thinking("pondering".to_string()),
                DecodedEvent::SessionIdAnnounced("sess-42".to_string()),
                DecodedEvent::SlashCommandsAnnounced(vec![
                    "/help".to_string(),
                    "/review".to_string()
                ]),
                DecodedEvent::MessageEnd,
            ]
        );
        assert_eq!(events[1].message_type(), Some("assistant"));
    }

    #[test]
    fn test_untagged_and_malformed_lines_are_skipped() {
        let events = decode_all(
            Provider::Claude,
            &[
                "plain log output",
                "[MESSAGE] {not json",
                "  [CONTENT] indented tag is not a tag",
                "[SESSION_ID]   ",
                "[SLASH_COMMANDS] nope",
                "[CONTENT] after",
            ],
        );
        assert_eq!(events, vec![DecodedEvent::ContentChunk("after".to_string())]);
    }

    #[test]
    fn test_send_error_payloads() {
        let events = decode_all(
            Provider::Claude,
            &[
                r#"[SEND_ERROR] {"error":"quota exceeded"}"#,
                "[SEND_ERROR] raw failure text",
                r#"[SEND_ERROR] {"code":7}"#,
                r#"[SEND_ERROR] {"error":{"status":429}}"#,
            ],
        );
        assert_eq!(
            events,
            vec![
                DecodedEvent::SendError("quota exceeded".to_string()),
                DecodedEvent::SendError("raw failure text".to_string()),
                DecodedEvent::SendError(r#"{"code":7}"#.to_string()),
                DecodedEvent::SendError(r#"{"status":429}"#.to_string()),
            ]
        );
    }

    #[test]
    fn test_diagnostic_lines_keep_whole_line() {
        let events = decode_all(
            Provider::Claude,
            &["[UNCAUGHT_ERROR] TypeError: x is undefined", "[COMMAND_ERROR] bad"],
        );
        assert_eq!(
            events,
            vec![
                DecodedEvent::DiagnosticLine("[UNCAUGHT_ERROR] TypeError: x is undefined".to_string()),
                DecodedEvent::DiagnosticLine("[COMMAND_ERROR] bad".to_string()),
            ]
        );
    }

    #[test]
    fn test_provider_session_tags() {
        let claude = decode_all(Provider::Claude, &["[THREAD_ID] t-1", "[SESSION_ID] s-1"]);
        assert_eq!(claude, vec![DecodedEvent::SessionIdAnnounced("s-1".to_string())]);

        let codex = decode_all(Provider::Codex, &["[THREAD_ID] t-1", "[SESSION_ID] s-1"]);
        assert_eq!(codex, vec![DecodedEvent::SessionIdAnnounced("t-1".to_string())]);
    }

    #[test]
    fn test_json_block_buffers_tag_like_lines() {
        let mut decoder = ProtocolLineDecoder::new(Provider::Claude);
        assert_eq!(decoder.decode_line("[JSON_START]"), None);
        assert!(decoder.in_json_block());
        assert_eq!(decoder.decode_line("{"), None);
        assert_eq!(decoder.decode_line(r#"  "text": "[SEND_ERROR] not an error","#), None);
        assert_eq!(decoder.decode_line(r#"  "success": true"#), None);
        assert_eq!(decoder.decode_line("}"), None);

        let event = decoder.decode_line("[JSON_END]").unwrap();
        assert!(!decoder.in_json_block());
        assert_eq!(
            event,
            DecodedEvent::StructuredMessage(json!({
                "text": "[SEND_ERROR] not an error",
                "success": true
            }))
        );

        // Back to normal classification
        assert_eq!(decoder.decode_line("[MESSAGE_END]"), Some(DecodedEvent::MessageEnd));
    }

    #[test]
    fn test_malformed_json_block_is_dropped() {
        let events = decode_all(
            Provider::Claude,
            &["[JSON_START]", "{ broken", "[JSON_END]", "[JSON_START]", "[1, 2]", "[JSON_END]"],
        );
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_decoding_is_insensitive_to_chunking() {
        let line = br#"[MESSAGE] {"type":"result","text":"split me"}"#;
        let (head, tail) = line.split_at(17);

        let whole = tokio_test::io::Builder::new().read(line).read(b"\n").build();
        let split = tokio_test::io::Builder::new()
            .read(head)
            .read(tail)
            .read(b"\n")
            .build();

        let mut results = Vec::new();
        for reader in [whole, split] {
            let mut decoder = ProtocolLineDecoder::new(Provider::Claude);
            let events: Vec<DecodedEvent> = FramedRead::new(reader, StdoutLineCodec::new())
                .filter_map(|line| std::future::ready(line.ok()))
                .filter_map(|line| std::future::ready(decoder.decode_line(&line)))
                .collect()
                .await;
            results.push(events);
        }

        assert_eq!(results[0].len(), 1);
        assert_eq!(results[0], results[1]);
    }
}
