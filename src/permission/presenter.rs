//! Collaborator seams for showing permission requests and observing decisions

use std::fmt::Debug;

use serde::Serialize;
use tokio::sync::mpsc;

use super::decision::PermissionOutcome;

/// A permission request as shown to the user
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionPrompt {
    pub request_id: String,
    pub channel_id: String,
    pub tool_name: String,
    pub inputs: serde_json::Value,
}

impl PermissionPrompt {
    /// One-line title for a dialog or terminal prompt
    pub fn title(&self) -> String {
        let path = || {
            ["file_path", "path", "notebook_path"]
                .iter()
                .find_map(|key| self.inputs.get(*key).and_then(|v| v.as_str()))
                .unwrap_or("file")
        };

        match self.tool_name.as_str() {
            "Read" => format!("Read {}", path()),
            "Write" => format!("Write to {}", path()),
            "Edit" | "MultiEdit" | "NotebookEdit" => format!("Edit {}", path()),
            "Bash" => {
                let desc = self.inputs.get("description").and_then(|v| v.as_str());
                let cmd = self.inputs.get("command").and_then(|v| v.as_str()).unwrap_or("");
                desc.map(String::from)
                    .unwrap_or_else(|| format!("Run: {}", truncate(cmd, 50)))
            }
            other => other.to_string(),
        }
    }
}

/// Truncate to at most `max_chars` characters, adding "..." if truncated
fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

/// Shows a permission request to a human or policy
///
/// Called once per request. Must not block; the decision comes back later
/// through `PermissionRendezvous::resolve`.
pub trait PermissionPresenter: Send + Sync + Debug {
    fn present(&self, prompt: PermissionPrompt);
}

/// Observes every terminal permission outcome
///
/// `AllowRemember` outcomes are the signal to persist a standing policy.
pub trait DecisionListener: Send + Sync + Debug {
    fn on_decision(&self, outcome: &PermissionOutcome);
}

/// Presenter that forwards prompts over an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelPresenter {
    tx: mpsc::UnboundedSender<PermissionPrompt>,
}

impl ChannelPresenter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PermissionPrompt>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl PermissionPresenter for ChannelPresenter {
    fn present(&self, prompt: PermissionPrompt) {
        if self.tx.send(prompt).is_err() {
            // Nobody is listening; the deadline will deny the request
            tracing::warn!("Permission prompt dropped, presenter receiver closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn prompt(tool_name: &str, inputs: serde_json::Value) -> PermissionPrompt {
        PermissionPrompt {
            request_id: "req-1".to_string(),
            channel_id: "tab-1".to_string(),
            tool_name: tool_name.to_string(),
            inputs,
        }
    }

    #[test]
    fn test_title_for_file_tools() {
        assert_eq!(prompt("Read", json!({"file_path": "/tmp/a.txt"})).title(), "Read /tmp/a.txt");
        assert_eq!(prompt("Write", json!({"path": "/tmp/b.txt"})).title(), "Write to /tmp/b.txt");
        assert_eq!(prompt("Edit", json!({})).title(), "Edit file");
    }

    #[test]
    fn test_title_for_bash() {
        assert_eq!(
            prompt("Bash", json!({"command": "ls", "description": "List files"})).title(),
            "List files"
        );
        let long = "x".repeat(80);
        let title = prompt("Bash", json!({"command": long})).title();
        assert!(title.starts_with("Run: xxx"));
        assert!(title.ends_with("..."));
        assert_eq!(title.chars().count(), "Run: ".len() + 50);
    }

    #[test]
    fn test_truncate_multibyte() {
        assert_eq!(truncate("héllo wörld", 8), "héllo...");
        assert_eq!(truncate("hi", 2), "hi");
    }

    #[tokio::test]
    async fn test_channel_presenter_forwards() {
        let (presenter, mut rx) = ChannelPresenter::new();
        presenter.present(prompt("Read", json!({})));
        assert_eq!(rx.recv().await.unwrap().tool_name, "Read");

        drop(rx);
        // Closed receiver only logs
        presenter.present(prompt("Read", json!({})));
    }
}
