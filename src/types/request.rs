//! Session request types and their stdin encoding

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::BridgeError;

/// External agent provider driven by a bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Claude,
    Codex,
}

impl Provider {
    /// Name passed to the entry script as its first argument
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Claude => "claude",
            Provider::Codex => "codex",
        }
    }

    /// Tag the provider uses to announce its session or thread id
    pub fn session_tag(self) -> &'static str {
        match self {
            Provider::Claude => "[SESSION_ID]",
            Provider::Codex => "[THREAD_ID]",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "claude" => Ok(Provider::Claude),
            "codex" => Ok(Provider::Codex),
            other => Err(BridgeError::config_error(format!(
                "unknown provider: {other}"
            ))),
        }
    }
}

/// Permission mode forwarded to the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    /// Ask before side-effecting tools
    #[default]
    Default,
    /// Auto-approve file edits
    AcceptEdits,
    /// Plan only, no execution
    Plan,
    /// Skip all permission checks
    BypassPermissions,
}

impl PermissionMode {
    /// Wire value of this mode
    pub fn as_str(self) -> &'static str {
        match self {
            PermissionMode::Default => "default",
            PermissionMode::AcceptEdits => "acceptEdits",
            PermissionMode::Plan => "plan",
            PermissionMode::BypassPermissions => "bypassPermissions",
        }
    }
}

impl FromStr for PermissionMode {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(PermissionMode::Default),
            "acceptEdits" => Ok(PermissionMode::AcceptEdits),
            "plan" => Ok(PermissionMode::Plan),
            "bypassPermissions" => Ok(PermissionMode::BypassPermissions),
            other => Err(BridgeError::config_error(format!(
                "unknown permission mode: {other}"
            ))),
        }
    }
}

/// Inline attachment sent with a prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub file_name: String,
    pub media_type: String,
    /// Inline data, typically base64
    pub data: String,
}

impl Attachment {
    pub fn new(
        file_name: impl Into<String>,
        media_type: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            media_type: media_type.into(),
            data: data.into(),
        }
    }
}

/// A single prompt for the external agent
///
/// Immutable once built; serialized exactly once into the JSON object
/// written to the child's standard input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionRequest {
    pub message: String,
    pub attachments: Vec<Attachment>,
    /// Session or thread id to resume; `None` starts a new session
    pub session_id: Option<String>,
    pub cwd: Option<PathBuf>,
    pub permission_mode: Option<PermissionMode>,
    pub model: Option<String>,
    /// Editor context forwarded as-is
    pub opened_files: Option<serde_json::Value>,
}

/// Wire shape of the stdin payload
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StdinPayload<'a> {
    message: &'a str,
    session_id: &'a str,
    cwd: String,
    permission_mode: &'a str,
    model: &'a str,
    #[serde(skip_serializing_if = "<[Attachment]>::is_empty")]
    attachments: &'a [Attachment],
    #[serde(skip_serializing_if = "Option::is_none")]
    opened_files: Option<&'a serde_json::Value>,
}

impl SessionRequest {
    /// Create a request for a new session
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_permission_mode(mut self, mode: PermissionMode) -> Self {
        self.permission_mode = Some(mode);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn with_opened_files(mut self, opened_files: serde_json::Value) -> Self {
        self.opened_files = Some(opened_files);
        self
    }

    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }

    /// Entry-script command for this request
    pub fn command_name(&self) -> &'static str {
        if self.has_attachments() {
            "sendWithAttachments"
        } else {
            "send"
        }
    }

    /// Encode the request as the single-line JSON object written to stdin
    ///
    /// Absent string fields are sent as `""`; attachments and opened files
    /// are omitted when empty.
    pub fn to_stdin_json(&self) -> Result<String, BridgeError> {
        let payload = StdinPayload {
            message: &self.message,
            session_id: self.session_id.as_deref().unwrap_or(""),
            cwd: self
                .cwd
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
            permission_mode: self.permission_mode.map_or("", PermissionMode::as_str),
            model: self.model.as_deref().unwrap_or(""),
            attachments: &self.attachments,
            opened_files: self.opened_files.as_ref().filter(|v| !v.is_null()),
        };
        Ok(serde_json::to_string(&payload)?)
    }
}
