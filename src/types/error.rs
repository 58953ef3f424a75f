//! Error types for the agent stream bridge

use thiserror::Error;

/// Bridge error codes
///
/// Stable numeric codes attached to structured log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Parse error: a protocol line or JSON payload was malformed
    ParseError = -32700,
    /// Invalid params
    InvalidParams = -32602,
    /// Internal error
    InternalError = -32603,

    // Bridge-specific errors (-32100 to -32199)
    /// The agent process could not be started
    SpawnFailed = -32101,
    /// The agent reported an explicit send failure
    SendFailed = -32102,
    /// The agent exited with a non-zero code
    ExitFailed = -32103,
    /// No permission decision arrived before the deadline
    PermissionTimeout = -32104,
    /// The channel was interrupted by the user
    Interrupted = -32105,
    /// No process is registered for the channel
    ChannelNotFound = -32106,
    /// Configuration error
    ConfigError = -32110,
}

impl ErrorCode {
    /// Get the error code value
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Main error type for the bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    // === Process errors ===
    /// The executable could not be started
    #[error("Failed to start agent process `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Non-zero exit without an explicit send error
    #[error("Process exited with code: {0}")]
    ExitCode(i32),

    // === Protocol errors ===
    /// A single line failed to parse
    #[error("Protocol parse error: {0}")]
    ProtocolParse(String),

    /// Explicit failure signaled by the agent
    #[error("{0}")]
    Send(String),

    // === Permission / cancellation ===
    /// No decision within the deadline
    #[error("Permission request {0} timed out")]
    PermissionTimeout(String),

    /// Cancellation requested by the user
    #[error("Channel {0} was interrupted")]
    Interrupted(String),

    /// No process registered for the channel
    #[error("No active process for channel: {0}")]
    ChannelNotFound(String),

    // === Configuration errors ===
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    // === External errors ===
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic errors ===
    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for the bridge
pub type Result<T> = std::result::Result<T, BridgeError>;

impl BridgeError {
    /// Get the error code for this error
    pub fn error_code(&self) -> ErrorCode {
        match self {
            BridgeError::Spawn { .. } => ErrorCode::SpawnFailed,
            BridgeError::ExitCode(_) => ErrorCode::ExitFailed,
            BridgeError::ProtocolParse(_) => ErrorCode::ParseError,
            BridgeError::Send(_) => ErrorCode::SendFailed,
            BridgeError::PermissionTimeout(_) => ErrorCode::PermissionTimeout,
            BridgeError::Interrupted(_) => ErrorCode::Interrupted,
            BridgeError::ChannelNotFound(_) => ErrorCode::ChannelNotFound,
            BridgeError::Config(_) => ErrorCode::ConfigError,
            BridgeError::Io(_) => ErrorCode::InternalError,
            BridgeError::Json(_) => ErrorCode::ParseError,
            BridgeError::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Check if this error is retryable
    ///
    /// The bridge never retries on its own; this only tells callers whether a
    /// fresh send could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BridgeError::Io(_) | BridgeError::PermissionTimeout(_))
    }

    /// Check if this error is a client error (caused by invalid input)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            BridgeError::ChannelNotFound(_) | BridgeError::Config(_)
        )
    }

    /// Whether this error must never be surfaced to the user as a failure
    pub fn is_cancellation(&self) -> bool {
        matches!(self, BridgeError::Interrupted(_))
    }

    // === Constructor helpers ===

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        BridgeError::Internal(msg.into())
    }

    /// Create a spawn error
    pub fn spawn(program: impl Into<String>, source: std::io::Error) -> Self {
        BridgeError::Spawn {
            program: program.into(),
            source,
        }
    }

    /// Create a protocol parse error
    pub fn protocol_parse(msg: impl Into<String>) -> Self {
        BridgeError::ProtocolParse(msg.into())
    }

    /// Create a send error
    pub fn send_failed(msg: impl Into<String>) -> Self {
        BridgeError::Send(msg.into())
    }

    /// Create a channel not found error
    pub fn channel_not_found(channel_id: impl Into<String>) -> Self {
        BridgeError::ChannelNotFound(channel_id.into())
    }

    /// Create a configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        BridgeError::Config(msg.into())
    }
}
