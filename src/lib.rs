//! Agent Stream Bridge
//!
//! Drives external AI agent processes over a line-oriented stdio protocol,
//! one process per send, and streams their replies back as typed events.
//!
//! ## Features
//!
//! - One agent process per send, bound to a logical channel
//! - Line protocol decoding (`[CONTENT_DELTA]`, `[MESSAGE]`, `[SEND_ERROR]`, ...)
//! - Targeted interrupt and global cleanup of process groups
//! - Permission rendezvous with deadlines, fed by file-based IPC
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use agent_bridge::{BridgeConfig, ChannelCallback, ChannelPresenter, Provider, SessionBridge, SessionRequest};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let (presenter, _prompts) = ChannelPresenter::new();
//!     let bridge = SessionBridge::new(Provider::Claude, BridgeConfig::from_env(), Arc::new(presenter));
//!
//!     let (callback, _updates) = ChannelCallback::new();
//!     let result = bridge
//!         .send("tab-1", SessionRequest::new("Hello"), Arc::new(callback))
//!         .await?;
//!     println!("{}", result.final_content);
//!
//!     bridge.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! - `AGENT_BRIDGE_RUNTIME`: Runtime executable (default: `node`)
//! - `AGENT_BRIDGE_DIR`: Directory holding the entry script
//! - `AGENT_BRIDGE_SCRIPT`: Entry script name (default: `channel-manager.js`)
//! - `CLAUDE_PERMISSION_DIR`: Permission IPC directory
//! - `AGENT_BRIDGE_PERMISSION_TIMEOUT_SECS`: Permission deadline (default: 35)
//! - `AGENT_BRIDGE_SCRATCH_DIR`: Shared scratch directory
//! - `ANTHROPIC_BASE_URL`: Custom API base URL
//! - `ANTHROPIC_API_KEY`: API key (preferred)
//! - `ANTHROPIC_AUTH_TOKEN`: Auth token (legacy, fallback)

pub mod bridge;
pub mod channel;
pub mod cli;
pub mod permission;
pub mod process;
pub mod protocol;
pub mod runner;
pub mod tracing;
pub mod types;

pub use bridge::{BridgeUpdate, ChannelCallback, SessionBridge, SessionCallback};
pub use channel::ChannelRegistry;
pub use cli::Cli;
pub use permission::{
    ChannelPresenter, DecisionListener, PermissionDecision, PermissionFileChannel,
    PermissionPresenter, PermissionPrompt, PermissionRendezvous,
};
pub use process::ProcessLifecycleManager;
pub use protocol::{DecodedEvent, ProtocolLineDecoder};
pub use runner::run_with_cli;
pub use types::{
    BridgeConfig, BridgeError, PermissionMode, Provider, Result, SessionRequest, SessionResult,
};
