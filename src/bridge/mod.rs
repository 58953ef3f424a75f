//! Streaming session bridge
//!
//! One send spawns one agent process; decoded events flow to a
//! [`SessionCallback`] and the send resolves to a [`SessionResult`](crate::types::SessionResult).

mod callback;
mod outcome;
mod session_bridge;

pub use callback::{BridgeUpdate, ChannelCallback, SessionCallback};
pub use outcome::{ENVIRONMENT_HINT, SendOutcome, SessionAccumulator, resolve_outcome};
pub use session_bridge::SessionBridge;
