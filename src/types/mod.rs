//! Shared types for the bridge

mod config;
mod error;
mod request;
mod result;

pub use config::{
    BridgeConfig, DEFAULT_PERMISSION_TIMEOUT, PERMISSION_DIR_NAME, SCRATCH_DIR_NAME,
};
pub use error::{BridgeError, ErrorCode, Result};
pub use request::{Attachment, PermissionMode, Provider, SessionRequest};
pub use result::SessionResult;
