//! Tracing helpers shared by the bridge and the binary

mod error_ext;

pub use error_ext::{ErrorTraceExt, ResultTraceExt};
