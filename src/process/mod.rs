//! Agent process lifecycle
//!
//! Spawning, ownership tracking, platform-aware termination, and the shared
//! scratch directory used by concurrently running agents.

mod env;
mod manager;
mod record;
pub mod scratch;
mod terminate;

pub use env::EnvironmentBuilder;
pub use manager::{CommandSpec, ProcessLifecycleManager, REAP_WINDOW};
pub use record::{ProcessIo, ProcessRecord};
pub use terminate::{FORCED_KILL_WINDOW, GRACEFUL_WINDOW, TerminationOutcome, terminate_process};
