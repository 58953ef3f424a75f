//! Permission rendezvous between agent processes and a human or policy
//!
//! A request stays pending until it is resolved or its deadline denies it.
//! Denial interrupts the owning channel.

mod decision;
mod file_channel;
mod presenter;
mod rendezvous;

pub use decision::{DecisionSource, PermissionDecision, PermissionOutcome};
pub use file_channel::{DEFAULT_POLL_INTERVAL, PermissionFileChannel};
pub use presenter::{ChannelPresenter, DecisionListener, PermissionPresenter, PermissionPrompt};
pub use rendezvous::{PermissionFuture, PermissionRendezvous};
