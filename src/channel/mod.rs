//! Channel-scoped process ownership and cancellation

mod registry;

pub use registry::ChannelRegistry;
