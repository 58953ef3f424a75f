//! Line-oriented agent output protocol
//!
//! Agents write newline-delimited, tag-prefixed lines. [`StdoutLineCodec`]
//! frames bytes into lines and [`ProtocolLineDecoder`] turns lines into
//! [`DecodedEvent`]s.

mod codec;
mod decoder;
mod event;

pub use codec::{MAX_LINE_BYTES, StdoutLineCodec};
pub use decoder::{DIAGNOSTIC_TAGS, ProtocolLineDecoder, classify_line};
pub use event::DecodedEvent;
