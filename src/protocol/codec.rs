//! Line framing for agent stdout/stderr
//!
//! Reassembles complete `\n`-terminated lines regardless of how the pipe
//! delivers bytes. Invalid UTF-8 is replaced rather than rejected, `\r\n` is
//! accepted, and a final unterminated line is still yielded at EOF. Lines
//! longer than the limit are dropped whole and decoding resumes at the next
//! newline.

use std::io;

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

/// Longest line kept: 16 MiB
pub const MAX_LINE_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug)]
pub struct StdoutLineCodec {
    max_length: usize,
    /// Bytes already scanned for a newline
    next_index: usize,
    /// Skipping the remainder of an over-long line
    discarding: bool,
}

impl StdoutLineCodec {
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_BYTES)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
            discarding: false,
        }
    }
}

impl Default for StdoutLineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for StdoutLineCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, io::Error> {
        loop {
            let read_to = src.len().min(self.max_length.saturating_add(1));
            let newline = src[self.next_index..read_to]
                .iter()
                .position(|b| *b == b'\n');

            match (self.discarding, newline) {
                (true, Some(offset)) => {
                    src.advance(self.next_index + offset + 1);
                    self.discarding = false;
                    self.next_index = 0;
                }
                (true, None) => {
                    src.advance(read_to);
                    self.next_index = 0;
                    if src.is_empty() {
                        return Ok(None);
                    }
                }
                (false, Some(offset)) => {
                    let end = self.next_index + offset;
                    self.next_index = 0;
                    let line = src.split_to(end + 1);
                    return Ok(Some(to_line(&line[..end])));
                }
                (false, None) if src.len() > self.max_length => {
                    tracing::warn!(
                        max_bytes = self.max_length,
                        "Dropping over-long line from agent output"
                    );
                    self.discarding = true;
                }
                (false, None) => {
                    self.next_index = read_to;
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>, io::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        self.next_index = 0;
        if src.is_empty() || self.discarding {
            src.clear();
            self.discarding = false;
            return Ok(None);
        }
        let rest = src.split_to(src.len());
        Ok(Some(to_line(&rest)))
    }
}

fn to_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
