//! Newline framing over partial reads
//!
//! Sockets deliver bytes in arbitrary chunks: half a line, three lines and a
//! fragment, a lone `\n`. [`LineFramer`] turns that stream back into whole
//! lines so the dispatcher never sees a partial tag.
//!
//! If the peer hangs up without terminating its last line, the leftover
//! partial is dropped with the framer. Callers that care must terminate
//! their final line.

use std::collections::VecDeque;

use bytes::{BufMut, BytesMut};

/// Bytes requested from the socket per readiness notification.
pub const READ_CHUNK: usize = 4096;

/// Splits a byte stream into newline-terminated lines.
///
/// Completed lines queue in arrival order with the trailing newline
/// stripped; empty lines are preserved. Bytes after the last newline wait in
/// the partial buffer for the next [`feed`](LineFramer::feed).
#[derive(Debug, Default)]
pub struct LineFramer {
    partial: BytesMut,
    lines: VecDeque<String>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb one chunk from the stream.
    pub fn feed(&mut self, mut chunk: &[u8]) {
        while let Some(pos) = chunk.iter().position(|&b| b == b'\n') {
            self.partial.extend_from_slice(&chunk[..pos]);
            let line = String::from_utf8_lossy(&self.partial).into_owned();
            self.partial.clear();
            self.lines.push_back(line);
            chunk = &chunk[pos + 1..];
        }
        self.partial.put_slice(chunk);
    }

    /// Pop the oldest completed line.
    pub fn next_line(&mut self) -> Option<String> {
        self.lines.pop_front()
    }

    /// True when no completed lines are queued.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Bytes buffered past the last newline.
    pub fn partial_len(&self) -> usize {
        self.partial.len()
    }
}

#[cfg(test)]
#[path = "framing_test.rs"]
mod tests;
