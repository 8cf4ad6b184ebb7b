//! Wire format for peer reports
//!
//! Reports travel as standalone datagrams, each self-describing:
//!
//! ```text
//! ┌────────┬──────────────────────┬───────────┬─────────┬─────────────┐
//! │ 1 byte │ 4 bytes + N bytes    │ 8 bytes   │ 4 bytes │ entries...  │
//! │ type   │ subject (len, utf-8) │ origin id │ count   │             │
//! └────────┴──────────────────────┴───────────┴─────────┴─────────────┘
//! ```
//!
//! Each entry is a length-prefixed tag followed by a 64-bit hit count. All
//! integers are big-endian. A report larger than one datagram budget is
//! split across several datagrams; entries never straddle a boundary.
//!
//! Decoding is lenient at the entry level: an entry that cannot be parsed
//! (truncated, non-UTF-8 tag, zero count) is skipped and the rest of the
//! datagram is processed. A datagram whose header cannot be parsed is
//! rejected whole.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use dthrottle_engine::Report;

use crate::error::{GossipError, Result};

/// The subject throttle reports are published under.
pub const HEARTBEAT_SUBJECT: &str = "DThrottle.Heartbeat";

/// Payload budget per datagram, comfortably under common UDP MTU limits
/// for loopback and LAN paths.
pub const MAX_DATAGRAM: usize = 60 * 1024;

/// Message type discriminant for a hit report.
const MSG_REPORT: u8 = 0x01;

/// A report received from the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Subject the report was published under.
    pub subject: String,
    /// Instance id of the publisher.
    pub origin: u64,
    /// True when the publisher is this very instance (peer list loopback).
    pub local: bool,
    /// The tag → hit count map.
    pub report: Report,
}

/// Encode a report into one or more datagrams.
///
/// An empty report still produces one (empty) datagram: instances publish on
/// every heartbeat so peers can tell silence from death.
pub fn encode_report(subject: &str, origin: u64, report: &Report) -> Vec<Bytes> {
    let mut datagrams = Vec::new();
    let mut current = DatagramBuilder::new(subject, origin);

    for (tag, &count) in report {
        let entry_len = 4 + tag.len() + 8;
        if current.len() + entry_len > MAX_DATAGRAM && current.count > 0 {
            datagrams.push(current.finish());
            current = DatagramBuilder::new(subject, origin);
        }
        current.push(tag, count);
    }
    datagrams.push(current.finish());

    datagrams
}

struct DatagramBuilder {
    buf: BytesMut,
    count_at: usize,
    count: u32,
}

impl DatagramBuilder {
    fn new(subject: &str, origin: u64) -> Self {
        let mut buf = BytesMut::with_capacity(1024);
        buf.put_u8(MSG_REPORT);
        buf.put_u32(subject.len() as u32);
        buf.put_slice(subject.as_bytes());
        buf.put_u64(origin);

        let count_at = buf.len();
        buf.put_u32(0);

        Self {
            buf,
            count_at,
            count: 0,
        }
    }

    fn len(&self) -> usize {
        self.buf.len()
    }

    fn push(&mut self, tag: &str, count: u64) {
        self.buf.put_u32(tag.len() as u32);
        self.buf.put_slice(tag.as_bytes());
        self.buf.put_u64(count);
        self.count += 1;
    }

    fn finish(mut self) -> Bytes {
        let range = self.count_at..self.count_at + 4;
        self.buf[range].copy_from_slice(&self.count.to_be_bytes());
        self.buf.freeze()
    }
}

/// Decode one datagram into a [`Delivery`].
///
/// `local_instance` is the receiving process's own id, used to flag
/// deliveries that originated here.
pub fn decode_datagram(mut buf: Bytes, local_instance: u64) -> Result<Delivery> {
    if buf.remaining() < 1 {
        return Err(GossipError::Protocol("empty datagram".into()));
    }
    let msg_type = buf.get_u8();
    if msg_type != MSG_REPORT {
        return Err(GossipError::Protocol(format!(
            "unknown message type: {msg_type}"
        )));
    }

    let subject = decode_string(&mut buf)?;

    if buf.remaining() < 8 + 4 {
        return Err(GossipError::Protocol("truncated header".into()));
    }
    let origin = buf.get_u64();
    let declared = buf.get_u32();

    let mut report = Report::new();
    for _ in 0..declared {
        match decode_entry(&mut buf) {
            Ok(Some((tag, count))) => {
                report.insert(tag, count);
            }
            // unparseable tag bytes: skip the entry, keep going
            Ok(None) => continue,
            // truncated: keep what we have, the rest is gone
            Err(_) => break,
        }
    }

    Ok(Delivery {
        subject,
        origin,
        local: origin == local_instance,
        report,
    })
}

/// Decode one `(tag, count)` entry.
///
/// `Ok(None)` means the entry was well-framed but unusable (skip it);
/// `Err` means the buffer is truncated and nothing further can be read.
fn decode_entry(buf: &mut Bytes) -> Result<Option<(String, u64)>> {
    if buf.remaining() < 4 {
        return Err(GossipError::Protocol("truncated entry length".into()));
    }
    let len = buf.get_u32() as usize;
    if buf.remaining() < len + 8 {
        return Err(GossipError::Protocol("truncated entry".into()));
    }

    let tag_bytes = buf.split_to(len);
    let count = buf.get_u64();

    let Ok(tag) = String::from_utf8(tag_bytes.to_vec()) else {
        return Ok(None);
    };
    // hit counts are positive by construction; zero marks a mangled entry
    if count == 0 {
        return Ok(None);
    }

    Ok(Some((tag, count)))
}

fn decode_string(buf: &mut Bytes) -> Result<String> {
    if buf.remaining() < 4 {
        return Err(GossipError::Protocol("truncated string length".into()));
    }
    let len = buf.get_u32() as usize;
    if buf.remaining() < len {
        return Err(GossipError::Protocol("truncated string".into()));
    }
    let bytes = buf.split_to(len);
    String::from_utf8(bytes.to_vec())
        .map_err(|e| GossipError::Protocol(format!("invalid UTF-8: {e}")))
}

#[cfg(test)]
#[path = "codec_test.rs"]
mod tests;
