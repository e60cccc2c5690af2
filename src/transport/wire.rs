//! Line-delimited wire format shared with the actuator server.
//!
//! One message per line, `\n` terminated, ASCII. There is no length prefix
//! or checksum, so heartbeat tokens and commands may interleave freely on
//! the wire. Receivers must reassemble lines across partial reads.

use anyhow::{anyhow, Result};

use crate::detect::TrackedTarget;
use crate::policy::Offsets;

/// Liveness token sent by the heartbeat; the server echoes it back.
pub const HEARTBEAT_TOKEN: &str = "echoback";
/// Upper bound of the synchronous echo read after an `echoback` send.
pub const ECHO_READ_LIMIT: usize = 128;
/// Longest pending (unterminated) line the receiver will buffer.
pub const MAX_PENDING_LINE: usize = 64 * 1024;

pub fn encode_line(message: &str) -> Result<Vec<u8>> {
    if message.contains('\n') || message.contains('\r') {
        return Err(anyhow!("message must not contain line breaks"));
    }
    let mut buf = Vec::with_capacity(message.len() + 1);
    buf.extend_from_slice(message.as_bytes());
    buf.push(b'\n');
    Ok(buf)
}

/// `detected,<area>,<panOffset>,<tiltOffset>,<confidence>`
pub fn detected_line(target: &TrackedTarget, offsets: Offsets) -> String {
    format!(
        "detected,{},{:.1},{:.1},{:.3}",
        target.area.round() as i64,
        offsets.pan,
        offsets.tilt,
        target.confidence
    )
}

/// Reassembles newline-delimited messages from arbitrary read chunks.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; returns every line completed by this chunk.
    ///
    /// Trailing `\r` is stripped and empty lines are dropped. Invalid UTF-8
    /// is replaced rather than rejected.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in chunk {
            if byte == b'\n' {
                let raw = std::mem::take(&mut self.pending);
                let text = String::from_utf8_lossy(&raw);
                let text = text.trim_end_matches('\r');
                if !text.is_empty() {
                    lines.push(text.to_string());
                }
            } else {
                if self.pending.len() >= MAX_PENDING_LINE {
                    log::warn!(
                        "dropping {} byte unterminated message from server",
                        self.pending.len()
                    );
                    self.pending.clear();
                }
                self.pending.push(byte);
            }
        }
        lines
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Discard a partial line, e.g. after the connection was replaced.
    pub fn reset(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_appends_newline() {
        assert_eq!(encode_line("heading").unwrap(), b"heading\n".to_vec());
        assert!(encode_line("r_cw\nr_ccw").is_err());
    }

    #[test]
    fn lines_split_across_reads_are_reassembled() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(b"echo").is_empty());
        assert_eq!(buf.pending_len(), 4);
        assert_eq!(buf.push(b"back\nstat"), vec!["echoback".to_string()]);
        assert_eq!(
            buf.push(b"us,ok\r\n\nheading\n"),
            vec!["status,ok".to_string(), "heading".to_string()]
        );
        assert_eq!(buf.pending_len(), 0);
    }

    #[test]
    fn reset_discards_partial_line() {
        let mut buf = LineBuffer::new();
        buf.push(b"half a mess");
        buf.reset();
        assert_eq!(buf.push(b"age\n"), vec!["age".to_string()]);
    }

    #[test]
    fn detected_line_format() {
        let target = TrackedTarget {
            x: 500.0,
            y: 400.0,
            area: 12_345.4,
            confidence: 0.97306,
        };
        let offsets = Offsets {
            pan: -140.0,
            tilt: 40.0,
        };
        assert_eq!(
            detected_line(&target, offsets),
            "detected,12345,-140.0,40.0,0.973"
        );
    }
}
