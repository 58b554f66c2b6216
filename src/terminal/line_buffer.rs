//! Line reassembly for raw PTY output.
//!
//! PTY reads return arbitrary byte chunks: a line terminator, or even a
//! single multi-byte character, can be split across two reads. The
//! [`LineBuffer`] accumulates chunks and yields only complete lines, keeping
//! any trailing partial line (including incomplete UTF-8 sequences) buffered
//! until the rest arrives.

/// A line longer than this is flushed as-is so a misbehaving child cannot
/// grow the pending buffer without bound.
const MAX_PENDING_BYTES: usize = 64 * 1024;

/// Stateful per-session chunk-to-lines reassembler.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return all lines completed by it.
    ///
    /// Lines are split on LF; a trailing CR on each line is dropped, so CRLF
    /// terminators work even when the CR and LF arrive in different chunks.
    /// Bytes after the last LF stay pending - because LF cannot occur inside
    /// a multi-byte UTF-8 sequence, a character split across chunks is never
    /// decoded until its line completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        for i in 0..self.pending.len() {
            if self.pending[i] == b'\n' {
                lines.push(decode_line(&self.pending[start..i]));
                start = i + 1;
            }
        }
        if start > 0 {
            self.pending.drain(..start);
        }

        if self.pending.len() > MAX_PENDING_BYTES {
            lines.push(decode_line(&self.pending));
            self.pending.clear();
        }

        lines
    }

    /// Flush the trailing partial line, if any. Called on EOF so the last
    /// unterminated line still reaches the parser.
    pub fn flush(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = decode_line(&self.pending);
        self.pending.clear();
        Some(line)
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = match bytes.last() {
        Some(b'\r') => &bytes[..bytes.len() - 1],
        _ => bytes,
    };
    String::from_utf8_lossy(bytes).into_owned()
}
