//! Append-only capture of everything a session has written.

use crate::error::{HarnessError, HarnessResult};

/// Default retention ceiling, in characters.
pub const DEFAULT_RETENTION_CHARS: usize = 1_000_000;

/// Size-capped append log of decoded terminal output.
///
/// Bytes are decoded leniently: invalid sequences become U+FFFD, and a multi-byte
/// character split across two reads is reassembled rather than replaced. Once
/// the retained text exceeds the retention ceiling the oldest characters are
/// dropped. Positions handed out by [`OutputBuffer::mark`] are absolute, so they
/// stay meaningful across truncation.
#[derive(Debug)]
pub struct OutputBuffer {
    text: String,
    char_len: usize,
    dropped_chars: usize,
    retention_chars: usize,
    pending: Vec<u8>,
    total_bytes: u64,
    sealed: bool,
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION_CHARS)
    }
}

impl OutputBuffer {
    /// Create an empty buffer retaining at most `retention_chars` characters.
    #[must_use]
    pub fn new(retention_chars: usize) -> Self {
        Self {
            text: String::new(),
            char_len: 0,
            dropped_chars: 0,
            retention_chars: retention_chars.max(1),
            pending: Vec::new(),
            total_bytes: 0,
            sealed: false,
        }
    }

    /// Decode and append a chunk. Returns the number of characters added.
    ///
    /// # Errors
    /// `E_INTERNAL` if the buffer was sealed.
    pub fn append(&mut self, bytes: &[u8]) -> HarnessResult<usize> {
        if self.sealed {
            return Err(HarnessError::internal("append to sealed output buffer"));
        }
        self.total_bytes = self.total_bytes.saturating_add(bytes.len() as u64);

        let mut data = std::mem::take(&mut self.pending);
        data.extend_from_slice(bytes);
        let decoded = decode_lossy(&data, &mut self.pending);
        Ok(self.push_text(&decoded))
    }

    /// Flush any incomplete trailing sequence and refuse further appends.
    pub fn seal(&mut self) {
        if self.sealed {
            return;
        }
        if !self.pending.is_empty() {
            self.pending.clear();
            self.push_text("\u{FFFD}");
        }
        self.sealed = true;
    }

    /// Whether [`OutputBuffer::seal`] has been called.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// The last `n` characters (fewer if the buffer is shorter).
    #[must_use]
    pub fn tail(&self, n: usize) -> &str {
        if n == 0 {
            return "";
        }
        if n >= self.char_len {
            return &self.text;
        }
        self.text
            .char_indices()
            .rev()
            .nth(n - 1)
            .and_then(|(idx, _)| self.text.get(idx..))
            .unwrap_or(&self.text)
    }

    /// Absolute position of the end of the buffer, for use with [`OutputBuffer::since`].
    #[must_use]
    pub fn mark(&self) -> usize {
        self.dropped_chars + self.char_len
    }

    /// Text appended after `mark`, clamped to what is still retained.
    #[must_use]
    pub fn since(&self, mark: usize) -> &str {
        let relative = mark.saturating_sub(self.dropped_chars);
        self.tail(self.char_len.saturating_sub(relative))
    }

    /// Retained text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Number of retained characters.
    #[must_use]
    pub fn len_chars(&self) -> usize {
        self.char_len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.char_len == 0
    }

    /// Characters discarded from the front so far.
    #[must_use]
    pub fn dropped_chars(&self) -> usize {
        self.dropped_chars
    }

    /// Raw bytes received over the buffer's lifetime.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    fn push_text(&mut self, decoded: &str) -> usize {
        let added = decoded.chars().count();
        self.text.push_str(decoded);
        self.char_len += added;

        if self.char_len > self.retention_chars {
            let excess = self.char_len - self.retention_chars;
            let cut = self
                .text
                .char_indices()
                .nth(excess)
                .map_or(self.text.len(), |(idx, _)| idx);
            self.text.drain(..cut);
            self.char_len -= excess;
            self.dropped_chars += excess;
        }
        added
    }
}

/// Decode `data`, replacing invalid sequences and parking an incomplete trailing
/// sequence in `pending`.
fn decode_lossy(data: &[u8], pending: &mut Vec<u8>) -> String {
    let mut decoded = String::with_capacity(data.len());
    let mut rest = data;
    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                decoded.push_str(valid);
                break;
            }
            Err(err) => {
                let (valid, after) = rest.split_at(err.valid_up_to());
                decoded.push_str(&String::from_utf8_lossy(valid));
                match err.error_len() {
                    Some(len) => {
                        decoded.push('\u{FFFD}');
                        rest = after.get(len..).unwrap_or_default();
                    }
                    None => {
                        pending.extend_from_slice(after);
                        break;
                    }
                }
            }
        }
    }
    decoded
}
