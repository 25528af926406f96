/// Longest line accepted before the framer gives up on the pending bytes.
pub const MAX_LINE_BYTES: usize = 256;

/// Reassembles newline-terminated text lines from arbitrary serial chunks.
///
/// Carriage returns are stripped; invalid UTF-8 is replaced rather than
/// rejected so that the record validator can decide what to keep.
#[derive(Debug, Default)]
pub struct LineFramer {
    pending: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        if self.pending.len() > MAX_LINE_BYTES && !self.pending.contains(&b'\n') {
            tracing::debug!(len = self.pending.len(), "dropping unterminated serial data");
            self.pending.clear();
        }
    }

    /// Pop the oldest complete line, if any.
    pub fn next_line(&mut self) -> Option<String> {
        let pos = self.pending.iter().position(|b| *b == b'\n')?;
        let line: Vec<u8> = self.pending.drain(..=pos).collect();
        let text = String::from_utf8_lossy(&line[..line.len() - 1]);
        Some(text.trim_end_matches('\r').to_string())
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
