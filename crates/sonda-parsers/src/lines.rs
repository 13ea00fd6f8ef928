//! Chunk-boundary tolerant line splitting.

/// Accumulates raw chunks and yields only complete lines; the trailing
/// partial line is buffered until its newline arrives or the stream ends.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every line completed by it (without the
    /// newline; a trailing `\r` is stripped).
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.pending.push_str(chunk);

        let mut out = Vec::new();
        while let Some(pos) = self.pending.find('\n') {
            let mut line: String = self.pending.drain(..=pos).collect();
            line.pop(); // the '\n'
            if line.ends_with('\r') {
                line.pop();
            }
            out.push(line);
        }
        out
    }

    /// Take the buffered partial line, if any. Draining makes a second
    /// flush a no-op.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }
}
