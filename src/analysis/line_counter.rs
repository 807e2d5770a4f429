//! Incremental line statistics
//!
//! Counts lines across arbitrarily split input. A line ends at `\n`, `\r\n`
//! or a lone `\r`; a `\r\n` pair split across two updates counts once.
//! Terminated empty lines count, a trailing unterminated segment counts only
//! when non-empty.
//!
//! Marker detection keeps only the last `longest_marker - 1` bytes of the
//! current line, so memory does not grow with line length.

/// Final line statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LineStats {
    pub lines: u64,
    pub error_lines: u64,
}

/// Streaming line counter with marker detection
#[derive(Debug, Clone)]
pub struct LineCounter {
    /// Non-empty marker byte strings
    markers: Vec<Vec<u8>>,

    /// Bytes of the current line to carry over between segments
    tail_len: usize,

    /// Last `tail_len` bytes of the current line
    tail: Vec<u8>,

    /// Current line has at least one byte
    line_has_content: bool,

    /// Current line already contains a marker
    line_flagged: bool,

    /// Previous byte was `\r` (a following `\n` belongs to it)
    pending_cr: bool,

    stats: LineStats,
}

impl LineCounter {
    /// Create a counter flagging lines that contain any of `markers`
    ///
    /// Empty markers are ignored.
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        let markers: Vec<Vec<u8>> = markers
            .into_iter()
            .map(|m| m.as_ref().to_vec())
            .filter(|m| !m.is_empty())
            .collect();
        let tail_len = markers
            .iter()
            .map(Vec::len)
            .max()
            .unwrap_or(1)
            .saturating_sub(1);

        Self {
            markers,
            tail_len,
            tail: Vec::with_capacity(tail_len),
            line_has_content: false,
            line_flagged: false,
            pending_cr: false,
            stats: LineStats::default(),
        }
    }

    /// Feed the next bytes of input
    pub fn update(&mut self, bytes: &[u8]) {
        let mut start = 0;

        for (idx, &byte) in bytes.iter().enumerate() {
            if self.pending_cr {
                self.pending_cr = false;
                if byte == b'\n' {
                    start = idx + 1;
                    continue;
                }
            }

            if byte == b'\n' || byte == b'\r' {
                self.scan(&bytes[start..idx]);
                self.end_line();
                self.pending_cr = byte == b'\r';
                start = idx + 1;
            }
        }

        if start < bytes.len() {
            self.scan(&bytes[start..]);
        }
    }

    /// Close the input and return the final statistics
    pub fn finish(mut self) -> LineStats {
        if self.line_has_content {
            self.end_line();
        }
        self.stats
    }

    /// Account for a segment of the current line (no terminators inside)
    fn scan(&mut self, segment: &[u8]) {
        if segment.is_empty() {
            return;
        }
        self.line_has_content = true;

        if self.line_flagged || self.markers.is_empty() {
            return;
        }

        if self.markers.iter().any(|m| contains(segment, m)) || self.spans_boundary(segment) {
            self.line_flagged = true;
            self.tail.clear();
            return;
        }

        if segment.len() >= self.tail_len {
            self.tail.clear();
            self.tail
                .extend_from_slice(&segment[segment.len() - self.tail_len..]);
        } else {
            self.tail.extend_from_slice(segment);
            let excess = self.tail.len().saturating_sub(self.tail_len);
            self.tail.drain(..excess);
        }
    }

    /// Check for a marker that starts in the carried tail and ends in `segment`
    fn spans_boundary(&self, segment: &[u8]) -> bool {
        if self.tail.is_empty() {
            return false;
        }
        let head = &segment[..segment.len().min(self.tail_len)];
        let mut window = Vec::with_capacity(self.tail.len() + head.len());
        window.extend_from_slice(&self.tail);
        window.extend_from_slice(head);
        self.markers.iter().any(|m| contains(&window, m))
    }

    fn end_line(&mut self) {
        self.stats.lines += 1;
        if self.line_flagged {
            self.stats.error_lines += 1;
        }
        self.line_has_content = false;
        self.line_flagged = false;
        self.tail.clear();
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.len() >= needle.len() && haystack.windows(needle.len()).any(|w| w == needle)
}
