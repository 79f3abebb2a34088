//! Bounded output capture for container stdout/stderr.

use std::io;

/// Byte sink that accepts unlimited writes but retains at most `cap` bytes.
///
/// Writes past the budget are acknowledged in full so the producer never sees
/// a short write; only the retained buffer is cut and `truncated` is raised.
#[derive(Debug, Clone)]
pub struct CappedBuffer {
    buf: Vec<u8>,
    remaining: usize,
    truncated: bool,
}

impl CappedBuffer {
    pub fn new(cap: usize) -> Self {
        Self {
            buf: Vec::with_capacity(cap.min(64 * 1024)),
            remaining: cap,
            truncated: false,
        }
    }

    /// Appends as much of `data` as the budget allows and returns `data.len()`.
    pub fn push(&mut self, data: &[u8]) -> usize {
        if data.is_empty() {
            return 0;
        }
        if self.remaining == 0 {
            self.truncated = true;
            return data.len();
        }
        let keep = if data.len() > self.remaining {
            self.truncated = true;
            self.remaining
        } else {
            data.len()
        };
        self.buf.extend_from_slice(&data[..keep]);
        self.remaining -= keep;
        data.len()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn truncated(&self) -> bool {
        self.truncated
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn finish(self) -> CapturedOutput {
        CapturedOutput {
            size: self.buf.len(),
            text: String::from_utf8_lossy(&self.buf).into_owned(),
            truncated: self.truncated,
        }
    }
}

impl io::Write for CappedBuffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        Ok(self.push(data))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// What a capped sink retained from one stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub text: String,
    /// Retained bytes before lossy UTF-8 decoding.
    pub size: usize,
    pub truncated: bool,
}

impl CapturedOutput {
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            size: text.len(),
            text,
            truncated: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_writes_within_budget_are_kept() {
        let mut sink = CappedBuffer::new(16);
        assert_eq!(sink.write(b"hello ").unwrap(), 6);
        assert_eq!(sink.write(b"world").unwrap(), 5);
        assert_eq!(sink.as_bytes(), b"hello world");
        assert!(!sink.truncated());
    }

    #[test]
    fn test_overflowing_write_is_cut_but_fully_acknowledged() {
        let mut sink = CappedBuffer::new(4);
        assert_eq!(sink.write(b"abcdefgh").unwrap(), 8);
        assert_eq!(sink.as_bytes(), b"abcd");
        assert!(sink.truncated());
    }

    #[test]
    fn test_exhausted_sink_discards_everything() {
        let mut sink = CappedBuffer::new(3);
        sink.push(b"abc");
        assert!(!sink.truncated());

        assert_eq!(sink.push(b"more"), 4);
        assert_eq!(sink.len(), 3);
        assert!(sink.truncated());
    }

    #[test]
    fn test_exact_fill_is_not_truncation() {
        let mut sink = CappedBuffer::new(5);
        sink.push(b"12345");
        let captured = sink.finish();
        assert_eq!(captured.text, "12345");
        assert_eq!(captured.size, 5);
        assert!(!captured.truncated);
    }

    #[test]
    fn test_zero_budget_flags_on_first_byte() {
        let mut sink = CappedBuffer::new(0);
        assert_eq!(sink.push(b""), 0);
        assert!(!sink.truncated());
        assert_eq!(sink.push(b"x"), 1);
        assert!(sink.truncated());
        assert!(sink.is_empty());
    }
}
