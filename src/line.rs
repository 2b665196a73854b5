//! Line accumulation for `read_line`

use std::borrow::Cow;
use std::str::Utf8Error;

use crate::config::MAX_LINE_LEN;

/// A line read from the port.
///
/// `Truncated` holds exactly [`MAX_LINE_LEN`] bytes that arrived without a
/// line feed; the rest of that line is still waiting on the port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// Ends with `\n`, which is kept
    Complete(Vec<u8>),
    Truncated(Vec<u8>),
}

impl Line {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Line::Complete(bytes) | Line::Truncated(bytes) => bytes,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Line::Complete(bytes) | Line::Truncated(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    pub fn is_truncated(&self) -> bool {
        matches!(self, Line::Truncated(_))
    }

    pub fn to_str(&self) -> Result<&str, Utf8Error> {
        std::str::from_utf8(self.as_bytes())
    }

    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }
}

impl AsRef<[u8]> for Line {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

/// Collects bytes until a line feed or the length cap
pub struct LineAssembler {
    buffer: Vec<u8>,
}

impl LineAssembler {
    pub fn new() -> Self {
        LineAssembler {
            buffer: Vec::with_capacity(MAX_LINE_LEN),
        }
    }

    /// Append one byte; returns the finished line once it ends
    pub fn push(&mut self, byte: u8) -> Option<Line> {
        self.buffer.push(byte);

        // A terminator landing exactly on the cap still counts as complete
        if byte == b'\n' {
            return Some(Line::Complete(self.take()));
        }
        if self.buffer.len() >= MAX_LINE_LEN {
            return Some(Line::Truncated(self.take()));
        }
        None
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    fn take(&mut self) -> Vec<u8> {
        std::mem::replace(&mut self.buffer, Vec::with_capacity(MAX_LINE_LEN))
    }
}

impl Default for LineAssembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(asm: &mut LineAssembler, data: &[u8]) -> Vec<Line> {
        data.iter().filter_map(|&b| asm.push(b)).collect()
    }

    #[test]
    fn test_line_keeps_terminator() {
        let mut asm = LineAssembler::new();
        let lines = feed(&mut asm, b"abc\n");
        assert_eq!(lines, vec![Line::Complete(b"abc\n".to_vec())]);
        assert!(asm.is_empty());
    }

    #[test]
    fn test_bare_newline() {
        let mut asm = LineAssembler::new();
        assert_eq!(asm.push(b'\n'), Some(Line::Complete(vec![b'\n'])));
    }

    #[test]
    fn test_carriage_return_is_data() {
        let mut asm = LineAssembler::new();
        let lines = feed(&mut asm, b"ok\r\n");
        assert_eq!(lines[0].as_bytes(), b"ok\r\n");
    }

    #[test]
    fn test_truncates_at_cap() {
        let mut asm = LineAssembler::new();
        let data = vec![b'x'; 300];
        let lines = feed(&mut asm, &data);

        assert_eq!(lines.len(), 1);
        assert!(lines[0].is_truncated());
        assert_eq!(lines[0].len(), MAX_LINE_LEN);
        // The overflow starts the next line
        assert_eq!(asm.len(), 300 - MAX_LINE_LEN);
    }

    #[test]
    fn test_newline_on_last_slot_is_complete() {
        let mut asm = LineAssembler::new();
        let mut data = vec![b'y'; MAX_LINE_LEN - 1];
        data.push(b'\n');
        let lines = feed(&mut asm, &data);

        assert_eq!(lines.len(), 1);
        assert!(!lines[0].is_truncated());
        assert_eq!(lines[0].len(), MAX_LINE_LEN);
    }

    #[test]
    fn test_multiple_lines() {
        let mut asm = LineAssembler::new();
        let lines = feed(&mut asm, b"one\ntwo\nthr");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].to_str().unwrap(), "two\n");
        assert_eq!(asm.len(), 3);
    }

    #[test]
    fn test_lossy_text() {
        let line = Line::Complete(vec![0xff, b'a', b'\n']);
        assert!(line.to_str().is_err());
        assert_eq!(line.to_string_lossy(), "\u{fffd}a\n");
        assert_eq!(line.into_bytes(), vec![0xff, b'a', b'\n']);
    }
}
