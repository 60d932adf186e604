// src/io/serial/lines.rs
//
// Incremental byte-to-line splitter for the serial read path.
// Feed raw chunks as they arrive; pop complete newline-terminated lines.

/// Max buffered bytes before a forced split. A device stuck spewing bytes
/// without a terminator must not grow the buffer without bound; the forced
/// fragment surfaces as an ordinary line and is classified downstream.
const MAX_LINE_BYTES: usize = 4096;

/// Accumulates raw serial bytes and yields complete lines.
///
/// Lines are split on `\n`; the terminator and any surrounding whitespace
/// (including the `\r` of CR LF) are stripped. Input that is not valid UTF-8
/// is decoded lossily — the wire protocol is ASCII and anything else is line
/// noise.
#[derive(Debug, Default)]
pub struct LineSplitter {
    buffer: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        LineSplitter { buffer: Vec::new() }
    }

    /// Append a chunk of raw bytes read from the device.
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Pop the next complete line, if one is buffered.
    ///
    /// Returns `Some("")` for a blank line (e.g. a bare CR LF) so the caller
    /// can distinguish it from "nothing buffered".
    pub fn next_line(&mut self) -> Option<String> {
        if let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            return Some(String::from_utf8_lossy(&raw).trim().to_string());
        }

        // Force split on runaway input
        if self.buffer.len() >= MAX_LINE_BYTES {
            let raw: Vec<u8> = self.buffer.drain(..).collect();
            return Some(String::from_utf8_lossy(&raw).trim().to_string());
        }

        None
    }

    /// Discard any partially accumulated input. Used when the device buffers
    /// are reset so a half-received line cannot leak into the next read.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_line() {
        let mut splitter = LineSplitter::new();
        splitter.feed(b"OK\r\n");
        assert_eq!(splitter.next_line(), Some("OK".to_string()));
        assert_eq!(splitter.next_line(), None);
    }

    #[test]
    fn test_partial_then_complete() {
        let mut splitter = LineSplitter::new();
        splitter.feed(b"$TEMP");
        assert_eq!(splitter.next_line(), None);
        splitter.feed(b"=21.5\r\nOK\r\n");
        assert_eq!(splitter.next_line(), Some("$TEMP=21.5".to_string()));
        assert_eq!(splitter.next_line(), Some("OK".to_string()));
        assert_eq!(splitter.next_line(), None);
    }

    #[test]
    fn test_multiple_lines_one_chunk() {
        let mut splitter = LineSplitter::new();
        splitter.feed(b"foo\r\nbar\r\nOK\r\n");
        assert_eq!(splitter.next_line(), Some("foo".to_string()));
        assert_eq!(splitter.next_line(), Some("bar".to_string()));
        assert_eq!(splitter.next_line(), Some("OK".to_string()));
    }

    #[test]
    fn test_bare_lf_terminator() {
        let mut splitter = LineSplitter::new();
        splitter.feed(b"# comment\n");
        assert_eq!(splitter.next_line(), Some("# comment".to_string()));
    }

    #[test]
    fn test_blank_line_is_empty_string() {
        let mut splitter = LineSplitter::new();
        splitter.feed(b"\r\n");
        assert_eq!(splitter.next_line(), Some(String::new()));
        assert_eq!(splitter.next_line(), None);
    }

    #[test]
    fn test_invalid_utf8_is_lossy() {
        let mut splitter = LineSplitter::new();
        splitter.feed(&[0xff, b'O', b'K', b'\n']);
        let line = splitter.next_line().unwrap();
        assert!(line.ends_with("OK"));
    }

    #[test]
    fn test_clear_drops_partial_input() {
        let mut splitter = LineSplitter::new();
        splitter.feed(b"half a li");
        splitter.clear();
        splitter.feed(b"OK\r\n");
        assert_eq!(splitter.next_line(), Some("OK".to_string()));
    }

    #[test]
    fn test_forced_split_on_runaway_input() {
        let mut splitter = LineSplitter::new();
        splitter.feed(&vec![b'x'; MAX_LINE_BYTES]);
        let line = splitter.next_line().unwrap();
        assert_eq!(line.len(), MAX_LINE_BYTES);
        assert_eq!(splitter.next_line(), None);
    }
}
