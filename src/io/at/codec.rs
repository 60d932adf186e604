// src/io/at/codec.rs
//
// Wire framing and line classification for the AT protocol.
//
// Outgoing: "AT" + command body + CRLF (the transport appends the CRLF).
// Incoming lines fall into four classes:
//   {...}  device status/telemetry, out of band, always dropped here
//   #...   comment, always dropped
//   OK / ERROR   command terminators (recognized by the channel)
//   anything else  response fragment or unsolicited notification

/// Protocol prefix prepended to every outgoing command body.
pub const COMMAND_PREFIX: &str = "AT";

/// Terminator line resolving the pending command as success.
pub const TERMINATOR_OK: &str = "OK";

/// Terminator line resolving the pending command as failure.
pub const TERMINATOR_ERROR: &str = "ERROR";

/// Classification of one incoming line, before terminator handling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineClass {
    /// Blank line; a no-op for the pump.
    Empty,
    /// Curly-brace-prefixed status/telemetry line; always dropped.
    Status,
    /// Hash-prefixed comment; always dropped.
    Comment,
    /// Response fragment, terminator, or unsolicited notification.
    Payload,
}

/// Classify a single stripped incoming line.
pub fn classify(line: &str) -> LineClass {
    if line.is_empty() {
        LineClass::Empty
    } else if line.starts_with('{') {
        LineClass::Status
    } else if line.starts_with('#') {
        LineClass::Comment
    } else {
        LineClass::Payload
    }
}

/// Prepend the protocol prefix to a command body.
///
/// The caller supplies the fully formed body (e.g. `$LED=1`); no argument
/// grammar is validated here.
pub fn frame_command(body: &str) -> String {
    format!("{}{}", COMMAND_PREFIX, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert_eq!(classify("{\"temp\": 21.5}"), LineClass::Status);
        assert_eq!(classify("{"), LineClass::Status);
    }

    #[test]
    fn test_classify_comment() {
        assert_eq!(classify("# boot v1.2"), LineClass::Comment);
        assert_eq!(classify("#"), LineClass::Comment);
    }

    #[test]
    fn test_classify_empty() {
        assert_eq!(classify(""), LineClass::Empty);
    }

    #[test]
    fn test_classify_payload() {
        assert_eq!(classify("OK"), LineClass::Payload);
        assert_eq!(classify("ERROR"), LineClass::Payload);
        assert_eq!(classify("$TEMP=21.5"), LineClass::Payload);
        // Only a leading brace marks a status line
        assert_eq!(classify("value {1}"), LineClass::Payload);
    }

    #[test]
    fn test_frame_command() {
        assert_eq!(frame_command("$LED=1"), "AT$LED=1");
        assert_eq!(frame_command(""), "AT");
    }
}
