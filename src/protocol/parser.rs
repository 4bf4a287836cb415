//! Request Framer
//!
//! Turns the bytes buffered for a connection into [`Command`]s.
//!
//! Requests arrive as multi-bulk frames:
//!
//! ```text
//! *<argc>\r\n$<len>\r\n<arg>\r\n ... $<len>\r\n<arg>\r\n
//! ```
//!
//! Each element is consumed by its declared byte length, not by searching
//! for the next CRLF, so argument values may themselves contain `\r\n`.
//!
//! ## How the Parser Works
//!
//! `parse()` looks at the front of the buffer and returns either:
//! - `Ok(Some((command, consumed)))` - one full frame, `consumed` bytes long
//! - `Ok(None)` - the frame is not complete yet, read more and retry
//! - `Err(ParseError)` - the bytes cannot be a valid frame
//!
//! A frame split across several socket reads is therefore reassembled by the
//! caller simply appending to its buffer, and several frames delivered in one
//! read are taken off one at a time.
//!
//! Lines that do not start with `*` are treated as inline commands
//! (`PING\r\n`, `SET k v\r\n`), split on whitespace. Blank lines between
//! commands are skipped.
//!
//! After an error, [`ParseError::frame_len`] says whether the bad frame can
//! be stepped over. `*0` and `*-1` can; anything else leaves no reliable
//! frame boundary.

use crate::protocol::command::Command;
use crate::protocol::types::{prefix, CRLF};
use bytes::Bytes;
use std::ops::Range;
use thiserror::Error;

/// Errors that can occur while framing a request.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// The frame holds no command name (`*0`, `*-1`); it is `consumed` bytes long
    #[error("empty command")]
    EmptyCommand { consumed: usize },

    /// A length header is not a valid integer
    #[error("invalid length: {0}")]
    InvalidLength(String),

    /// Bulk string length is negative
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    /// Protocol violation (missing CRLF, wrong element type, ...)
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// A bulk string exceeds the maximum allowed size
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

impl ParseError {
    /// Length of the offending frame when it is known.
    ///
    /// Only then can the caller skip exactly that frame and carry on with
    /// whatever follows it; otherwise the stream cannot be resynchronised.
    pub fn frame_len(&self) -> Option<usize> {
        match self {
            ParseError::EmptyCommand { consumed } => Some(*consumed),
            _ => None,
        }
    }
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (64 MB)
pub const MAX_BULK_SIZE: usize = 64 * 1024 * 1024;

/// Maximum number of elements accepted in one frame
pub const MAX_ARGS: usize = 1024 * 1024;

/// Smallest possible encoded element: `$0\r\n\r\n`
const MIN_ELEMENT_LEN: usize = 6;

/// Incremental parser for client requests.
///
/// # Example
///
/// ```
/// use tidekv::protocol::RequestParser;
///
/// let mut parser = RequestParser::new();
/// let buf = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
///
/// let (command, consumed) = parser.parse(buf).unwrap().unwrap();
/// assert_eq!(command.name, "GET");
/// assert_eq!(consumed, buf.len());
/// ```
#[derive(Debug, Default)]
pub struct RequestParser {
    /// Frames successfully taken off the wire
    frames: u64,
}

impl RequestParser {
    pub fn new() -> Self {
        Self { frames: 0 }
    }

    /// Number of frames this parser has produced so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Attempts to take one command off the front of `buf`.
    ///
    /// Blank lines in front of the command are skipped and counted in the
    /// consumed length.
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(Command, usize)>> {
        let skipped = blank_prefix_len(buf);
        let frame = &buf[skipped..];
        if frame.is_empty() {
            return Ok(None);
        }

        let parsed = match frame[0] {
            prefix::ARRAY => self.parse_multibulk(frame),
            _ => self.parse_inline(frame),
        };

        match parsed {
            Ok(Some((parts, consumed))) => {
                let consumed = skipped + consumed;
                let command =
                    Command::from_parts(parts).ok_or(ParseError::EmptyCommand { consumed })?;
                self.frames += 1;
                Ok(Some((command, consumed)))
            }
            Ok(None) => Ok(None),
            Err(ParseError::EmptyCommand { consumed }) => Err(ParseError::EmptyCommand {
                consumed: skipped + consumed,
            }),
            Err(e) => Err(e),
        }
    }

    /// Parses `*<count>\r\n` followed by `count` bulk strings.
    ///
    /// Element boundaries are located first and the arguments are copied
    /// out only once the whole frame is buffered.
    fn parse_multibulk(&mut self, buf: &[u8]) -> ParseResult<Option<(Vec<Bytes>, usize)>> {
        debug_assert!(buf[0] == prefix::ARRAY);

        let (count, mut consumed) = match read_length_line(buf)? {
            Some(header) => header,
            None => return Ok(None),
        };

        // Null and empty arrays carry no command
        if count <= 0 {
            return Err(ParseError::EmptyCommand { consumed });
        }

        let count = count as usize;
        if count > MAX_ARGS {
            return Err(ParseError::ProtocolError(format!(
                "too many arguments: {}",
                count
            )));
        }

        // The header alone is never trusted for the allocation size
        let mut spans: Vec<Range<usize>> =
            Vec::with_capacity(count.min((buf.len() - consumed) / MIN_ELEMENT_LEN));

        for _ in 0..count {
            match bulk_span(&buf[consumed..])? {
                Some((data, element_len)) => {
                    spans.push(consumed + data.start..consumed + data.end);
                    consumed += element_len;
                }
                None => return Ok(None),
            }
        }

        let parts = spans
            .into_iter()
            .map(|span| Bytes::copy_from_slice(&buf[span]))
            .collect();

        Ok(Some((parts, consumed)))
    }

    fn parse_inline(&mut self, buf: &[u8]) -> ParseResult<Option<(Vec<Bytes>, usize)>> {
        let crlf_pos = match find_crlf(buf) {
            Some(pos) => pos,
            None => return Ok(None),
        };

        let parts = buf[..crlf_pos]
            .split(|b| b.is_ascii_whitespace())
            .filter(|part| !part.is_empty())
            .map(Bytes::copy_from_slice)
            .collect();

        Ok(Some((parts, crlf_pos + 2)))
    }
}

/// Locates one `$<length>\r\n<data>\r\n` element.
///
/// Returns the range of the data within `buf` and the element's total length.
fn bulk_span(buf: &[u8]) -> ParseResult<Option<(Range<usize>, usize)>> {
    if buf.is_empty() {
        return Ok(None);
    }

    if buf[0] != prefix::BULK_STRING {
        return Err(ParseError::ProtocolError(format!(
            "expected bulk string, got {:#04x}",
            buf[0]
        )));
    }

    let (length, data_start) = match read_length_line(buf)? {
        Some(header) => header,
        None => return Ok(None),
    };

    if length < 0 {
        return Err(ParseError::InvalidBulkLength(length));
    }

    let length = length as usize;
    if length > MAX_BULK_SIZE {
        return Err(ParseError::MessageTooLarge {
            size: length,
            max: MAX_BULK_SIZE,
        });
    }

    let total_needed = data_start + length + 2;
    if buf.len() < total_needed {
        return Ok(None);
    }

    if &buf[data_start + length..total_needed] != CRLF {
        return Err(ParseError::ProtocolError(
            "bulk string missing trailing CRLF".to_string(),
        ));
    }

    Ok(Some((data_start..data_start + length, total_needed)))
}

/// Reads a `<prefix><integer>\r\n` header line.
///
/// Returns the integer and the number of bytes the line occupies.
fn read_length_line(buf: &[u8]) -> ParseResult<Option<(i64, usize)>> {
    let end = match find_crlf(&buf[1..]) {
        Some(pos) => pos,
        None => return Ok(None),
    };

    let digits = &buf[1..1 + end];
    let length = std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| ParseError::InvalidLength(String::from_utf8_lossy(digits).into_owned()))?;

    Ok(Some((length, 1 + end + 2)))
}

/// Finds the position of the first CRLF in the buffer.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|window| window == CRLF)
}

/// Length of the complete blank lines (whitespace only) at the front of `buf`.
///
/// Clients such as telnet send bare newlines between commands; they are
/// dropped without a reply.
pub fn blank_prefix_len(buf: &[u8]) -> usize {
    let mut skipped = 0;

    while let Some(end) = find_crlf(&buf[skipped..]) {
        if !buf[skipped..skipped + end].iter().all(u8::is_ascii_whitespace) {
            break;
        }
        skipped += end + 2;
    }

    skipped
}

/// Parses a single command from `buf` with a throwaway parser.
pub fn parse_command(buf: &[u8]) -> ParseResult<Option<(Command, usize)>> {
    RequestParser::new().parse(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(cmd: &Command) -> Vec<&[u8]> {
        cmd.args.iter().map(|a| a.as_ref()).collect()
    }

    #[test]
    fn test_parse_ping() {
        let input = b"*1\r\n$4\r\nPING\r\n";
        let (cmd, consumed) = parse_command(input).unwrap().unwrap();
        assert_eq!(cmd.name, "PING");
        assert!(cmd.args.is_empty());
        assert_eq!(consumed, input.len());
    }

    #[test]
    fn test_parse_set_with_px() {
        let input = b"*5\r\n$3\r\nSET\r\n$3\r\nkey\r\n$5\r\nvalue\r\n$2\r\npx\r\n$3\r\n100\r\n";
        let (cmd, consumed) = parse_command(input).unwrap().unwrap();
        assert_eq!(cmd.name, "SET");
        assert_eq!(args(&cmd), vec![&b"key"[..], b"value", b"px", b"100"]);
        assert_eq!(consumed, input.len());
    }

    #[test]
    fn test_value_may_contain_crlf() {
        let input = b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$6\r\nab\r\ncd\r\n";
        let (cmd, _) = parse_command(input).unwrap().unwrap();
        assert_eq!(cmd.args[1], Bytes::from("ab\r\ncd"));
    }

    #[test]
    fn test_empty_bulk_argument() {
        let input = b"*2\r\n$4\r\nECHO\r\n$0\r\n\r\n";
        let (cmd, consumed) = parse_command(input).unwrap().unwrap();
        assert_eq!(cmd.args, vec![Bytes::new()]);
        assert_eq!(consumed, input.len());
    }

    #[test]
    fn test_incomplete_frames_wait_for_more() {
        let full = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
        for cut in 1..full.len() {
            assert_eq!(
                parse_command(&full[..cut]).unwrap(),
                None,
                "prefix of length {} should be incomplete",
                cut
            );
        }
    }

    #[test]
    fn test_pipelined_frames() {
        let input = b"*1\r\n$4\r\nPING\r\n*2\r\n$3\r\nGET\r\n$1\r\nk\r\n";
        let mut parser = RequestParser::new();

        let (first, used) = parser.parse(input).unwrap().unwrap();
        assert_eq!(first.name, "PING");

        let (second, rest) = parser.parse(&input[used..]).unwrap().unwrap();
        assert_eq!(second.name, "GET");
        assert_eq!(used + rest, input.len());
        assert_eq!(parser.frames(), 2);
    }

    #[test]
    fn test_empty_array_is_empty_command() {
        assert_eq!(
            parse_command(b"*0\r\n"),
            Err(ParseError::EmptyCommand { consumed: 4 })
        );
        assert_eq!(
            parse_command(b"*-1\r\n"),
            Err(ParseError::EmptyCommand { consumed: 5 })
        );
    }

    #[test]
    fn test_bad_array_length() {
        assert!(matches!(
            parse_command(b"*abc\r\n"),
            Err(ParseError::InvalidLength(_))
        ));
    }

    #[test]
    fn test_non_bulk_element_rejected() {
        assert!(matches!(
            parse_command(b"*1\r\n:42\r\n"),
            Err(ParseError::ProtocolError(_))
        ));
    }

    #[test]
    fn test_negative_bulk_length_rejected() {
        assert_eq!(
            parse_command(b"*1\r\n$-1\r\n"),
            Err(ParseError::InvalidBulkLength(-1))
        );
    }

    #[test]
    fn test_bulk_missing_trailing_crlf() {
        assert!(matches!(
            parse_command(b"*1\r\n$4\r\nPINGxx"),
            Err(ParseError::ProtocolError(_))
        ));
    }

    #[test]
    fn test_oversized_bulk_rejected() {
        let input = format!("*1\r\n${}\r\n", MAX_BULK_SIZE + 1);
        assert!(matches!(
            parse_command(input.as_bytes()),
            Err(ParseError::MessageTooLarge { .. })
        ));
    }

    #[test]
    fn test_parse_inline_command() {
        let input = b"SET  name Ariz\r\n";
        let (cmd, consumed) = parse_command(input).unwrap().unwrap();
        assert_eq!(cmd.name, "SET");
        assert_eq!(args(&cmd), vec![&b"name"[..], b"Ariz"]);
        assert_eq!(consumed, input.len());
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        assert_eq!(parse_command(b"   \r\n"), Ok(None));
        assert_eq!(parse_command(b"\r\n\r\n"), Ok(None));

        let input = b"\r\n \r\nPING\r\n";
        let (cmd, consumed) = parse_command(input).unwrap().unwrap();
        assert_eq!(cmd.name, "PING");
        assert_eq!(consumed, input.len());
    }

    #[test]
    fn test_blank_prefix_len() {
        assert_eq!(blank_prefix_len(b""), 0);
        assert_eq!(blank_prefix_len(b"\r\n\t\r\nPING\r\n"), 5);
        assert_eq!(blank_prefix_len(b"*1\r\n"), 0);
        // an unterminated line may still turn into a command
        assert_eq!(blank_prefix_len(b"\r\n  "), 2);
    }

    #[test]
    fn test_empty_frame_length_covers_leading_blanks() {
        let err = parse_command(b"\r\n*0\r\n*1\r\n$4\r\nPING\r\n").unwrap_err();
        assert_eq!(err.frame_len(), Some(6));
    }

    #[test]
    fn test_unrecoverable_errors_have_no_frame_len() {
        let err = parse_command(b"*1\r\n:42\r\n").unwrap_err();
        assert_eq!(err.frame_len(), None);
    }

    #[test]
    fn test_huge_declared_count_waits_for_elements() {
        let header = format!("*{}\r\n", MAX_ARGS);
        assert_eq!(parse_command(header.as_bytes()), Ok(None));

        let partial = format!("{}$1\r\na\r\n$1\r\nb\r\n", header);
        assert_eq!(parse_command(partial.as_bytes()), Ok(None));
    }

    #[test]
    fn test_too_many_arguments_rejected() {
        let header = format!("*{}\r\n", MAX_ARGS + 1);
        assert!(matches!(
            parse_command(header.as_bytes()),
            Err(ParseError::ProtocolError(_))
        ));
    }

    #[test]
    fn test_binary_safe_bulk_string() {
        let input = b"*2\r\n$4\r\nECHO\r\n$5\r\nhel\x00o\r\n";
        let (cmd, _) = parse_command(input).unwrap().unwrap();
        assert_eq!(cmd.args[0], Bytes::from(&b"hel\x00o"[..]));
    }
}
