//! Reply Types and Wire Encoding
//!
//! Every reply TideKV sends is one of a small set of RESP shapes:
//!
//! - `+` Simple String: `+OK\r\n`
//! - `-` Error: `-Error: Invalid command\r\n`
//! - `$` Bulk String: `$5\r\nhello\r\n`
//! - Null Bulk String: `$-1\r\n`
//!
//! Replies are built as [`RespValue`]s by the command layer and turned into
//! bytes exactly once, by the connection handler, right before the write.

use bytes::{BufMut, Bytes, BytesMut};

/// The CRLF terminator used in RESP protocol
pub const CRLF: &[u8] = b"\r\n";

/// RESP protocol type prefixes
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// A reply value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// Non-binary-safe status text.
    /// Format: `+<string>\r\n`
    SimpleString(String),

    /// An error condition.
    /// Format: `-<error message>\r\n`
    Error(String),

    /// Binary-safe payload.
    /// Format: `$<length>\r\n<data>\r\n`
    BulkString(Bytes),

    /// Null bulk string: `$-1\r\n`
    Null,

    /// Several replies written back to back with no array header.
    ///
    /// ECHO answers with one bulk string per argument this way.
    Sequence(Vec<RespValue>),
}

impl RespValue {
    /// Creates a new simple string response.
    ///
    /// # Example
    /// ```
    /// use tidekv::protocol::types::RespValue;
    /// let ok = RespValue::simple_string("OK");
    /// assert_eq!(ok.serialize(), b"+OK\r\n");
    /// ```
    pub fn simple_string(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    /// Creates a new error response.
    pub fn error(s: impl Into<String>) -> Self {
        RespValue::Error(s.into())
    }

    /// Creates a new bulk string response.
    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        RespValue::BulkString(data.into())
    }

    /// Creates a null response.
    pub fn null() -> Self {
        RespValue::Null
    }

    pub fn ok() -> Self {
        RespValue::simple_string("OK")
    }

    pub fn pong() -> Self {
        RespValue::simple_string("PONG")
    }

    /// Encodes the reply into a fresh buffer.
    pub fn serialize(&self) -> Vec<u8> {
        let mut dst = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut dst);
        dst.to_vec()
    }

    /// Appends the wire form of the reply to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        match self {
            RespValue::SimpleString(text) => put_line(dst, prefix::SIMPLE_STRING, text.as_bytes()),
            RespValue::Error(message) => put_line(dst, prefix::ERROR, message.as_bytes()),
            RespValue::BulkString(data) => {
                put_line(dst, prefix::BULK_STRING, data.len().to_string().as_bytes());
                dst.put_slice(data);
                dst.put_slice(CRLF);
            }
            RespValue::Null => put_line(dst, prefix::BULK_STRING, b"-1"),
            RespValue::Sequence(replies) => replies.iter().for_each(|reply| reply.encode(dst)),
        }
    }

    /// Number of bytes [`encode`](Self::encode) will append.
    pub fn encoded_len(&self) -> usize {
        match self {
            RespValue::SimpleString(text) => text.len() + 3,
            RespValue::Error(message) => message.len() + 3,
            RespValue::BulkString(data) => data.len().to_string().len() + data.len() + 5,
            RespValue::Null => 5,
            RespValue::Sequence(replies) => replies.iter().map(RespValue::encoded_len).sum(),
        }
    }

    /// Returns the text of a simple string or a UTF-8 bulk string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RespValue::SimpleString(text) => Some(text),
            RespValue::BulkString(data) => std::str::from_utf8(data).ok(),
            _ => None,
        }
    }
}

/// Writes `<prefix><body>\r\n`.
fn put_line(dst: &mut BytesMut, prefix: u8, body: &[u8]) {
    dst.put_u8(prefix);
    dst.put_slice(body);
    dst.put_slice(CRLF);
}
