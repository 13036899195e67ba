//! Incremental RESP frame parser.
//!
//! The parser consumes bytes from a caller-owned buffer and returns:
//!
//! - `Ok(Some((value, consumed)))` - a complete frame, `consumed` bytes used
//! - `Ok(None)` - the frame is incomplete, read more bytes and retry
//! - `Err(ProtocolError)` - the input violates the wire format
//!
//! TCP delivers a byte stream, so a single read may hold a partial frame
//! or several back-to-back frames; the `(value, consumed)` contract lets
//! the connection loop advance its buffer frame by frame. A protocol
//! error is never recoverable: the caller must drop the connection.
//!
//! Line terminators: frames are emitted with `\r\n`, but a bare `\n` is
//! accepted on input for line-delimited payloads (lengths, integers,
//! simple strings).

use crate::protocol::types::{tag, RespValue, CRLF};
use bytes::Bytes;
use std::num::ParseIntError;
use thiserror::Error;

/// Violations of the wire format. Any of these closes the connection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Unknown type tag byte at the start of a frame.
    #[error("unknown type tag: {0:#04x}")]
    UnknownTag(u8),

    /// Invalid integer payload or length field.
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Invalid UTF-8 in a line-delimited payload.
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// Bulk string length below -1.
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    /// Array length below -1.
    #[error("invalid array length: {0}")]
    InvalidArrayLength(i64),

    /// Structural violation (missing CRLF, excessive nesting).
    #[error("protocol error: {0}")]
    Malformed(String),

    /// Declared bulk string length above the allowed maximum.
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Command array with zero elements.
    #[error("empty command")]
    EmptyCommand,

    /// Command value that is not an array.
    #[error("command is not an array")]
    NotAnArray,

    /// Command array element that is not a string.
    #[error("command element {0} is not a string")]
    NonStringElement(usize),
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ProtocolError>;

/// Maximum declared size for a single bulk string (512 MB, same as Redis).
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum array nesting depth.
pub const MAX_NESTING_DEPTH: usize = 32;

/// Incremental RESP parser. One instance per connection.
#[derive(Debug, Default)]
pub struct RespParser {
    depth: usize,
}

impl RespParser {
    pub fn new() -> Self {
        Self { depth: 0 }
    }

    /// Attempts to parse one complete frame from the front of `buf`.
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        self.depth = 0;
        self.parse_value(buf)
    }

    fn parse_value(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        if buf.is_empty() {
            return Ok(None);
        }

        if self.depth > MAX_NESTING_DEPTH {
            return Err(ProtocolError::Malformed(format!(
                "maximum nesting depth exceeded: {}",
                MAX_NESTING_DEPTH
            )));
        }

        match buf[0] {
            tag::SIMPLE_STRING => self.parse_simple_string(buf),
            tag::ERROR => self.parse_error(buf),
            tag::INTEGER => self.parse_integer(buf),
            tag::BULK_STRING => self.parse_bulk_string(buf),
            tag::ARRAY => self.parse_array(buf),
            other => Err(ProtocolError::UnknownTag(other)),
        }
    }

    /// `+<line>\r\n`
    fn parse_simple_string(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        match find_line(&buf[1..]) {
            Some((line, consumed)) => {
                let s = std::str::from_utf8(line)
                    .map_err(|e| ProtocolError::InvalidUtf8(e.to_string()))?;
                Ok(Some((RespValue::SimpleString(s.to_string()), 1 + consumed)))
            }
            None => Ok(None),
        }
    }

    /// `-<line>\r\n`
    fn parse_error(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        match find_line(&buf[1..]) {
            Some((line, consumed)) => {
                let s = std::str::from_utf8(line)
                    .map_err(|e| ProtocolError::InvalidUtf8(e.to_string()))?;
                Ok(Some((RespValue::Error(s.to_string()), 1 + consumed)))
            }
            None => Ok(None),
        }
    }

    /// `:<signed-decimal>\r\n`
    fn parse_integer(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        match find_line(&buf[1..]) {
            Some((line, consumed)) => {
                let n = parse_i64(line)?;
                Ok(Some((RespValue::Integer(n), 1 + consumed)))
            }
            None => Ok(None),
        }
    }

    /// `$<len>\r\n<len bytes>\r\n`, or the null form `$-1\r\n`
    fn parse_bulk_string(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        let (line, line_consumed) = match find_line(&buf[1..]) {
            Some(found) => found,
            None => return Ok(None),
        };

        let length = parse_i64(line)?;

        if length == -1 {
            return Ok(Some((RespValue::BulkString(None), 1 + line_consumed)));
        }
        if length < 0 {
            return Err(ProtocolError::InvalidBulkLength(length));
        }

        let length = length as usize;
        if length > MAX_BULK_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: length,
                max: MAX_BULK_SIZE,
            });
        }

        // Payload plus its trailing CRLF must be fully buffered.
        let data_start = 1 + line_consumed;
        let total_needed = data_start + length + 2;
        if buf.len() < total_needed {
            return Ok(None);
        }

        if &buf[data_start + length..total_needed] != CRLF {
            return Err(ProtocolError::Malformed(
                "bulk string missing trailing CRLF".to_string(),
            ));
        }

        let data = Bytes::copy_from_slice(&buf[data_start..data_start + length]);
        Ok(Some((RespValue::BulkString(Some(data)), total_needed)))
    }

    /// `*<n>\r\n<n frames>`, or the null form `*-1\r\n`
    fn parse_array(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        let (line, line_consumed) = match find_line(&buf[1..]) {
            Some(found) => found,
            None => return Ok(None),
        };

        let count = parse_i64(line)?;

        if count == -1 {
            return Ok(Some((RespValue::Array(None), 1 + line_consumed)));
        }
        if count < 0 {
            return Err(ProtocolError::InvalidArrayLength(count));
        }

        let count = count as usize;
        let mut elements = Vec::with_capacity(count.min(64));
        let mut consumed = 1 + line_consumed;

        self.depth += 1;

        for _ in 0..count {
            if consumed >= buf.len() {
                return Ok(None);
            }

            match self.parse_value(&buf[consumed..])? {
                Some((value, element_consumed)) => {
                    elements.push(value);
                    consumed += element_consumed;
                }
                None => return Ok(None),
            }
        }

        self.depth -= 1;

        Ok(Some((RespValue::Array(Some(elements)), consumed)))
    }
}

/// Finds the next line in `buf`.
///
/// Returns the line content (without its terminator) and the number of
/// bytes consumed including the terminator. `\r\n` and bare `\n` both
/// terminate a line.
fn find_line(buf: &[u8]) -> Option<(&[u8], usize)> {
    let nl = buf.iter().position(|&b| b == b'\n')?;
    let line = &buf[..nl];
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    Some((line, nl + 1))
}

fn parse_i64(line: &[u8]) -> ParseResult<i64> {
    let s = std::str::from_utf8(line).map_err(|e| ProtocolError::InvalidUtf8(e.to_string()))?;
    s.parse()
        .map_err(|e: ParseIntError| ProtocolError::InvalidInteger(e.to_string()))
}

/// Parses a single frame from `buf` with a fresh parser.
pub fn parse_frame(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    RespParser::new().parse(buf)
}
