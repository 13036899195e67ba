//! RESP (Redis Serialization Protocol) value type.
//!
//! Every frame starts with a one-byte type tag and ends with CRLF:
//!
//! - `+` SimpleString: `+OK\r\n`
//! - `-` Error: `-ERR unknown command\r\n`
//! - `:` Integer: `:1000\r\n`
//! - `$` BulkString: `$5\r\nhello\r\n`, null form `$-1\r\n`
//! - `*` Array: `*2\r\n$3\r\nGET\r\n$4\r\nname\r\n`, null form `*-1\r\n`
//!
//! Null bulk strings and null arrays are distinct from their empty
//! counterparts (`$0\r\n\r\n`, `*0\r\n`), so both variants carry an
//! `Option` payload.

use crate::protocol::parser::ProtocolError;
use bytes::Bytes;

/// The CRLF terminator used by the wire format.
pub const CRLF: &[u8] = b"\r\n";

/// RESP type tag bytes.
pub mod tag {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// A single RESP protocol value, used both for parsed requests and for
/// serialized responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// Non-binary-safe string; may not contain CR or LF.
    SimpleString(String),

    /// Error condition reported to the client.
    Error(String),

    /// 64-bit signed integer.
    Integer(i64),

    /// Binary-safe string; `None` is the null bulk string (`$-1\r\n`).
    BulkString(Option<Bytes>),

    /// Sequence of nested values; `None` is the null array (`*-1\r\n`).
    Array(Option<Vec<RespValue>>),
}

impl RespValue {
    pub fn simple_string(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    pub fn error(s: impl Into<String>) -> Self {
        RespValue::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        RespValue::Integer(n)
    }

    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        RespValue::BulkString(Some(data.into()))
    }

    /// The null bulk string, returned for missing keys.
    pub fn null_bulk() -> Self {
        RespValue::BulkString(None)
    }

    pub fn array(values: Vec<RespValue>) -> Self {
        RespValue::Array(Some(values))
    }

    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    pub fn pong() -> Self {
        RespValue::SimpleString("PONG".to_string())
    }

    /// Serializes the value to its wire representation.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the value into an existing buffer.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            RespValue::SimpleString(s) => {
                buf.push(tag::SIMPLE_STRING);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            RespValue::Error(s) => {
                buf.push(tag::ERROR);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            RespValue::Integer(n) => {
                buf.push(tag::INTEGER);
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(CRLF);
            }
            RespValue::BulkString(Some(data)) => {
                buf.push(tag::BULK_STRING);
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                buf.extend_from_slice(data);
                buf.extend_from_slice(CRLF);
            }
            RespValue::BulkString(None) => {
                buf.extend_from_slice(b"$-1");
                buf.extend_from_slice(CRLF);
            }
            RespValue::Array(Some(values)) => {
                buf.push(tag::ARRAY);
                buf.extend_from_slice(values.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                for value in values {
                    value.serialize_into(buf);
                }
            }
            RespValue::Array(None) => {
                buf.extend_from_slice(b"*-1");
                buf.extend_from_slice(CRLF);
            }
        }
    }

    /// Coerces a parsed value into a command name plus arguments.
    ///
    /// A command is a non-null, non-empty array whose elements are all
    /// BulkString or SimpleString. The first element becomes the
    /// upper-cased command name; the rest are passed through as raw
    /// bytes. Anything else is a protocol violation and fatal to the
    /// connection.
    pub fn to_command(&self) -> Result<(String, Vec<Bytes>), ProtocolError> {
        let items = match self {
            RespValue::Array(Some(items)) => items,
            _ => return Err(ProtocolError::NotAnArray),
        };

        if items.is_empty() {
            return Err(ProtocolError::EmptyCommand);
        }

        let name = match &items[0] {
            RespValue::BulkString(Some(b)) => std::str::from_utf8(b)
                .map_err(|e| ProtocolError::InvalidUtf8(e.to_string()))?
                .to_uppercase(),
            RespValue::SimpleString(s) => s.to_uppercase(),
            _ => return Err(ProtocolError::NonStringElement(0)),
        };

        let mut args = Vec::with_capacity(items.len() - 1);
        for (i, item) in items.iter().enumerate().skip(1) {
            match item {
                RespValue::BulkString(Some(b)) => args.push(b.clone()),
                RespValue::SimpleString(s) => args.push(Bytes::copy_from_slice(s.as_bytes())),
                _ => return Err(ProtocolError::NonStringElement(i)),
            }
        }

        Ok((name, args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_string_serialize() {
        assert_eq!(RespValue::simple_string("OK").serialize(), b"+OK\r\n");
    }

    #[test]
    fn error_serialize() {
        assert_eq!(
            RespValue::error("ERR unknown command 'FOO'").serialize(),
            b"-ERR unknown command 'FOO'\r\n"
        );
    }

    #[test]
    fn integer_serialize() {
        assert_eq!(RespValue::integer(1000).serialize(), b":1000\r\n");
        assert_eq!(RespValue::integer(-2).serialize(), b":-2\r\n");
    }

    #[test]
    fn bulk_string_serialize() {
        assert_eq!(
            RespValue::bulk_string(Bytes::from("hello")).serialize(),
            b"$5\r\nhello\r\n"
        );
    }

    #[test]
    fn null_bulk_is_distinct_from_empty() {
        assert_eq!(RespValue::null_bulk().serialize(), b"$-1\r\n");
        assert_eq!(
            RespValue::bulk_string(Bytes::new()).serialize(),
            b"$0\r\n\r\n"
        );
    }

    #[test]
    fn null_array_is_distinct_from_empty() {
        assert_eq!(RespValue::Array(None).serialize(), b"*-1\r\n");
        assert_eq!(RespValue::array(vec![]).serialize(), b"*0\r\n");
    }

    #[test]
    fn array_serialize() {
        let value = RespValue::array(vec![
            RespValue::bulk_string(Bytes::from("GET")),
            RespValue::bulk_string(Bytes::from("name")),
        ]);
        assert_eq!(value.serialize(), b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n");
    }

    #[test]
    fn nested_array_serialize() {
        let value = RespValue::array(vec![
            RespValue::integer(1),
            RespValue::array(vec![RespValue::integer(2), RespValue::integer(3)]),
        ]);
        assert_eq!(value.serialize(), b"*2\r\n:1\r\n*2\r\n:2\r\n:3\r\n");
    }

    #[test]
    fn to_command_uppercases_name() {
        let value = RespValue::array(vec![
            RespValue::bulk_string(Bytes::from("get")),
            RespValue::bulk_string(Bytes::from("name")),
        ]);
        let (cmd, args) = value.to_command().unwrap();
        assert_eq!(cmd, "GET");
        assert_eq!(args, vec![Bytes::from("name")]);
    }

    #[test]
    fn to_command_accepts_simple_strings() {
        let value = RespValue::array(vec![
            RespValue::simple_string("ping"),
            RespValue::simple_string("hi"),
        ]);
        let (cmd, args) = value.to_command().unwrap();
        assert_eq!(cmd, "PING");
        assert_eq!(args, vec![Bytes::from("hi")]);
    }

    #[test]
    fn to_command_rejects_empty_array() {
        let value = RespValue::array(vec![]);
        assert_eq!(value.to_command(), Err(ProtocolError::EmptyCommand));
    }

    #[test]
    fn to_command_rejects_non_string_elements() {
        let value = RespValue::array(vec![
            RespValue::bulk_string(Bytes::from("SET")),
            RespValue::integer(1),
        ]);
        assert_eq!(value.to_command(), Err(ProtocolError::NonStringElement(1)));

        let value = RespValue::array(vec![RespValue::null_bulk()]);
        assert_eq!(value.to_command(), Err(ProtocolError::NonStringElement(0)));
    }

    #[test]
    fn to_command_rejects_non_arrays() {
        assert_eq!(
            RespValue::integer(7).to_command(),
            Err(ProtocolError::NotAnArray)
        );
        assert_eq!(
            RespValue::Array(None).to_command(),
            Err(ProtocolError::NotAnArray)
        );
    }
}
