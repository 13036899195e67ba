//! RESP wire codec.
//!
//! Implements the textual, length-prefixed framing used by standard
//! Redis clients (RESP2): a typed value enum with byte-exact
//! serialization, an incremental parser for reassembling frames from a
//! TCP stream, and the coercion from a parsed array into a command.
//!
//! ```
//! use chronokv::protocol::{parse_frame, RespValue};
//! use bytes::Bytes;
//!
//! let data = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
//! let (value, consumed) = parse_frame(data).unwrap().unwrap();
//! assert_eq!(consumed, data.len());
//!
//! let response = RespValue::bulk_string(Bytes::from("alice"));
//! assert_eq!(response.serialize(), b"$5\r\nalice\r\n");
//! ```

pub mod parser;
pub mod types;

pub use parser::{parse_frame, ParseResult, ProtocolError, RespParser};
pub use types::RespValue;
