//! Client connection management.
//!
//! The acceptor spawns one task per TCP connection; each task owns its
//! read buffer and parser and runs [`handler::ConnectionHandler`] until
//! the client disconnects, a read deadline passes, or a protocol
//! violation forces a close.

pub mod handler;

pub use handler::{handle_connection, ConnectionError, ConnectionHandler, ConnectionStats};
