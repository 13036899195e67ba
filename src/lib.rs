//! # ChronoKV - an in-memory key-value store with version history
//!
//! ChronoKV is a Redis-wire-compatible, in-memory key-value database
//! with multi-version concurrency control: every write appends a
//! timestamped version, reads can be pinned to any point in time, and
//! keys may carry a TTL that a background task enforces without
//! blocking live traffic.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                           ChronoKV                             │
//! │                                                                │
//! │  ┌────────────┐   ┌────────────┐   ┌───────────────────┐       │
//! │  │ TCP server │──>│ Connection │──>│ CommandDispatcher │       │
//! │  │  (RESP)    │   │  handler   │   └─────────┬─────────┘       │
//! │  └────────────┘   └────────────┘             │                 │
//! │  ┌────────────┐                              ▼                 │
//! │  │ HTTP/JSON  │─────────────────>┌───────────────────────────┐ │
//! │  │   facade   │                  │      VersionedStore       │ │
//! │  └────────────┘                  │  64 shards, version       │ │
//! │                                  │  chains, TTL index        │ │
//! │                                  └─────────────▲─────────────┘ │
//! │                                  ┌─────────────┴─────────────┐ │
//! │                                  │          Expirer          │ │
//! │                                  │    (background task)      │ │
//! │                                  └───────────────────────────┘ │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: RESP wire codec (typed values, incremental parser)
//! - [`storage`]: clock, TTL index, sharded MVCC store, expirer
//! - [`commands`]: command validation and dispatch
//! - [`connection`]: per-client TCP loop
//! - [`http`]: JSON façade over the store
//!
//! ## Commands
//!
//! `PING`, `SET key value [EX s | PX ms]`, `GET`, `DEL`, `EXPIRE`,
//! `TTL`, plus the versioned reads `GETAT key ts` and `HIST key [limit]`.
//!
//! ## Example
//!
//! ```
//! use chronokv::storage::VersionedStore;
//! use bytes::Bytes;
//!
//! let store = VersionedStore::new();
//! store.set(Bytes::from("k"), Bytes::from("v1"), 0);
//! store.set(Bytes::from("k"), Bytes::from("v2"), 0);
//!
//! assert_eq!(store.get(&Bytes::from("k")), Some(Bytes::from("v2")));
//! assert_eq!(store.history(&Bytes::from("k"), 0).len(), 2);
//! ```

pub mod commands;
pub mod connection;
pub mod http;
pub mod protocol;
pub mod storage;

pub use commands::CommandDispatcher;
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{ProtocolError, RespParser, RespValue};
pub use storage::{start_expirer, Expirer, VersionedStore};

/// Default RESP port.
pub const DEFAULT_TCP_PORT: u16 = 6380;

/// Default HTTP façade port.
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Default bind host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
