//! Versioned storage: clock, TTL index, sharded MVCC store, expirer.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                   VersionedStore                     │
//! │   64 shards ── key -> bounded version chain          │
//! │   TtlIndex  ── key -> latest expiry deadline         │
//! └──────────────────────────▲───────────────────────────┘
//!                            │ remove_expired() every second
//!                 ┌──────────┴──────────┐
//!                 │       Expirer       │
//!                 │  (background task)  │
//!                 └─────────────────────┘
//! ```
//!
//! Writes append versions (at most [`MAX_VERSIONS`] per key); reads are
//! snapshots against a key's chain at a query timestamp. Expiration is
//! purely asynchronous: readers judge visibility by recorded expiry but
//! never remove anything, and the [`Expirer`] reclaims due keys on its
//! own ticker.

pub mod clock;
pub mod engine;
pub mod expiry;
pub mod ttl;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{
    StoreStats, Version, VersionedStore, MAX_VERSIONS, SHARD_COUNT, TTL_MISSING, TTL_NO_EXPIRY,
};
pub use expiry::{start_expirer, Expirer, TTL_CHECK_INTERVAL};
pub use ttl::TtlIndex;
