//! Sharded, versioned key-value store (MVCC).
//!
//! Keys are spread over 64 independent shards, each guarded by its own
//! RwLock, so readers and writers of unrelated keys never contend. A
//! key maps to a bounded chain of versions rather than a single value;
//! readers pick the version visible at a query timestamp instead of
//! blocking writers.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       VersionedStore                         │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐        ┌────────────┐   │
//! │  │ Shard 0 │ │ Shard 1 │ │ ...64   │        │  TtlIndex  │   │
//! │  │ RwLock  │ │ RwLock  │ │ shards  │        │   Mutex    │   │
//! │  └────┬────┘ └─────────┘ └─────────┘        └────────────┘   │
//! │       │ key -> Arc<RwLock<Vec<Version>>>                     │
//! └───────┼──────────────────────────────────────────────────────┘
//!         ▼
//!   [v1, v2, ..., tail]   at most MAX_VERSIONS, oldest first
//! ```
//!
//! Lock order is always shard before chain, and the TTL index mutex is
//! never taken while a chain lock is held.

use crate::storage::clock::{Clock, SystemClock};
use crate::storage::ttl::TtlIndex;
use bytes::Bytes;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Number of independent shards. Fixed at process start.
pub const SHARD_COUNT: usize = 64;

/// Maximum retained versions per key; older versions are discarded.
pub const MAX_VERSIONS: usize = 10;

/// `TTL` result for a key that does not exist or has already expired.
pub const TTL_MISSING: i64 = -2;

/// `TTL` result for a key whose newest version never expires.
pub const TTL_NO_EXPIRY: i64 = -1;

/// One immutable write. `expiry_ts == 0` means no expiration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub data: Bytes,
    /// Wall-clock milliseconds assigned when the write was applied.
    pub write_ts: i64,
    /// Absolute expiration in milliseconds, or 0.
    pub expiry_ts: i64,
}

/// Ordered versions of one key, oldest first. The tail is the newest.
type Chain = Arc<RwLock<Vec<Version>>>;

#[derive(Debug, Default)]
struct Shard {
    chains: RwLock<HashMap<Bytes, Chain>>,
}

/// Point-in-time store statistics, summed shard by shard. Each shard is
/// internally consistent; the total is not globally atomic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total_keys: usize,
    pub total_versions: usize,
    pub shard_count: usize,
}

/// The in-memory MVCC store.
///
/// All operations are safe to call concurrently from any task or
/// thread, and none of them returns an error: inputs outside the valid
/// domain produce the documented sentinel results instead.
///
/// # Example
///
/// ```
/// use chronokv::storage::VersionedStore;
/// use bytes::Bytes;
///
/// let store = VersionedStore::new();
/// store.set(Bytes::from("name"), Bytes::from("alice"), 0);
/// assert_eq!(store.get(&Bytes::from("name")), Some(Bytes::from("alice")));
/// ```
#[derive(Debug)]
pub struct VersionedStore {
    shards: Vec<Shard>,
    ttl: TtlIndex,
    clock: Arc<dyn Clock>,
}

impl Default for VersionedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionedStore {
    /// Creates a store on the system wall clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    /// Creates a store on an injected clock, for deterministic tests.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| Shard::default()).collect(),
            ttl: TtlIndex::new(),
            clock,
        }
    }

    /// Shard index for a key: first 8 bytes of SHA-256 as a big-endian
    /// u64, modulo the shard count.
    fn shard_index(key: &[u8]) -> usize {
        let digest = Sha256::digest(key);
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        (u64::from_be_bytes(prefix) % SHARD_COUNT as u64) as usize
    }

    fn shard(&self, key: &[u8]) -> &Shard {
        &self.shards[Self::shard_index(key)]
    }

    /// Appends a new version of `key`.
    ///
    /// `ttl_ms` is a non-negative delta; 0 means no expiration. The new
    /// version's expiry comes from this call alone, never from earlier
    /// versions, and a zero TTL also clears any stale index entry left
    /// by a previous expiring write.
    pub fn set(&self, key: Bytes, value: Bytes, ttl_ms: i64) {
        let now = self.clock.now_ms();
        let expiry = if ttl_ms > 0 { now + ttl_ms } else { 0 };

        let shard = self.shard(&key);
        let mut chains = shard.chains.write().unwrap();

        if expiry > 0 {
            self.ttl.add(key.clone(), expiry);
        } else {
            self.ttl.remove(&key);
        }

        let chain = chains
            .entry(key)
            .or_insert_with(|| Arc::new(RwLock::new(Vec::with_capacity(MAX_VERSIONS))));

        let mut versions = chain.write().unwrap();
        versions.push(Version {
            data: value,
            write_ts: now,
            expiry_ts: expiry,
        });

        if versions.len() > MAX_VERSIONS {
            let excess = versions.len() - MAX_VERSIONS;
            versions.drain(..excess);
        }
    }

    /// Returns the value visible now, if any.
    pub fn get(&self, key: &Bytes) -> Option<Bytes> {
        self.get_at(key, self.clock.now_ms())
    }

    /// Snapshot read at logical time `ts`.
    ///
    /// Scans the chain from the newest version backwards for the first
    /// write at or before `ts`; the candidate is invisible if its own
    /// recorded expiry had passed at `ts`. Readers never remove data,
    /// expired chains are reclaimed only by the expirer.
    pub fn get_at(&self, key: &Bytes, ts: i64) -> Option<Bytes> {
        let chain = {
            let chains = self.shard(key).chains.read().unwrap();
            Arc::clone(chains.get(key)?)
        };

        let versions = chain.read().unwrap();
        for version in versions.iter().rev() {
            if version.write_ts <= ts {
                if version.expiry_ts > 0 && ts >= version.expiry_ts {
                    return None;
                }
                return Some(version.data.clone());
            }
        }

        None
    }

    /// Removes the whole chain and its TTL entry. Returns whether the
    /// key existed.
    pub fn delete(&self, key: &Bytes) -> bool {
        let shard = self.shard(key);
        let mut chains = shard.chains.write().unwrap();

        if chains.remove(key).is_some() {
            self.ttl.remove(key);
            true
        } else {
            false
        }
    }

    /// Sets the newest version's expiry to `now + ttl_ms` and refreshes
    /// the TTL index. Returns whether the update was applied.
    pub fn expire(&self, key: &Bytes, ttl_ms: i64) -> bool {
        let shard = self.shard(key);
        let chains = shard.chains.write().unwrap();

        let Some(chain) = chains.get(key) else {
            return false;
        };

        let expiration = self.clock.now_ms() + ttl_ms;
        {
            let mut versions = chain.write().unwrap();
            let Some(tail) = versions.last_mut() else {
                return false;
            };
            tail.expiry_ts = expiration;
        }

        self.ttl.add(key.clone(), expiration);
        true
    }

    /// Remaining lifetime in milliseconds.
    ///
    /// [`TTL_MISSING`] for an absent or already-expired key,
    /// [`TTL_NO_EXPIRY`] for a key without expiration, otherwise the
    /// positive remainder.
    pub fn ttl(&self, key: &Bytes) -> i64 {
        let chain = {
            let chains = self.shard(key).chains.read().unwrap();
            match chains.get(key) {
                Some(chain) => Arc::clone(chain),
                None => return TTL_MISSING,
            }
        };

        let versions = chain.read().unwrap();
        let Some(tail) = versions.last() else {
            return TTL_MISSING;
        };

        if tail.expiry_ts == 0 {
            return TTL_NO_EXPIRY;
        }

        let now = self.clock.now_ms();
        if now >= tail.expiry_ts {
            return TTL_MISSING;
        }

        tail.expiry_ts - now
    }

    /// Returns a copy of the key's versions, newest first. `limit == 0`
    /// means no limit. Empty for a missing key.
    pub fn history(&self, key: &Bytes, limit: usize) -> Vec<Version> {
        let chain = {
            let chains = self.shard(key).chains.read().unwrap();
            match chains.get(key) {
                Some(chain) => Arc::clone(chain),
                None => return Vec::new(),
            }
        };

        let mut versions = chain.read().unwrap().clone();
        versions.sort_by(|a, b| b.write_ts.cmp(&a.write_ts));

        if limit > 0 && limit < versions.len() {
            versions.truncate(limit);
        }

        versions
    }

    /// Per-shard snapshot of key and version counts.
    pub fn stats(&self) -> StoreStats {
        let mut total_keys = 0;
        let mut total_versions = 0;

        for shard in &self.shards {
            let chains = shard.chains.read().unwrap();
            total_keys += chains.len();
            for chain in chains.values() {
                total_versions += chain.read().unwrap().len();
            }
        }

        StoreStats {
            total_keys,
            total_versions,
            shard_count: SHARD_COUNT,
        }
    }

    /// One expirer pass: drains due keys from the TTL index and removes
    /// those whose tail is still expired.
    ///
    /// A `set` or `expire` may supplant the tail between the drain
    /// snapshot and the shard lock here; such keys are left in place,
    /// and any future deadline they carry is already back in the index.
    ///
    /// Returns the number of keys removed.
    pub(crate) fn remove_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let due = self.ttl.drain_expired(now);
        let mut removed = 0;

        for key in due {
            let shard = self.shard(&key);
            let mut chains = shard.chains.write().unwrap();

            let still_due = chains.get(&key).is_some_and(|chain| {
                chain
                    .read()
                    .unwrap()
                    .last()
                    .is_some_and(|tail| tail.expiry_ts > 0 && now >= tail.expiry_ts)
            });

            if still_due {
                chains.remove(&key);
                removed += 1;
            }
        }

        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::clock::ManualClock;

    fn store_at(start_ms: i64) -> (VersionedStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start_ms));
        let store = VersionedStore::with_clock(Arc::clone(&clock) as Arc<dyn Clock>);
        (store, clock)
    }

    fn key(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[test]
    fn set_and_get() {
        let (store, _) = store_at(1_000);
        store.set(key("k"), Bytes::from("v"), 0);
        assert_eq!(store.get(&key("k")), Some(Bytes::from("v")));
        assert_eq!(store.get(&key("missing")), None);
    }

    #[test]
    fn delete_removes_key() {
        let (store, _) = store_at(1_000);
        store.set(key("k"), Bytes::from("v"), 0);

        assert!(store.delete(&key("k")));
        assert_eq!(store.get(&key("k")), None);
        assert!(!store.delete(&key("k")));
    }

    #[test]
    fn retention_bound() {
        let (store, clock) = store_at(1_000);

        for i in 1..=15 {
            store.set(key("k"), Bytes::from(format!("v{}", i)), 0);
            clock.advance(1);
        }

        let history = store.history(&key("k"), 0);
        assert_eq!(history.len(), MAX_VERSIONS);

        // Newest first: v15 down to v6.
        for (i, version) in history.iter().enumerate() {
            assert_eq!(version.data, Bytes::from(format!("v{}", 15 - i)));
        }
    }

    #[test]
    fn history_is_newest_first_and_non_increasing() {
        let (store, clock) = store_at(1_000);
        for i in 0..5 {
            store.set(key("k"), Bytes::from(format!("v{}", i)), 0);
            clock.advance(7);
        }

        let history = store.history(&key("k"), 0);
        assert_eq!(history.len(), 5);
        for pair in history.windows(2) {
            assert!(pair[0].write_ts >= pair[1].write_ts);
        }
        assert_eq!(history[0].data, Bytes::from("v4"));
    }

    #[test]
    fn history_limit() {
        let (store, clock) = store_at(1_000);
        for i in 0..5 {
            store.set(key("k"), Bytes::from(format!("v{}", i)), 0);
            clock.advance(1);
        }

        assert_eq!(store.history(&key("k"), 2).len(), 2);
        assert_eq!(store.history(&key("k"), 0).len(), 5);
        assert_eq!(store.history(&key("k"), 99).len(), 5);
        assert!(store.history(&key("missing"), 0).is_empty());
    }

    #[test]
    fn mvcc_snapshot_reads() {
        let (store, clock) = store_at(1_000);

        store.set(key("k"), Bytes::from("v1"), 0); // ts 1000
        clock.advance(10);
        store.set(key("k"), Bytes::from("v2"), 0); // ts 1010
        clock.advance(10);
        store.set(key("k"), Bytes::from("v3"), 0); // ts 1020

        assert_eq!(store.get(&key("k")), Some(Bytes::from("v3")));
        assert_eq!(store.get_at(&key("k"), 1_020), Some(Bytes::from("v3")));
        assert_eq!(store.get_at(&key("k"), 1_019), Some(Bytes::from("v2")));
        assert_eq!(store.get_at(&key("k"), 1_010), Some(Bytes::from("v2")));
        assert_eq!(store.get_at(&key("k"), 1_009), Some(Bytes::from("v1")));
        assert_eq!(store.get_at(&key("k"), 1_000), Some(Bytes::from("v1")));
        assert_eq!(store.get_at(&key("k"), 999), None);
    }

    #[test]
    fn get_at_respects_recorded_expiry() {
        let (store, clock) = store_at(1_000);

        store.set(key("k"), Bytes::from("v"), 100); // expires at 1100
        assert_eq!(store.get_at(&key("k"), 1_050), Some(Bytes::from("v")));
        assert_eq!(store.get_at(&key("k"), 1_100), None);
        assert_eq!(store.get_at(&key("k"), 2_000), None);

        // Readers never reclaim; the chain survives until swept.
        clock.set(2_000);
        assert_eq!(store.get(&key("k")), None);
        assert_eq!(store.history(&key("k"), 0).len(), 1);
    }

    #[test]
    fn ttl_sentinels() {
        let (store, clock) = store_at(1_000);

        assert_eq!(store.ttl(&key("missing")), TTL_MISSING);

        store.set(key("forever"), Bytes::from("v"), 0);
        assert_eq!(store.ttl(&key("forever")), TTL_NO_EXPIRY);

        store.set(key("short"), Bytes::from("v"), 500);
        let remaining = store.ttl(&key("short"));
        assert!(remaining > 0 && remaining <= 500);

        clock.advance(500);
        assert_eq!(store.ttl(&key("short")), TTL_MISSING);
    }

    #[test]
    fn expire_updates_tail_and_index() {
        let (store, clock) = store_at(1_000);

        assert!(!store.expire(&key("missing"), 100));

        store.set(key("k"), Bytes::from("v"), 0);
        assert_eq!(store.ttl(&key("k")), TTL_NO_EXPIRY);

        assert!(store.expire(&key("k"), 100));
        assert_eq!(store.ttl(&key("k")), 100);

        clock.advance(100);
        assert_eq!(store.remove_expired(), 1);
        assert_eq!(store.get(&key("k")), None);
    }

    #[test]
    fn zero_ttl_set_clears_prior_deadline() {
        let (store, clock) = store_at(1_000);

        store.set(key("k"), Bytes::from("v1"), 100);
        clock.advance(1);
        store.set(key("k"), Bytes::from("v2"), 0);

        clock.advance(500);
        assert_eq!(store.remove_expired(), 0);
        assert_eq!(store.get(&key("k")), Some(Bytes::from("v2")));
        assert_eq!(store.ttl(&key("k")), TTL_NO_EXPIRY);
    }

    #[test]
    fn version_expiry_comes_from_current_set_alone() {
        let (store, clock) = store_at(1_000);

        store.set(key("k"), Bytes::from("v1"), 100); // expiry 1100
        clock.advance(1);
        store.set(key("k"), Bytes::from("v2"), 0); // no expiry

        let history = store.history(&key("k"), 0);
        assert_eq!(history[0].expiry_ts, 0);
        assert_eq!(history[1].expiry_ts, 1_100);
    }

    #[test]
    fn remove_expired_sweeps_due_keys() {
        let (store, clock) = store_at(1_000);

        store.set(key("soon"), Bytes::from("v"), 100);
        store.set(key("later"), Bytes::from("v"), 5_000);
        store.set(key("forever"), Bytes::from("v"), 0);

        clock.advance(100);
        assert_eq!(store.remove_expired(), 1);

        assert_eq!(store.get(&key("soon")), None);
        assert_eq!(store.get(&key("later")), Some(Bytes::from("v")));
        assert_eq!(store.get(&key("forever")), Some(Bytes::from("v")));
        assert_eq!(store.stats().total_keys, 2);
    }

    #[test]
    fn remove_expired_leaves_supplanted_tails() {
        let (store, _) = store_at(1_000);

        // Stale index entry for a key whose tail no longer expires,
        // as if a write landed between the drain snapshot and the sweep.
        store.set(key("k"), Bytes::from("v"), 0);
        store.ttl.add(key("k"), 500);

        assert_eq!(store.remove_expired(), 0);
        assert_eq!(store.get(&key("k")), Some(Bytes::from("v")));
    }

    #[test]
    fn remove_expired_tolerates_vanished_keys() {
        let (store, _) = store_at(1_000);
        store.ttl.add(key("gone"), 500);
        assert_eq!(store.remove_expired(), 0);
    }

    #[test]
    fn stats_counts_keys_and_versions() {
        let (store, clock) = store_at(1_000);

        store.set(key("a"), Bytes::from("v1"), 0);
        clock.advance(1);
        store.set(key("a"), Bytes::from("v2"), 0);
        store.set(key("b"), Bytes::from("v"), 0);

        let stats = store.stats();
        assert_eq!(stats.total_keys, 2);
        assert_eq!(stats.total_versions, 3);
        assert_eq!(stats.shard_count, SHARD_COUNT);
    }

    #[test]
    fn shard_hashing_is_deterministic_and_in_range() {
        for key in ["a", "b", "user:1001", "session:abcdef", ""] {
            let first = VersionedStore::shard_index(key.as_bytes());
            assert!(first < SHARD_COUNT);
            for _ in 0..10 {
                assert_eq!(VersionedStore::shard_index(key.as_bytes()), first);
            }
        }
    }

    #[test]
    fn concurrent_writers_and_readers() {
        use std::thread;

        let store = Arc::new(VersionedStore::new());
        let mut handles = Vec::new();

        for t in 0..10 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                for i in 0..100 {
                    let k = Bytes::from(format!("key-{}-{}", t, i));
                    store.set(k.clone(), Bytes::from("value"), 0);
                    assert_eq!(store.get(&k), Some(Bytes::from("value")));
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.stats().total_keys, 1_000);
    }
}
