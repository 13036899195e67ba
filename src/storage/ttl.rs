//! Expiry index: key to latest expiration timestamp.
//!
//! The index drives the background expirer; it is not consulted to
//! answer reads (the version chain is authoritative there). A key is
//! present only while its latest version carries a non-zero expiry that
//! has not yet been swept.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Mutex;

/// Map from key to the expiration timestamp of its newest version.
///
/// All operations are infallible and serialized through one mutex,
/// which is never held across any other lock acquisition.
#[derive(Debug, Default)]
pub struct TtlIndex {
    entries: Mutex<HashMap<Bytes, i64>>,
}

impl TtlIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `expiry_ts` for `key`, overwriting any previous entry.
    pub fn add(&self, key: Bytes, expiry_ts: i64) {
        self.entries.lock().unwrap().insert(key, expiry_ts);
    }

    /// Drops the entry for `key`. Silent if absent.
    pub fn remove(&self, key: &Bytes) {
        self.entries.lock().unwrap().remove(key);
    }

    /// Atomically returns and removes every key whose expiry is at or
    /// before `now`. Entries added concurrently may or may not appear.
    pub fn drain_expired(&self, now: i64) -> Vec<Bytes> {
        let mut entries = self.entries.lock().unwrap();
        let expired: Vec<Bytes> = entries
            .iter()
            .filter(|(_, &expiry)| now >= expiry)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.remove(key);
        }
        expired
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_overwrites() {
        let index = TtlIndex::new();
        index.add(Bytes::from("k"), 100);
        index.add(Bytes::from("k"), 200);
        assert_eq!(index.len(), 1);

        // Old deadline no longer fires.
        assert!(index.drain_expired(150).is_empty());
        assert_eq!(index.drain_expired(200), vec![Bytes::from("k")]);
    }

    #[test]
    fn remove_is_silent_on_absence() {
        let index = TtlIndex::new();
        index.remove(&Bytes::from("missing"));
        index.add(Bytes::from("k"), 100);
        index.remove(&Bytes::from("k"));
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn drain_returns_only_due_keys() {
        let index = TtlIndex::new();
        index.add(Bytes::from("soon"), 100);
        index.add(Bytes::from("later"), 500);

        let drained = index.drain_expired(250);
        assert_eq!(drained, vec![Bytes::from("soon")]);
        assert_eq!(index.len(), 1);

        // Drained keys are gone for good.
        assert!(index.drain_expired(250).is_empty());
        assert_eq!(index.drain_expired(500), vec![Bytes::from("later")]);
    }
}
