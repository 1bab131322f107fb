use crate::types::{Key, TxnId, Value};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// One committed version of a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub value: Value,
    /// Id of the transaction that wrote this version.
    pub version_id: TxnId,
    /// Highest reader id that has observed this version.
    pub max_read_id: TxnId,
}

/// Ordered sequence of versions for one key, newest first.
///
/// Every access happens under the key's mutex; the chain itself is a plain
/// value type. Invariants: at most one version per `version_id`, ordering
/// is strictly descending by `version_id`, and the chain is never emptied
/// after initialization (compaction always retains a visible version).
#[derive(Debug, Default)]
pub struct VersionChain {
    versions: VecDeque<Version>,
}

impl VersionChain {
    /// Returns the value of the version with the greatest `version_id` not
    /// exceeding `reader`, bumping that version's `max_read_id` to `reader`
    /// if it is higher. `None` if no such version exists.
    pub fn read(&mut self, reader: TxnId) -> Option<Value> {
        for version in self.versions.iter_mut() {
            if version.version_id <= reader {
                if reader > version.max_read_id {
                    version.max_read_id = reader;
                }
                return Some(version.value);
            }
        }
        None
    }

    /// Timestamp-ordering write check: a writer is admissible iff no
    /// version on this chain has been observed by a reader younger than
    /// the writer. Trivially true for an empty chain.
    pub fn check_write(&self, writer: TxnId) -> bool {
        self.versions.iter().all(|v| v.max_read_id <= writer)
    }

    /// Inserts a new version written by `writer`, keeping the chain sorted
    /// by descending `version_id`. Call only after `check_write` passed.
    pub fn write(&mut self, value: Value, writer: TxnId) {
        let version = Version {
            value,
            version_id: writer,
            max_read_id: 0,
        };
        let at = self
            .versions
            .iter()
            .position(|v| v.version_id <= writer)
            .unwrap_or(self.versions.len());
        self.versions.insert(at, version);
    }

    /// Drops every version older than the newest one visible at `horizon`.
    ///
    /// Sound only if no live or future transaction has an id at or below
    /// `horizon`; ids are monotone, so the caller can pass the highest id
    /// the engine has assigned once it is quiescent.
    pub fn compact(&mut self, horizon: TxnId) {
        if let Some(at) = self.versions.iter().position(|v| v.version_id <= horizon) {
            self.versions.truncate(at + 1);
        }
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn versions(&self) -> impl Iterator<Item = &Version> {
        self.versions.iter()
    }
}

/// Multi-version storage: one version chain and one sleep lock per key.
///
/// The chain mutex is handed out as an `Arc` clone so callers never hold a
/// map shard while sleeping on a key lock, and can hold several key locks
/// at once during the MVCC write phase.
pub struct MvccStorage {
    chains: DashMap<Key, Arc<Mutex<VersionChain>>>,
}

impl MvccStorage {
    pub fn new() -> Self {
        MvccStorage {
            chains: DashMap::new(),
        }
    }

    /// Seeds keys `0..n` with value 0 written at version 0.
    pub fn with_records(n: u64) -> Self {
        let storage = MvccStorage::new();
        for key in 0..n {
            storage
                .chain(key)
                .lock()
                .expect("Can't handle poisoned locks!")
                .write(0, 0);
        }
        storage
    }

    /// The chain (and its lock) for a key, created empty on first touch.
    pub fn chain(&self, key: Key) -> Arc<Mutex<VersionChain>> {
        self.chains.entry(key).or_default().clone()
    }

    /// Convenience read: locks the key, reads, bumps `max_read_id`.
    pub fn read(&self, key: Key, reader: TxnId) -> Option<Value> {
        self.chain(key)
            .lock()
            .expect("Can't handle poisoned locks!")
            .read(reader)
    }

    /// Runs the compaction pass of [`VersionChain::compact`] over every
    /// chain. Same soundness requirement on `horizon`.
    pub fn compact(&self, horizon: TxnId) {
        for entry in self.chains.iter() {
            entry
                .value()
                .lock()
                .expect("Can't handle poisoned locks!")
                .compact(horizon);
        }
    }

    pub fn key_count(&self) -> usize {
        self.chains.len()
    }
}

impl Default for MvccStorage {
    fn default() -> Self {
        MvccStorage::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_picks_newest_version_at_or_below_reader() {
        let mut chain = VersionChain::default();
        chain.write(10, 1);
        chain.write(20, 5);
        chain.write(30, 9);

        assert_eq!(chain.read(0), None);
        assert_eq!(chain.read(1), Some(10));
        assert_eq!(chain.read(7), Some(20));
        assert_eq!(chain.read(9), Some(30));
        assert_eq!(chain.read(100), Some(30));
    }

    #[test]
    fn read_bumps_max_read_id_monotonically() {
        let mut chain = VersionChain::default();
        chain.write(10, 1);
        chain.read(8);
        chain.read(3);
        let version = chain.versions().next().unwrap();
        assert_eq!(version.max_read_id, 8);
    }

    #[test]
    fn check_write_rejects_writer_older_than_observed_reader() {
        let mut chain = VersionChain::default();
        chain.write(10, 1);
        chain.read(8);
        assert!(!chain.check_write(5));
        assert!(chain.check_write(8));
        assert!(chain.check_write(9));
    }

    #[test]
    fn check_write_scans_the_whole_chain() {
        let mut chain = VersionChain::default();
        chain.write(10, 1);
        chain.read(4);
        chain.write(20, 6);
        // The older version was observed by reader 4; a writer with id 3
        // must be rejected even though the newest version is unread.
        assert!(!chain.check_write(3));
        assert!(chain.check_write(6));
    }

    #[test]
    fn check_write_allows_empty_chain() {
        let chain = VersionChain::default();
        assert!(chain.check_write(1));
    }

    #[test]
    fn writes_keep_descending_order() {
        let mut chain = VersionChain::default();
        chain.write(10, 2);
        chain.write(20, 8);
        chain.write(30, 5);
        let ids: Vec<TxnId> = chain.versions().map(|v| v.version_id).collect();
        assert_eq!(ids, vec![8, 5, 2]);
    }

    #[test]
    fn compact_keeps_the_visible_version() {
        let mut chain = VersionChain::default();
        chain.write(10, 1);
        chain.write(20, 5);
        chain.write(30, 9);

        chain.compact(6);
        let ids: Vec<TxnId> = chain.versions().map(|v| v.version_id).collect();
        assert_eq!(ids, vec![9, 5]);
        assert_eq!(chain.read(6), Some(20));

        chain.compact(100);
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.read(100), Some(30));
    }

    #[test]
    fn storage_seeds_version_zero() {
        let storage = MvccStorage::with_records(10);
        assert_eq!(storage.key_count(), 10);
        assert_eq!(storage.read(3, 1), Some(0));
        assert_eq!(storage.read(10, 1), None);
    }

    #[test]
    fn storage_read_tracks_reader_across_locks() {
        let storage = MvccStorage::with_records(1);
        storage.read(0, 9);
        let chain = storage.chain(0);
        let guard = chain.lock().unwrap();
        assert!(!guard.check_write(5));
    }
}
