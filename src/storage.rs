use crate::clock;
use crate::types::{Key, Value};
use dashmap::DashMap;

struct Record {
    value: Value,
    /// Wall-clock time at which the value was last committed. Only the
    /// optimistic schedulers consult this.
    last_write: f64,
}

/// Single-version key/value storage with a last-write timestamp per key.
///
/// The map is sharded so worker read phases can run concurrently with the
/// scheduler; writes are confined to whichever thread the active
/// discipline designates (the scheduler for serial/locking/OCC, the
/// validating worker for parallel OCC).
pub struct Storage {
    data: DashMap<Key, Record>,
}

impl Storage {
    pub fn new() -> Self {
        Storage {
            data: DashMap::new(),
        }
    }

    /// Seeds keys `0..n` with value 0, like a freshly loaded database.
    pub fn with_records(n: u64) -> Self {
        let storage = Storage::new();
        for key in 0..n {
            storage.write(key, 0);
        }
        storage
    }

    pub fn read(&self, key: Key) -> Option<Value> {
        self.data.get(&key).map(|r| r.value)
    }

    /// Writes a value, stamping the key's last-write timestamp.
    pub fn write(&self, key: Key, value: Value) {
        self.data.insert(
            key,
            Record {
                value,
                last_write: clock::now(),
            },
        );
    }

    /// Last-write timestamp for a key, 0.0 if the key has never been
    /// written.
    pub fn timestamp(&self, key: Key) -> f64 {
        self.data.get(&key).map(|r| r.last_write).unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for Storage {
    fn default() -> Self {
        Storage::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_reads_none_with_zero_timestamp() {
        let storage = Storage::new();
        assert_eq!(storage.read(42), None);
        assert_eq!(storage.timestamp(42), 0.0);
    }

    #[test]
    fn write_updates_value_and_timestamp() {
        let storage = Storage::new();
        storage.write(7, 13);
        let first = storage.timestamp(7);
        assert_eq!(storage.read(7), Some(13));
        assert!(first > 0.0);

        storage.write(7, 14);
        assert_eq!(storage.read(7), Some(14));
        assert!(storage.timestamp(7) >= first);
    }

    #[test]
    fn seeded_storage_holds_zeroes() {
        let storage = Storage::with_records(100);
        assert_eq!(storage.len(), 100);
        assert_eq!(storage.read(0), Some(0));
        assert_eq!(storage.read(99), Some(0));
        assert_eq!(storage.read(100), None);
    }
}
