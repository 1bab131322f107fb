//! Transaction programs submitted by the test and benchmark harnesses.

use crate::clock;
use crate::transaction::{Decision, Program, Txn};
use crate::types::{Key, Value};
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};

/// Immediately commits without touching any key.
pub struct Noop;

impl Noop {
    pub fn txn() -> Txn {
        Txn::new(Noop, BTreeSet::new(), BTreeSet::new())
    }
}

impl Program for Noop {
    fn run(&self, _txn: &mut Txn) -> Decision {
        Decision::Commit
    }
}

/// Writes every pair in the map, then commits.
pub struct Put {
    pairs: BTreeMap<Key, Value>,
}

impl Put {
    pub fn txn(pairs: BTreeMap<Key, Value>) -> Txn {
        let write_set = pairs.keys().copied().collect();
        Txn::new(Put { pairs }, BTreeSet::new(), write_set)
    }
}

impl Program for Put {
    fn run(&self, txn: &mut Txn) -> Decision {
        for (&key, &value) in &self.pairs {
            txn.write(key, value);
        }
        Decision::Commit
    }
}

/// Reads every key in the map; commits iff every observed value matches,
/// aborts otherwise.
pub struct Expect {
    pairs: BTreeMap<Key, Value>,
}

impl Expect {
    pub fn txn(pairs: BTreeMap<Key, Value>) -> Txn {
        let read_set = pairs.keys().copied().collect();
        Txn::new(Expect { pairs }, read_set, BTreeSet::new())
    }
}

impl Program for Expect {
    fn run(&self, txn: &mut Txn) -> Decision {
        for (&key, &value) in &self.pairs {
            match txn.read(key) {
                Some(observed) if observed == value => {}
                _ => return Decision::Abort,
            }
        }
        Decision::Commit
    }
}

/// Read-modify-write: reads its whole read set, increments every write-set
/// key, then spins for `duration` seconds to simulate transaction logic.
pub struct Rmw {
    duration: f64,
}

impl Rmw {
    pub fn txn(read_set: BTreeSet<Key>, write_set: BTreeSet<Key>, duration: f64) -> Txn {
        Txn::new(Rmw { duration }, read_set, write_set)
    }

    /// Randomized disjoint read/write sets drawn uniformly from
    /// `0..db_size`.
    pub fn random(db_size: u64, read_keys: usize, write_keys: usize, duration: f64) -> Txn {
        assert!(
            db_size as usize >= read_keys + write_keys,
            "database too small for the requested key sets"
        );
        let mut rng = rand::thread_rng();
        let mut read_set = BTreeSet::new();
        while read_set.len() < read_keys {
            read_set.insert(rng.gen_range(0..db_size));
        }
        let mut write_set = BTreeSet::new();
        while write_set.len() < write_keys {
            let key = rng.gen_range(0..db_size);
            if !read_set.contains(&key) {
                write_set.insert(key);
            }
        }
        Rmw::txn(read_set, write_set, duration)
    }
}

impl Program for Rmw {
    fn run(&self, txn: &mut Txn) -> Decision {
        for &key in txn.read_set() {
            txn.read(key);
        }

        let write_keys: Vec<Key> = txn.write_set().iter().copied().collect();
        for key in write_keys {
            let value = txn.read(key).unwrap_or(0);
            txn.write(key, value + 1);
        }

        if self.duration > 0.0 {
            let begin = clock::now();
            while clock::now() - begin < self.duration {
                std::hint::spin_loop();
            }
        }
        Decision::Commit
    }
}

/// Source of transactions for a benchmark run.
pub trait LoadGen: Send {
    fn next_txn(&mut self) -> Txn;
}

/// Uniform RMW transactions with fixed set sizes.
pub struct RmwLoadGen {
    db_size: u64,
    read_keys: usize,
    write_keys: usize,
    duration: f64,
}

impl RmwLoadGen {
    pub fn new(db_size: u64, read_keys: usize, write_keys: usize, duration: f64) -> Self {
        RmwLoadGen {
            db_size,
            read_keys,
            write_keys,
            duration,
        }
    }
}

impl LoadGen for RmwLoadGen {
    fn next_txn(&mut self) -> Txn {
        Rmw::random(self.db_size, self.read_keys, self.write_keys, self.duration)
    }
}

/// Mixed load: 80% of transactions are read-only and run for the full
/// duration, the rest are fast high-contention updates.
pub struct RmwLoadGen2 {
    db_size: u64,
    read_keys: usize,
    write_keys: usize,
    duration: f64,
}

impl RmwLoadGen2 {
    pub fn new(db_size: u64, read_keys: usize, write_keys: usize, duration: f64) -> Self {
        RmwLoadGen2 {
            db_size,
            read_keys,
            write_keys,
            duration,
        }
    }
}

impl LoadGen for RmwLoadGen2 {
    fn next_txn(&mut self) -> Txn {
        if rand::thread_rng().gen_range(0..100) < 80 {
            Rmw::random(self.db_size, self.read_keys, 0, self.duration)
        } else {
            Rmw::random(self.db_size, 0, self.write_keys, 0.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TxnStatus;

    #[test]
    fn put_declares_its_write_set() {
        let txn = Put::txn(BTreeMap::from([(1, 10), (2, 20)]));
        assert!(txn.read_set().is_empty());
        assert_eq!(txn.write_set().len(), 2);
    }

    #[test]
    fn expect_aborts_on_mismatch() {
        let mut txn = Expect::txn(BTreeMap::from([(1, 10)]));
        txn.buffer_read(1, 11);
        txn.run();
        assert_eq!(txn.status(), TxnStatus::CompletedAbort);
    }

    #[test]
    fn expect_aborts_on_missing_record() {
        let mut txn = Expect::txn(BTreeMap::from([(1, 10)]));
        txn.run();
        assert_eq!(txn.status(), TxnStatus::CompletedAbort);
    }

    #[test]
    fn expect_commits_on_match() {
        let mut txn = Expect::txn(BTreeMap::from([(1, 10)]));
        txn.buffer_read(1, 10);
        txn.run();
        assert_eq!(txn.status(), TxnStatus::CompletedCommit);
    }

    #[test]
    fn rmw_increments_observed_values() {
        let mut txn = Rmw::txn(BTreeSet::from([1]), BTreeSet::from([2, 3]), 0.0);
        txn.buffer_read(1, 5);
        txn.buffer_read(2, 7);
        txn.run();
        assert_eq!(txn.status(), TxnStatus::CompletedCommit);
        assert_eq!(txn.writes().get(&2), Some(&8));
        // Key 3 was absent from storage, so the increment starts at zero.
        assert_eq!(txn.writes().get(&3), Some(&1));
    }

    #[test]
    fn random_rmw_sets_are_disjoint_and_sized() {
        for _ in 0..20 {
            let txn = Rmw::random(100, 5, 5, 0.0);
            assert_eq!(txn.read_set().len(), 5);
            assert_eq!(txn.write_set().len(), 5);
            assert!(txn.read_set().is_disjoint(txn.write_set()));
        }
    }
}
