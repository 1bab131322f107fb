use crate::types::{Key, TxnId, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// All possible statuses for a transaction.
///
/// Program logic only ever moves a transaction from `Incomplete` to one of
/// the `Completed*` votes; the scheduler alone decides the terminal
/// `Committed`/`Aborted` outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnStatus {
    /// Not yet executed (also the state a restarted transaction returns to).
    Incomplete,
    /// Executed, program voted commit.
    CompletedCommit,
    /// Executed, program voted abort.
    CompletedAbort,
    /// Committed by the scheduler. Terminal.
    Committed,
    /// Aborted by the scheduler. Terminal.
    Aborted,
}

/// Sentinel returned by program logic to end its execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Commit,
    Abort,
}

/// A transaction's program logic.
///
/// Inside `run`, use only [`Txn::read`] over the declared read/write sets
/// and [`Txn::write`] over the declared write set, and finish by returning
/// a [`Decision`]. The engine may invoke `run` again from scratch after a
/// restart, so the logic must not carry state across invocations.
pub trait Program: Send + Sync {
    fn run(&self, txn: &mut Txn) -> Decision;
}

/// A transaction: declared key sets, buffered reads/writes, status and the
/// program logic that drives it.
///
/// The read and write sets are fixed at construction; they determine what
/// the runtime locks and validates. Ids are assigned by the engine on
/// admission and re-assigned (strictly larger) on every restart.
pub struct Txn {
    id: TxnId,
    read_set: BTreeSet<Key>,
    write_set: BTreeSet<Key>,
    reads: HashMap<Key, Value>,
    writes: BTreeMap<Key, Value>,
    status: TxnStatus,
    start_time: f64,
    restarts: u64,
    program: Arc<dyn Program>,
}

impl Txn {
    /// Builds a transaction over the given program and key sets.
    ///
    /// # Panics
    ///
    /// Panics if the read and write sets overlap. A key that is both read
    /// and written belongs in the write set only; its value is still
    /// readable during execution.
    pub fn new(
        program: impl Program + 'static,
        read_set: BTreeSet<Key>,
        write_set: BTreeSet<Key>,
    ) -> Self {
        for key in &write_set {
            if read_set.contains(key) {
                panic!("overlapping read/write sets (key {key})");
            }
        }
        Txn {
            id: 0,
            read_set,
            write_set,
            reads: HashMap::new(),
            writes: BTreeMap::new(),
            status: TxnStatus::Incomplete,
            start_time: 0.0,
            restarts: 0,
            program: Arc::new(program),
        }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn status(&self) -> TxnStatus {
        self.status
    }

    pub fn read_set(&self) -> &BTreeSet<Key> {
        &self.read_set
    }

    pub fn write_set(&self) -> &BTreeSet<Key> {
        &self.write_set
    }

    /// Values observed during the read phase (and values buffered by
    /// [`Txn::write`], which are re-readable).
    pub fn reads(&self) -> &HashMap<Key, Value> {
        &self.reads
    }

    /// Key/value pairs buffered for commit.
    pub fn writes(&self) -> &BTreeMap<Key, Value> {
        &self.writes
    }

    /// How many times this transaction has been restarted.
    pub fn restarts(&self) -> u64 {
        self.restarts
    }

    /// Wall-clock time at which the current read phase began.
    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    /// Reads a key from the transaction's buffered read results. Returns
    /// `None` if the record does not exist in storage.
    ///
    /// # Panics
    ///
    /// Panics if `key` is in neither the read set nor the write set.
    pub fn read(&self, key: Key) -> Option<Value> {
        if !self.read_set.contains(&key) && !self.write_set.contains(&key) {
            panic!("invalid read of key {key} (not in readset or writeset)");
        }
        // Reads have no effect once the program has voted.
        if self.status != TxnStatus::Incomplete {
            return None;
        }
        self.reads.get(&key).copied()
    }

    /// Buffers a write. The value is also mirrored into the read results so
    /// program logic re-reading the key observes it.
    ///
    /// # Panics
    ///
    /// Panics if `key` is not in the write set.
    pub fn write(&mut self, key: Key, value: Value) {
        if !self.write_set.contains(&key) {
            panic!("invalid write to key {key} (not in writeset)");
        }
        // Writes have no effect once the program has voted.
        if self.status != TxnStatus::Incomplete {
            return;
        }
        self.writes.insert(key, value);
        self.reads.insert(key, value);
    }

    /// Runs the program logic and records its commit/abort vote.
    pub(crate) fn run(&mut self) {
        let program = Arc::clone(&self.program);
        self.status = match program.run(self) {
            Decision::Commit => TxnStatus::CompletedCommit,
            Decision::Abort => TxnStatus::CompletedAbort,
        };
    }

    /// Resets execution state ahead of a restart. The engine assigns a
    /// fresh (strictly larger) id separately.
    pub(crate) fn clear_for_restart(&mut self) {
        self.reads.clear();
        self.writes.clear();
        self.status = TxnStatus::Incomplete;
        self.restarts += 1;
    }

    pub(crate) fn set_id(&mut self, id: TxnId) {
        self.id = id;
    }

    pub(crate) fn set_status(&mut self, status: TxnStatus) {
        self.status = status;
    }

    pub(crate) fn stamp_start_time(&mut self, at: f64) {
        self.start_time = at;
    }

    pub(crate) fn buffer_read(&mut self, key: Key, value: Value) {
        self.reads.insert(key, value);
    }
}

impl std::fmt::Debug for Txn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Txn")
            .field("id", &self.id)
            .field("status", &self.status)
            .field("read_set", &self.read_set)
            .field("write_set", &self.write_set)
            .field("restarts", &self.restarts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl Program for Echo {
        fn run(&self, txn: &mut Txn) -> Decision {
            let v = txn.read(1).unwrap_or(0);
            txn.write(2, v + 10);
            Decision::Commit
        }
    }

    fn keys(ks: &[Key]) -> BTreeSet<Key> {
        ks.iter().copied().collect()
    }

    #[test]
    fn run_records_commit_vote() {
        let mut txn = Txn::new(Echo, keys(&[1]), keys(&[2]));
        txn.buffer_read(1, 7);
        txn.run();
        assert_eq!(txn.status(), TxnStatus::CompletedCommit);
        assert_eq!(txn.writes().get(&2), Some(&17));
        // Buffered writes are re-readable.
        assert_eq!(txn.reads().get(&2), Some(&17));
    }

    #[test]
    fn restart_clears_execution_state() {
        let mut txn = Txn::new(Echo, keys(&[1]), keys(&[2]));
        txn.buffer_read(1, 7);
        txn.run();
        txn.clear_for_restart();
        assert_eq!(txn.status(), TxnStatus::Incomplete);
        assert!(txn.reads().is_empty());
        assert!(txn.writes().is_empty());
        assert_eq!(txn.restarts(), 1);
    }

    #[test]
    fn writes_ignored_after_vote() {
        let mut txn = Txn::new(Echo, keys(&[1]), keys(&[2]));
        txn.set_status(TxnStatus::CompletedAbort);
        txn.write(2, 99);
        assert!(txn.writes().is_empty());
        assert_eq!(txn.read(1), None);
    }

    #[test]
    #[should_panic(expected = "overlapping read/write sets")]
    fn overlapping_sets_rejected() {
        let _ = Txn::new(Echo, keys(&[1, 2]), keys(&[2]));
    }

    #[test]
    #[should_panic(expected = "not in writeset")]
    fn write_outside_writeset_rejected() {
        let mut txn = Txn::new(Echo, keys(&[1]), keys(&[2]));
        txn.write(1, 0);
    }
}
