//! The transaction processor: a single long-running scheduler thread
//! driving one of six concurrency-control disciplines over a shared
//! worker pool.

mod locking;
mod mvcc;
mod occ;
mod pocc;
mod serial;

use crate::clock;
use crate::error::EngineError;
use crate::lock_manager::{LockManagerA, LockManagerB};
use crate::mvcc_storage::MvccStorage;
use crate::storage::Storage;
use crate::thread_pool::StaticThreadPool;
use crate::transaction::{Txn, TxnStatus};
use crate::types::{CcMode, Key};
use crossbeam_channel::{unbounded, Receiver, Sender};
use self::pocc::ActiveSet;
use std::sync::atomic::Ordering::{Relaxed, SeqCst};
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Engine construction knobs.
#[derive(Debug, Clone, Copy)]
pub struct ProcessorConfig {
    /// Worker threads in the pool.
    pub threads: usize,
    /// Keys `0..init_records` are seeded with value 0 at startup.
    pub init_records: u64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        ProcessorConfig {
            threads: 8,
            init_records: 1_000_000,
        }
    }
}

/// Counters snapshot, see [`TxnProcessor::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessorStats {
    /// Transactions accepted through `new_txn_request`.
    pub admitted: u64,
    /// Internal restarts (validation failures, denied multi-key locks).
    pub restarts: u64,
    pub committed: u64,
    pub aborted: u64,
}

#[derive(Default)]
struct Counters {
    admitted: AtomicU64,
    restarts: AtomicU64,
    committed: AtomicU64,
    aborted: AtomicU64,
}

/// Storage variant owned by the engine; which one exists is fixed by the
/// discipline at startup.
enum Store {
    Single(Storage),
    Versioned(MvccStorage),
}

pub(crate) struct Inner {
    mode: CcMode,
    store: Store,
    next_id: AtomicU64,
    stop: AtomicBool,
    pool: StaticThreadPool,
    /// Incoming admissions plus internal restarts.
    requests_tx: Sender<Txn>,
    requests_rx: Receiver<Txn>,
    /// Transactions whose execution finished, awaiting the scheduler.
    completed_tx: Sender<Txn>,
    completed_rx: Receiver<Txn>,
    results_tx: Sender<Txn>,
    /// Transactions currently in parallel validation (OCC-P only).
    active: ActiveSet,
    counters: Counters,
}

impl Inner {
    fn single(&self) -> &Storage {
        match &self.store {
            Store::Single(storage) => storage,
            Store::Versioned(_) => unreachable!("single-version storage is not used in MVCC mode"),
        }
    }

    fn versioned(&self) -> &MvccStorage {
        match &self.store {
            Store::Versioned(storage) => storage,
            Store::Single(_) => unreachable!("version chains exist only in MVCC mode"),
        }
    }

    fn stopping(&self) -> bool {
        self.stop.load(SeqCst)
    }

    /// Assigns the next unique id and queues the transaction. Ids are
    /// handed out monotonically, so every admission (including restarts)
    /// is strictly later than everything admitted before it.
    fn admit(&self, mut txn: Txn) -> Result<(), EngineError> {
        if self.stopping() {
            return Err(EngineError::Shutdown);
        }
        let id = self.next_id.fetch_add(1, SeqCst);
        txn.set_id(id);
        self.counters.admitted.fetch_add(1, Relaxed);
        tracing::trace!(id, mode = %self.mode, "transaction admitted");
        self.requests_tx.send(txn).map_err(|_| EngineError::Shutdown)
    }

    /// Clears execution state, assigns a fresh (strictly larger) id and
    /// requeues. Restarts only ever travel through the request queue.
    fn restart(&self, mut txn: Txn) {
        let old_id = txn.id();
        txn.clear_for_restart();
        let id = self.next_id.fetch_add(1, SeqCst);
        txn.set_id(id);
        self.counters.restarts.fetch_add(1, Relaxed);
        tracing::debug!(old_id, id, "transaction restarted");
        // During shutdown the restart is dropped with the rest of the
        // pending work.
        let _ = self.requests_tx.send(txn);
    }

    /// Read phase plus program logic. Stamps the start time at entry, then
    /// buffers every key of the read and write sets that exists in
    /// storage.
    fn execute_txn(&self, txn: &mut Txn) {
        txn.stamp_start_time(clock::now());
        let keys: Vec<Key> = txn
            .read_set()
            .iter()
            .chain(txn.write_set().iter())
            .copied()
            .collect();
        for key in keys {
            if let Some(value) = self.single().read(key) {
                txn.buffer_read(key, value);
            }
        }
        txn.run();
    }

    /// Writes the commit buffer out to single-version storage, stamping
    /// each key's last-write timestamp.
    fn apply_writes(&self, txn: &Txn) {
        let storage = self.single();
        for (&key, &value) in txn.writes() {
            storage.write(key, value);
        }
    }

    /// Timestamp validation shared by both optimistic schedulers: every
    /// key the transaction touched must not have been written after its
    /// read phase began.
    fn occ_validate(&self, txn: &Txn) -> bool {
        let storage = self.single();
        txn.read_set()
            .iter()
            .chain(txn.write_set().iter())
            .all(|&key| storage.timestamp(key) <= txn.start_time())
    }

    /// Commits or aborts according to the program's vote, applying writes
    /// to single-version storage on commit.
    fn finalize(&self, mut txn: Txn) {
        match txn.status() {
            TxnStatus::CompletedCommit => {
                self.apply_writes(&txn);
                txn.set_status(TxnStatus::Committed);
            }
            TxnStatus::CompletedAbort => txn.set_status(TxnStatus::Aborted),
            _ => self.fatal_status(&txn),
        }
        self.publish(txn);
    }

    /// Pushes a terminal transaction onto the result queue.
    fn publish(&self, txn: Txn) {
        match txn.status() {
            TxnStatus::Committed => self.counters.committed.fetch_add(1, Relaxed),
            TxnStatus::Aborted => self.counters.aborted.fetch_add(1, Relaxed),
            _ => self.fatal_status(&txn),
        };
        tracing::trace!(id = txn.id(), status = ?txn.status(), "transaction finished");
        let _ = self.results_tx.send(txn);
    }

    fn fatal_status(&self, txn: &Txn) -> ! {
        tracing::error!(id = txn.id(), status = ?txn.status(), "completed transaction has invalid status");
        panic!(
            "completed transaction {} has invalid status {:?}",
            txn.id(),
            txn.status()
        );
    }

    fn run_scheduler(self: Arc<Self>) {
        tracing::debug!(mode = %self.mode, threads = self.pool.thread_count(), "scheduler running");
        match self.mode {
            CcMode::Serial => serial::run(&self),
            CcMode::LockingExclusiveOnly => locking::run(&self, LockManagerA::new()),
            CcMode::Locking => locking::run(&self, LockManagerB::new()),
            CcMode::Occ => occ::run(&self),
            CcMode::POcc => pocc::run(&self),
            CcMode::Mvcc => mvcc::run(&self),
        }
        tracing::debug!(mode = %self.mode, "scheduler stopped");
    }
}

/// Hands a transaction to a random pool worker running `job`.
fn dispatch(inner: &Arc<Inner>, txn: Txn, job: fn(Arc<Inner>, Txn)) {
    let cloned = Arc::clone(inner);
    inner.pool.run_task(Box::new(move || job(cloned, txn)));
}

/// Worker-side execution used by the locking and serial-validation
/// disciplines: read phase, program logic, then back to the scheduler via
/// the completion queue.
fn execute_and_complete(inner: Arc<Inner>, mut txn: Txn) {
    inner.execute_txn(&mut txn);
    let _ = inner.completed_tx.send(txn);
}

/// An in-memory key/value transaction engine.
///
/// The concurrency-control discipline is chosen once at construction and
/// governs how concurrent transactions over the same key space are
/// serialized. Submitted transactions always come back through
/// [`TxnProcessor::get_txn_result`] with a terminal status; restarts along
/// the way are invisible to the caller apart from the final id.
pub struct TxnProcessor {
    inner: Arc<Inner>,
    results_rx: Receiver<Txn>,
    scheduler: Option<JoinHandle<()>>,
}

impl TxnProcessor {
    pub fn new(mode: CcMode) -> Self {
        TxnProcessor::with_config(mode, ProcessorConfig::default())
    }

    pub fn with_config(mode: CcMode, config: ProcessorConfig) -> Self {
        let store = match mode {
            CcMode::Mvcc => Store::Versioned(MvccStorage::with_records(config.init_records)),
            _ => Store::Single(Storage::with_records(config.init_records)),
        };
        let (requests_tx, requests_rx) = unbounded();
        let (completed_tx, completed_rx) = unbounded();
        let (results_tx, results_rx) = unbounded();
        let inner = Arc::new(Inner {
            mode,
            store,
            next_id: AtomicU64::new(1),
            stop: AtomicBool::new(false),
            pool: StaticThreadPool::new(config.threads),
            requests_tx,
            requests_rx,
            completed_tx,
            completed_rx,
            results_tx,
            active: ActiveSet::new(),
            counters: Counters::default(),
        });

        let scheduler_inner = Arc::clone(&inner);
        let scheduler = thread::Builder::new()
            .name("tempo-scheduler".into())
            .spawn(move || scheduler_inner.run_scheduler())
            .expect("failed to spawn scheduler thread");

        TxnProcessor {
            inner,
            results_rx,
            scheduler: Some(scheduler),
        }
    }

    pub fn mode(&self) -> CcMode {
        self.inner.mode
    }

    /// Registers a transaction for execution, transferring ownership to
    /// the engine. The id is assigned here.
    pub fn new_txn_request(&self, txn: Txn) -> Result<(), EngineError> {
        self.inner.admit(txn)
    }

    /// Blocking pop of the next finished transaction. The returned status
    /// is always `Committed` or `Aborted`; result order is unrelated to
    /// submission order, so correlate by id.
    pub fn get_txn_result(&self) -> Result<Txn, EngineError> {
        self.results_rx.recv().map_err(|_| EngineError::Shutdown)
    }

    /// Non-blocking variant of [`TxnProcessor::get_txn_result`].
    pub fn try_get_txn_result(&self) -> Option<Txn> {
        self.results_rx.try_recv().ok()
    }

    pub fn stats(&self) -> ProcessorStats {
        let counters = &self.inner.counters;
        ProcessorStats {
            admitted: counters.admitted.load(Relaxed),
            restarts: counters.restarts.load(Relaxed),
            committed: counters.committed.load(Relaxed),
            aborted: counters.aborted.load(Relaxed),
        }
    }
}

impl Drop for TxnProcessor {
    fn drop(&mut self) {
        self.inner.stop.store(true, SeqCst);
        if let Some(handle) = self.scheduler.take() {
            let _ = handle.join();
        }
        self.inner.pool.shutdown();
    }
}
