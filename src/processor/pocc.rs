//! Optimistic concurrency control with parallel validation.
//!
//! Validation and write application run on the worker thread itself.
//! Each validating transaction registers in the active set and snapshots
//! the prior membership in a single critical section; the snapshot is a
//! conservative predecessor set, so checking set overlap against it
//! (both ways against writes) rules out every racing conflicter. Self is
//! only removed from the active set after the writes are applied, closing
//! the window in which a peer could snapshot past us yet still observe
//! pre-apply timestamps.

use super::{dispatch, Inner};
use crate::thread_pool::Backoff;
use crate::transaction::{Txn, TxnStatus};
use crate::types::{Key, TxnId};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

/// Read/write sets of a transaction currently in validation. Sets are
/// immutable after admission, so sharing them by `Arc` is enough.
pub(crate) struct ActiveEntry {
    id: TxnId,
    read_set: BTreeSet<Key>,
    write_set: BTreeSet<Key>,
}

/// The set of transactions currently performing parallel validation.
/// Critical sections are bounded to membership insert/remove and the
/// snapshot copy.
pub(crate) struct ActiveSet {
    members: Mutex<HashMap<TxnId, Arc<ActiveEntry>>>,
}

impl ActiveSet {
    pub fn new() -> Self {
        ActiveSet {
            members: Mutex::new(HashMap::new()),
        }
    }

    /// Snapshots the current membership and inserts `entry`, atomically.
    fn insert_and_snapshot(&self, entry: Arc<ActiveEntry>) -> Vec<Arc<ActiveEntry>> {
        let mut members = self.members.lock().expect("Can't handle poisoned locks!");
        let snapshot = members.values().cloned().collect();
        members.insert(entry.id, entry);
        snapshot
    }

    fn remove(&self, id: TxnId) {
        self.members
            .lock()
            .expect("Can't handle poisoned locks!")
            .remove(&id);
    }
}

pub(super) fn run(inner: &Arc<Inner>) {
    let mut backoff = Backoff::new();
    while !inner.stopping() {
        let mut did_work = false;

        if let Ok(txn) = inner.requests_rx.try_recv() {
            did_work = true;
            dispatch(inner, txn, execute_txn_parallel);
        }

        // Workers finish transactions with a terminal status already set;
        // the scheduler only forwards them to the result queue.
        while let Ok(txn) = inner.completed_rx.try_recv() {
            did_work = true;
            inner.publish(txn);
        }

        if did_work {
            backoff.reset();
        } else {
            backoff.idle();
        }
    }
}

fn execute_txn_parallel(inner: Arc<Inner>, mut txn: Txn) {
    inner.execute_txn(&mut txn);

    match txn.status() {
        TxnStatus::CompletedAbort => {
            txn.set_status(TxnStatus::Aborted);
            let _ = inner.completed_tx.send(txn);
            return;
        }
        TxnStatus::CompletedCommit => {}
        _ => inner.fatal_status(&txn),
    }

    let entry = Arc::new(ActiveEntry {
        id: txn.id(),
        read_set: txn.read_set().clone(),
        write_set: txn.write_set().clone(),
    });
    let snapshot = inner.active.insert_and_snapshot(entry);

    let valid =
        inner.occ_validate(&txn) && snapshot.iter().all(|peer| no_conflict(&txn, peer));

    if valid {
        inner.apply_writes(&txn);
        inner.active.remove(txn.id());
        txn.set_status(TxnStatus::Committed);
        let _ = inner.completed_tx.send(txn);
    } else {
        inner.active.remove(txn.id());
        inner.restart(txn);
    }
}

/// Conflict rule against a concurrently validating peer: our writes must
/// not touch anything the peer reads or writes, and our reads must not
/// touch anything the peer writes.
fn no_conflict(txn: &Txn, peer: &ActiveEntry) -> bool {
    txn.write_set().is_disjoint(&peer.read_set)
        && txn.write_set().is_disjoint(&peer.write_set)
        && txn.read_set().is_disjoint(&peer.write_set)
}
