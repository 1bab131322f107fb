//! Multi-version timestamp ordering. Each transaction runs start to
//! finish on one worker thread; the transaction id doubles as its
//! timestamp.
//!
//! Read-phase key locks are held only across the version search and the
//! `max_read_id` bump, so reads of distinct keys never serialize. The
//! write phase takes every write-set key lock in ascending key order (a
//! total order across transactions), checks timestamp admissibility under
//! those locks, and either installs all versions or restarts.

use super::{dispatch, Inner};
use crate::mvcc_storage::VersionChain;
use crate::thread_pool::Backoff;
use crate::transaction::{Txn, TxnStatus};
use crate::types::Key;
use std::sync::{Arc, Mutex, MutexGuard};

pub(super) fn run(inner: &Arc<Inner>) {
    let mut backoff = Backoff::new();
    while !inner.stopping() {
        let mut did_work = false;

        if let Ok(txn) = inner.requests_rx.try_recv() {
            did_work = true;
            dispatch(inner, txn, execute_txn_mvcc);
        }

        // Workers finish transactions with a terminal status already set;
        // restarts re-enter through the request queue instead.
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

fn execute_txn_mvcc(inner: Arc<Inner>, mut txn: Txn) {
    let storage = inner.versioned();

    // Read phase: latest version at or below our id, bumping its
    // max_read_id. Keys with no visible version stay unbuffered.
    let keys: Vec<Key> = txn
        .read_set()
        .iter()
        .chain(txn.write_set().iter())
        .copied()
        .collect();
    for key in keys {
        if let Some(value) = storage.read(key, txn.id()) {
            txn.buffer_read(key, value);
        }
    }

    txn.run();

    match txn.status() {
        TxnStatus::CompletedAbort => {
            txn.set_status(TxnStatus::Aborted);
            let _ = inner.completed_tx.send(txn);
            return;
        }
        TxnStatus::CompletedCommit => {}
        _ => inner.fatal_status(&txn),
    }

    // Write phase: lock every write-set chain, then check all of them.
    let chains: Vec<(Key, Arc<Mutex<VersionChain>>)> = txn
        .write_set()
        .iter()
        .map(|&key| (key, storage.chain(key)))
        .collect();
    let mut guards: Vec<(Key, MutexGuard<'_, VersionChain>)> = chains
        .iter()
        .map(|(key, chain)| (*key, chain.lock().expect("Can't handle poisoned locks!")))
        .collect();

    let admissible = guards.iter().all(|(_, chain)| chain.check_write(txn.id()));

    if admissible {
        for (key, chain) in guards.iter_mut() {
            if let Some(&value) = txn.writes().get(key) {
                chain.write(value, txn.id());
            }
        }
        drop(guards);
        txn.set_status(TxnStatus::Committed);
        let _ = inner.completed_tx.send(txn);
    } else {
        drop(guards);
        inner.restart(txn);
    }
}
