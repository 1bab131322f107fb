//! Locking scheduler shared by modes A and B.
//!
//! Lock acquisition is all-or-nothing: a transaction denied any lock
//! while touching more than one key releases everything it requested and
//! restarts with a fresh id, so no lock is ever held while waiting. A
//! single-key transaction may instead stay queued; the lock manager
//! promotes it through the ready queue once it reaches ownership.

use super::{dispatch, execute_and_complete, Inner};
use crate::lock_manager::LockManager;
use crate::thread_pool::Backoff;
use crate::transaction::{Txn, TxnStatus};
use crate::types::{Key, TxnId};
use std::collections::HashMap;
use std::sync::Arc;

pub(super) fn run<L: LockManager>(inner: &Arc<Inner>, mut lock_mgr: L) {
    // Single-key transactions left waiting in the lock queues, by id.
    let mut parked: HashMap<TxnId, Txn> = HashMap::new();
    let mut backoff = Backoff::new();

    while !inner.stopping() {
        let mut did_work = false;

        // Start processing the next incoming request.
        if let Ok(txn) = inner.requests_rx.try_recv() {
            did_work = true;
            acquire_locks(inner, &mut lock_mgr, &mut parked, txn);
        }

        // Commit or abort everything that finished running, then release
        // its locks.
        while let Ok(mut txn) = inner.completed_rx.try_recv() {
            did_work = true;
            match txn.status() {
                TxnStatus::CompletedCommit => {
                    inner.apply_writes(&txn);
                    txn.set_status(TxnStatus::Committed);
                }
                TxnStatus::CompletedAbort => txn.set_status(TxnStatus::Aborted),
                _ => inner.fatal_status(&txn),
            }
            for &key in txn.read_set().iter().chain(txn.write_set().iter()) {
                lock_mgr.release(txn.id(), key);
            }
            inner.publish(txn);
        }

        // Dispatch transactions whose lock acquisition just completed.
        while let Some(id) = lock_mgr.pop_ready() {
            did_work = true;
            if let Some(txn) = parked.remove(&id) {
                dispatch(inner, txn, execute_and_complete);
            }
        }

        if did_work {
            backoff.reset();
        } else {
            backoff.idle();
        }
    }
}

/// Requests every declared lock. Fully granted transactions are
/// dispatched; a blocked multi-key transaction releases everything it
/// requested and restarts; a blocked single-key transaction is parked
/// until the ready queue surfaces it.
fn acquire_locks<L: LockManager>(
    inner: &Arc<Inner>,
    lock_mgr: &mut L,
    parked: &mut HashMap<TxnId, Txn>,
    txn: Txn,
) {
    let total_keys = txn.read_set().len() + txn.write_set().len();
    let mut blocked = false;
    let mut requested: Vec<Key> = Vec::with_capacity(total_keys);

    for &key in txn.read_set() {
        requested.push(key);
        if !lock_mgr.read_lock(txn.id(), key) {
            blocked = true;
            if total_keys > 1 {
                break;
            }
        }
    }
    if !blocked {
        for &key in txn.write_set() {
            requested.push(key);
            if !lock_mgr.write_lock(txn.id(), key) {
                blocked = true;
                if total_keys > 1 {
                    break;
                }
            }
        }
    }

    if !blocked {
        dispatch(inner, txn, execute_and_complete);
    } else if total_keys > 1 {
        for &key in &requested {
            lock_mgr.release(txn.id(), key);
        }
        inner.restart(txn);
    } else {
        parked.insert(txn.id(), txn);
    }
}
