//! Optimistic concurrency control with serial validation.
//!
//! Workers run read phases and program logic concurrently; validation and
//! write application happen one transaction at a time on the scheduler
//! thread. Confining the apply to this thread is what makes the
//! timestamp check point-in-time correct without any lock on storage.

use super::{dispatch, execute_and_complete, Inner};
use crate::thread_pool::Backoff;
use crate::transaction::{Txn, TxnStatus};
use std::sync::Arc;

pub(super) fn run(inner: &Arc<Inner>) {
    let mut backoff = Backoff::new();
    while !inner.stopping() {
        let mut did_work = false;

        if let Ok(txn) = inner.requests_rx.try_recv() {
            did_work = true;
            dispatch(inner, txn, execute_and_complete);
        }

        while let Ok(txn) = inner.completed_rx.try_recv() {
            did_work = true;
            validate_and_finish(inner, txn);
        }

        if did_work {
            backoff.reset();
        } else {
            backoff.idle();
        }
    }
}

fn validate_and_finish(inner: &Arc<Inner>, mut txn: Txn) {
    match txn.status() {
        // A program abort stands regardless of validation.
        TxnStatus::CompletedAbort => {
            txn.set_status(TxnStatus::Aborted);
            inner.publish(txn);
        }
        TxnStatus::CompletedCommit => {
            if inner.occ_validate(&txn) {
                inner.apply_writes(&txn);
                txn.set_status(TxnStatus::Committed);
                inner.publish(txn);
            } else {
                inner.restart(txn);
            }
        }
        _ => inner.fatal_status(&txn),
    }
}
