//! Serial execution: one transaction at a time on the scheduler thread.
//! No restart path exists because nothing can fail validation.

use super::Inner;
use crossbeam_channel::RecvTimeoutError;
use std::time::Duration;

pub(super) fn run(inner: &Inner) {
    while !inner.stopping() {
        match inner.requests_rx.recv_timeout(Duration::from_millis(1)) {
            Ok(mut txn) => {
                inner.execute_txn(&mut txn);
                inner.finalize(txn);
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}
