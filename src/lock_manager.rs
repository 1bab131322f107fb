//! Per-key FIFO lock queues used by the locking schedulers.
//!
//! The lock manager is only ever driven from the scheduler thread, which
//! requests and releases with all-or-nothing semantics (a transaction
//! denied any lock while touching more than one key releases everything
//! and restarts). That policy means no lock is ever held while waiting for
//! another, so neither manager can deadlock.

use crate::types::{Key, TxnId};
use std::collections::{HashMap, VecDeque};

/// Observable lock state of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Unlocked,
    Shared,
    Exclusive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LockRequest {
    mode: LockMode,
    owner: TxnId,
}

pub trait LockManager {
    /// Requests a read lock. Returns true iff the lock was granted
    /// immediately; otherwise the request stays queued FIFO.
    fn read_lock(&mut self, txn: TxnId, key: Key) -> bool;

    /// Requests a write lock. Same grant semantics as [`read_lock`].
    ///
    /// [`read_lock`]: LockManager::read_lock
    fn write_lock(&mut self, txn: TxnId, key: Key) -> bool;

    /// Erases the transaction's request on this key, whether granted or
    /// still waiting, and promotes newly eligible owners.
    fn release(&mut self, txn: TxnId, key: Key);

    /// Current mode of a key together with the transactions that own it.
    fn status(&self, key: Key) -> (LockMode, Vec<TxnId>);

    /// Next transaction whose lock acquisition completed after waiting.
    fn pop_ready(&mut self) -> Option<TxnId>;
}

/// Decrements a waiter's remaining-waits count, moving it to `ready` when
/// the count reaches zero. Transactions that were granted immediately have
/// no entry and are skipped.
fn grant_to_waiter(
    remaining_waits: &mut HashMap<TxnId, usize>,
    ready: &mut VecDeque<TxnId>,
    owner: TxnId,
) {
    if let Some(waits) = remaining_waits.get_mut(&owner) {
        *waits -= 1;
        if *waits == 0 {
            remaining_waits.remove(&owner);
            ready.push_back(owner);
        }
    }
}

/// Drops one unit of a cancelled waiter's remaining-waits count without
/// ever marking it ready. Used when a still-queued request is erased.
fn cancel_wait(remaining_waits: &mut HashMap<TxnId, usize>, owner: TxnId) {
    if let Some(waits) = remaining_waits.get_mut(&owner) {
        *waits -= 1;
        if *waits == 0 {
            remaining_waits.remove(&owner);
        }
    }
}

/// Mode A: every request is exclusive; the head of a key's queue owns it.
pub struct LockManagerA {
    lock_table: HashMap<Key, VecDeque<LockRequest>>,
    remaining_waits: HashMap<TxnId, usize>,
    ready: VecDeque<TxnId>,
}

impl LockManagerA {
    pub fn new() -> Self {
        LockManagerA {
            lock_table: HashMap::new(),
            remaining_waits: HashMap::new(),
            ready: VecDeque::new(),
        }
    }
}

impl Default for LockManagerA {
    fn default() -> Self {
        LockManagerA::new()
    }
}

impl LockManager for LockManagerA {
    fn read_lock(&mut self, txn: TxnId, key: Key) -> bool {
        // Exclusive-only mode: reads take write locks.
        self.write_lock(txn, key)
    }

    fn write_lock(&mut self, txn: TxnId, key: Key) -> bool {
        let queue = self.lock_table.entry(key).or_default();
        queue.push_back(LockRequest {
            mode: LockMode::Exclusive,
            owner: txn,
        });
        if queue.len() == 1 {
            true
        } else {
            *self.remaining_waits.entry(txn).or_insert(0) += 1;
            false
        }
    }

    fn release(&mut self, txn: TxnId, key: Key) {
        let Some(queue) = self.lock_table.get_mut(&key) else {
            return;
        };
        let Some(at) = queue.iter().position(|request| request.owner == txn) else {
            return;
        };
        queue.remove(at);
        if at == 0 {
            // The owner left; the new head (if any) is granted this key.
            if let Some(next) = queue.front().map(|request| request.owner) {
                grant_to_waiter(&mut self.remaining_waits, &mut self.ready, next);
            }
        } else {
            // A still-waiting request was cancelled.
            cancel_wait(&mut self.remaining_waits, txn);
        }
    }

    fn status(&self, key: Key) -> (LockMode, Vec<TxnId>) {
        match self.lock_table.get(&key).and_then(|queue| queue.front()) {
            Some(request) => (LockMode::Exclusive, vec![request.owner]),
            None => (LockMode::Unlocked, Vec::new()),
        }
    }

    fn pop_ready(&mut self) -> Option<TxnId> {
        self.ready.pop_front()
    }
}

/// Mode B: shared and exclusive requests. A key is owned either by the
/// longest all-shared prefix of its queue or by a single exclusive head.
pub struct LockManagerB {
    lock_table: HashMap<Key, VecDeque<LockRequest>>,
    remaining_waits: HashMap<TxnId, usize>,
    /// Number of exclusive requests currently queued per key (owning or
    /// waiting). A shared request is only granted past a non-empty queue
    /// when this is zero.
    exclusive_waiting: HashMap<Key, usize>,
    ready: VecDeque<TxnId>,
}

impl LockManagerB {
    pub fn new() -> Self {
        LockManagerB {
            lock_table: HashMap::new(),
            remaining_waits: HashMap::new(),
            exclusive_waiting: HashMap::new(),
            ready: VecDeque::new(),
        }
    }

    fn add_lock(&mut self, mode: LockMode, txn: TxnId, key: Key) -> bool {
        let (prior, _) = self.status(key);
        let mut granted = prior == LockMode::Unlocked;
        match mode {
            LockMode::Shared => {
                granted |= self.exclusive_waiting.get(&key).copied().unwrap_or(0) == 0;
            }
            LockMode::Exclusive => {
                *self.exclusive_waiting.entry(key).or_insert(0) += 1;
            }
            LockMode::Unlocked => unreachable!("requests are shared or exclusive"),
        }

        self.lock_table
            .entry(key)
            .or_default()
            .push_back(LockRequest { mode, owner: txn });

        if !granted {
            *self.remaining_waits.entry(txn).or_insert(0) += 1;
        }
        granted
    }

    fn was_owner(&self, txn: TxnId, key: Key) -> bool {
        let (_, owners) = self.status(key);
        owners.contains(&txn)
    }
}

impl Default for LockManagerB {
    fn default() -> Self {
        LockManagerB::new()
    }
}

impl LockManager for LockManagerB {
    fn read_lock(&mut self, txn: TxnId, key: Key) -> bool {
        self.add_lock(LockMode::Shared, txn, key)
    }

    fn write_lock(&mut self, txn: TxnId, key: Key) -> bool {
        self.add_lock(LockMode::Exclusive, txn, key)
    }

    fn release(&mut self, txn: TxnId, key: Key) {
        let owned = self.was_owner(txn, key);
        let Some(queue) = self.lock_table.get_mut(&key) else {
            return;
        };
        let Some(at) = queue.iter().position(|request| request.owner == txn) else {
            return;
        };
        let request = queue.remove(at).expect("position is in bounds");
        if request.mode == LockMode::Exclusive {
            if let Some(count) = self.exclusive_waiting.get_mut(&key) {
                *count -= 1;
                if *count == 0 {
                    self.exclusive_waiting.remove(&key);
                }
            }
        }
        if !owned {
            cancel_wait(&mut self.remaining_waits, txn);
        }

        // Advance the queue: everything in the new ownership prefix that
        // had been waiting is granted this key.
        let (_, owners) = self.status(key);
        for owner in owners {
            grant_to_waiter(&mut self.remaining_waits, &mut self.ready, owner);
        }
    }

    fn status(&self, key: Key) -> (LockMode, Vec<TxnId>) {
        let Some(queue) = self.lock_table.get(&key) else {
            return (LockMode::Unlocked, Vec::new());
        };
        if queue.is_empty() {
            return (LockMode::Unlocked, Vec::new());
        }

        let mut owners = Vec::new();
        let mut mode = LockMode::Exclusive;
        for request in queue {
            if request.mode == LockMode::Exclusive && mode == LockMode::Shared {
                break;
            }
            owners.push(request.owner);
            mode = request.mode;
            if mode == LockMode::Exclusive {
                break;
            }
        }
        (mode, owners)
    }

    fn pop_ready(&mut self) -> Option<TxnId> {
        self.ready.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_a_simple_locking() {
        let mut lm = LockManagerA::new();

        // Txn 1 acquires the lock; 2 and 3 queue behind it.
        assert!(lm.read_lock(1, 101));
        assert!(!lm.write_lock(2, 101));
        assert!(!lm.read_lock(3, 101));
        assert_eq!(lm.status(101), (LockMode::Exclusive, vec![1]));
        assert_eq!(lm.pop_ready(), None);

        // Txn 1 releases; 2 is granted.
        lm.release(1, 101);
        assert_eq!(lm.status(101), (LockMode::Exclusive, vec![2]));
        assert_eq!(lm.pop_ready(), Some(2));

        // Txn 2 releases; 3 is granted.
        lm.release(2, 101);
        assert_eq!(lm.status(101), (LockMode::Exclusive, vec![3]));
        assert_eq!(lm.pop_ready(), Some(3));
        assert_eq!(lm.pop_ready(), None);
    }

    #[test]
    fn mode_a_locks_released_out_of_order() {
        let mut lm = LockManagerA::new();

        assert!(lm.read_lock(1, 101));
        assert!(!lm.write_lock(2, 101));
        assert!(!lm.read_lock(3, 101));
        assert!(!lm.read_lock(4, 101));

        // Txn 2 cancels its waiting request; 1 still owns the key.
        lm.release(2, 101);
        assert_eq!(lm.status(101), (LockMode::Exclusive, vec![1]));
        assert_eq!(lm.pop_ready(), None);

        lm.release(1, 101);
        assert_eq!(lm.status(101), (LockMode::Exclusive, vec![3]));
        assert_eq!(lm.pop_ready(), Some(3));

        lm.release(3, 101);
        assert_eq!(lm.status(101), (LockMode::Exclusive, vec![4]));
        assert_eq!(lm.pop_ready(), Some(4));
    }

    #[test]
    fn mode_a_released_key_unlocks() {
        let mut lm = LockManagerA::new();
        assert!(lm.write_lock(1, 7));
        lm.release(1, 7);
        assert_eq!(lm.status(7), (LockMode::Unlocked, vec![]));
    }

    #[test]
    fn mode_b_simple_locking() {
        let mut lm = LockManagerB::new();

        assert!(lm.read_lock(1, 101));
        assert_eq!(lm.status(101), (LockMode::Shared, vec![1]));

        // A writer and another reader queue behind the shared owner; the
        // reader is blocked by the waiting writer.
        assert!(!lm.write_lock(2, 101));
        assert!(!lm.read_lock(3, 101));
        assert_eq!(lm.status(101), (LockMode::Shared, vec![1]));
        assert_eq!(lm.pop_ready(), None);

        lm.release(1, 101);
        assert_eq!(lm.status(101), (LockMode::Exclusive, vec![2]));
        assert_eq!(lm.pop_ready(), Some(2));

        lm.release(2, 101);
        assert_eq!(lm.status(101), (LockMode::Shared, vec![3]));
        assert_eq!(lm.pop_ready(), Some(3));
    }

    #[test]
    fn mode_b_locks_released_out_of_order() {
        let mut lm = LockManagerB::new();

        assert!(lm.read_lock(1, 101));
        assert!(!lm.write_lock(2, 101));
        assert!(!lm.read_lock(3, 101));
        assert!(!lm.read_lock(4, 101));

        // The waiting writer cancels; the whole shared batch owns the key.
        lm.release(2, 101);
        assert_eq!(lm.status(101), (LockMode::Shared, vec![1, 3, 4]));
        assert_eq!(lm.pop_ready(), Some(3));
        assert_eq!(lm.pop_ready(), Some(4));
        assert_eq!(lm.pop_ready(), None);
    }

    #[test]
    fn mode_b_shared_batch_admits_new_readers() {
        let mut lm = LockManagerB::new();
        assert!(lm.read_lock(1, 5));
        assert!(lm.read_lock(2, 5));
        assert_eq!(lm.status(5), (LockMode::Shared, vec![1, 2]));

        // Once a writer queues, later readers must wait behind it.
        assert!(!lm.write_lock(3, 5));
        assert!(!lm.read_lock(4, 5));

        lm.release(1, 5);
        lm.release(2, 5);
        assert_eq!(lm.status(5), (LockMode::Exclusive, vec![3]));
        assert_eq!(lm.pop_ready(), Some(3));

        lm.release(3, 5);
        assert_eq!(lm.status(5), (LockMode::Shared, vec![4]));
        assert_eq!(lm.pop_ready(), Some(4));
    }

    #[test]
    fn mode_b_writer_granted_only_on_unlocked_key() {
        let mut lm = LockManagerB::new();
        assert!(lm.write_lock(1, 9));
        assert!(!lm.write_lock(2, 9));
        lm.release(1, 9);
        assert_eq!(lm.pop_ready(), Some(2));
        lm.release(2, 9);
        assert!(lm.write_lock(3, 9));
    }

    #[test]
    fn cancelled_multi_key_waiter_never_becomes_ready() {
        let mut lm = LockManagerA::new();
        assert!(lm.write_lock(1, 10));
        // Txn 2 takes key 11 but is denied key 10, then releases both, the
        // all-or-nothing path the scheduler uses before a restart.
        assert!(lm.write_lock(2, 11));
        assert!(!lm.write_lock(2, 10));
        lm.release(2, 11);
        lm.release(2, 10);

        lm.release(1, 10);
        assert_eq!(lm.pop_ready(), None);
        assert_eq!(lm.status(10), (LockMode::Unlocked, vec![]));
    }
}
