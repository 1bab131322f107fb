//! An in-memory key/value transaction engine that executes transactions
//! under interchangeable concurrency-control disciplines: serial
//! execution, exclusive-only locking, shared/exclusive locking,
//! optimistic concurrency control with serial or parallel validation,
//! and multi-version timestamp ordering.
//!
//! The discipline is picked once when the [`TxnProcessor`] is built and
//! governs how concurrent transactions over the same key space are
//! serialized:
//!
//! ```no_run
//! use std::collections::BTreeMap;
//! use tempo::workload::{Expect, Put};
//! use tempo::{CcMode, TxnProcessor, TxnStatus};
//!
//! let engine = TxnProcessor::new(CcMode::Occ);
//! engine.new_txn_request(Put::txn(BTreeMap::from([(1, 42)]))).unwrap();
//! let put = engine.get_txn_result().unwrap();
//! assert_eq!(put.status(), TxnStatus::Committed);
//!
//! engine.new_txn_request(Expect::txn(BTreeMap::from([(1, 42)]))).unwrap();
//! assert_eq!(engine.get_txn_result().unwrap().status(), TxnStatus::Committed);
//! ```
//!
//! Transactions declare their read and write sets up front, run arbitrary
//! program logic against buffered reads, and vote commit or abort; the
//! engine restarts them transparently when validation or lock acquisition
//! fails, so every submission eventually surfaces exactly once with a
//! terminal status.

pub mod clock;
pub mod error;
pub mod lock_manager;
pub mod mvcc_storage;
pub mod processor;
pub mod storage;
pub mod thread_pool;
pub mod transaction;
pub mod types;
pub mod workload;

pub use error::EngineError;
pub use processor::{ProcessorConfig, ProcessorStats, TxnProcessor};
pub use transaction::{Decision, Program, Txn, TxnStatus};
pub use types::{CcMode, Key, TxnId, Value};
