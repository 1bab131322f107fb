//! Fixed-size worker pool with one queue per worker.

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering::SeqCst};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub type Task = Box<dyn FnOnce() + Send>;

/// Bounded exponential idle backoff, 1 to 32 microseconds. Shared by pool
/// workers and the scheduler's polling loops.
pub(crate) struct Backoff {
    us: u64,
}

impl Backoff {
    pub fn new() -> Self {
        Backoff { us: 1 }
    }

    pub fn reset(&mut self) {
        self.us = 1;
    }

    pub fn idle(&mut self) {
        thread::sleep(Duration::from_micros(self.us));
        if self.us < 32 {
            self.us *= 2;
        }
    }
}

/// Fixed pool of worker threads, each polling its own queue.
///
/// Dispatch picks a queue uniformly at random. On shutdown, each worker
/// drains its queue, running every remaining task, before exiting.
pub struct StaticThreadPool {
    queues: Vec<Sender<Task>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    stopped: Arc<AtomicBool>,
}

impl StaticThreadPool {
    pub fn new(threads: usize) -> Self {
        assert!(threads > 0, "pool needs at least one worker");
        let stopped = Arc::new(AtomicBool::new(false));
        let mut queues = Vec::with_capacity(threads);
        let mut handles = Vec::with_capacity(threads);
        for i in 0..threads {
            let (tx, rx) = unbounded::<Task>();
            let stop = Arc::clone(&stopped);
            let handle = thread::Builder::new()
                .name(format!("tempo-worker-{i}"))
                .spawn(move || run_worker(rx, stop))
                .expect("failed to spawn pool worker");
            queues.push(tx);
            handles.push(handle);
        }
        StaticThreadPool {
            queues,
            handles: Mutex::new(handles),
            stopped,
        }
    }

    pub fn active(&self) -> bool {
        !self.stopped.load(SeqCst)
    }

    pub fn thread_count(&self) -> usize {
        self.queues.len()
    }

    /// Hands a task to a uniformly random worker queue.
    pub fn run_task(&self, task: Task) {
        let at = rand::thread_rng().gen_range(0..self.queues.len());
        // A send only fails once the chosen worker has exited during
        // shutdown; the task is dropped like any other pending work.
        let _ = self.queues[at].send(task);
    }

    /// Stops the pool and joins every worker. Pending tasks are drained
    /// (run to completion) first. Idempotent.
    pub fn shutdown(&self) {
        self.stopped.store(true, SeqCst);
        let handles = std::mem::take(
            &mut *self
                .handles
                .lock()
                .expect("Can't handle poisoned locks!"),
        );
        for handle in handles {
            let _ = handle.join();
        }
    }
}

impl Drop for StaticThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(queue: Receiver<Task>, stopped: Arc<AtomicBool>) {
    let mut backoff = Backoff::new();
    loop {
        match queue.try_recv() {
            Ok(task) => {
                task();
                backoff.reset();
            }
            Err(TryRecvError::Empty) => backoff.idle(),
            Err(TryRecvError::Disconnected) => break,
        }

        if stopped.load(SeqCst) {
            // Drain whatever is left before exiting.
            while let Ok(task) = queue.try_recv() {
                task();
            }
            break;
        }
    }
}
