//! Bounded worker pool for event callbacks.

use crate::config::MAX_EVENT_THREADS;
use crate::error::{CoreError, CoreResult};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A fixed set of threads draining a bounded job channel.
///
/// `submit` blocks while the channel is full. Shutting down closes the
/// channel, lets workers finish what is queued, then joins them.
pub struct WorkerPool {
    sender: Mutex<Option<SyncSender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    completed: Arc<AtomicU64>,
    panicked: Arc<AtomicU64>,
}

impl WorkerPool {
    /// Spawns `threads` workers (clamped to `1..=MAX_EVENT_THREADS`) over a
    /// channel holding up to `capacity` pending jobs.
    pub fn new(threads: usize, capacity: usize) -> CoreResult<Self> {
        let threads = threads.clamp(1, MAX_EVENT_THREADS);
        let (sender, receiver) = mpsc::sync_channel::<Job>(capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let completed = Arc::new(AtomicU64::new(0));
        let panicked = Arc::new(AtomicU64::new(0));

        let mut workers = Vec::with_capacity(threads);
        for index in 0..threads {
            let receiver = Arc::clone(&receiver);
            let completed = Arc::clone(&completed);
            let panicked = Arc::clone(&panicked);
            let handle = thread::Builder::new()
                .name(format!("semnet-event-{index}"))
                .spawn(move || worker_loop(&receiver, &completed, &panicked))?;
            workers.push(handle);
        }
        tracing::debug!(threads, capacity, "event worker pool started");

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            completed,
            panicked,
        })
    }

    /// Queues a job, blocking while the channel is full.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` once the pool has been shut down.
    pub fn submit<F>(&self, job: F) -> CoreResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self
            .sender
            .lock()
            .clone()
            .ok_or_else(|| CoreError::invalid_operation("worker pool is shut down"))?;
        sender
            .send(Box::new(job))
            .map_err(|_| CoreError::invalid_operation("worker pool is shut down"))
    }

    /// Number of worker threads still attached.
    #[must_use]
    pub fn threads(&self) -> usize {
        self.workers.lock().len()
    }

    /// Jobs that ran to completion.
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    /// Jobs that panicked.
    #[must_use]
    pub fn panicked(&self) -> u64 {
        self.panicked.load(Ordering::SeqCst)
    }

    /// Returns true once [`WorkerPool::shutdown`] has run.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Closes the channel, drains queued jobs and joins every worker.
    pub fn shutdown(&self) {
        drop(self.sender.lock().take());
        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        let count = workers.len();
        for worker in workers {
            if worker.join().is_err() {
                tracing::warn!("event worker exited abnormally");
            }
        }
        if count > 0 {
            tracing::debug!(threads = count, "event worker pool stopped");
        }
    }
}

fn worker_loop(receiver: &Mutex<Receiver<Job>>, completed: &AtomicU64, panicked: &AtomicU64) {
    loop {
        // Hold the receiver lock only while waiting for the next job.
        let job = receiver.lock().recv();
        let Ok(job) = job else { break };
        if panic::catch_unwind(AssertUnwindSafe(job)).is_ok() {
            completed.fetch_add(1, Ordering::SeqCst);
        } else {
            panicked.fetch_add(1, Ordering::SeqCst);
            tracing::warn!("event callback panicked");
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.threads())
            .field("completed", &self.completed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn shutdown_drains_queued_jobs() {
        let pool = WorkerPool::new(2, 4).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..50 {
            let counter = Arc::clone(&counter);
            pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 50);
        assert_eq!(pool.completed(), 50);
        assert_eq!(pool.threads(), 0);
    }

    #[test]
    fn thread_count_is_clamped() {
        let pool = WorkerPool::new(0, 1).unwrap();
        assert_eq!(pool.threads(), 1);
        let pool = WorkerPool::new(1000, 1).unwrap();
        assert_eq!(pool.threads(), MAX_EVENT_THREADS);
    }

    #[test]
    fn panicking_job_does_not_kill_worker() {
        let pool = WorkerPool::new(1, 2).unwrap();
        pool.submit(|| panic!("boom")).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&ran);
        pool.submit(move || {
            flag.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        pool.shutdown();
        assert_eq!(pool.panicked(), 1);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn submit_after_shutdown_fails() {
        let pool = WorkerPool::new(1, 1).unwrap();
        pool.shutdown();
        assert!(pool.is_shut_down());
        assert!(matches!(
            pool.submit(|| {}),
            Err(CoreError::InvalidOperation { .. })
        ));
    }
}
