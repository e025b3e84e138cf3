//! Teams: the worker threads behind execution groups.
//!
//! A provider that reacts to external events (an I/O callback, a timer)
//! declares execution groups and is handed a concrete [`Team`] for each one.
//! It then assigns jobs to the team, and those jobs invoke flows.

use core::sync::atomic::{AtomicBool, Ordering};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;

/// Unit of work handed to a team.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Failure to start a team.
#[derive(Debug, thiserror::Error)]
pub enum TeamError {
    /// A worker thread could not be spawned.
    #[error("failed to spawn worker for team '{team}'")]
    Spawn {
        /// Team name.
        team: String,
        /// OS error.
        #[source]
        source: std::io::Error,
    },
}

/// A set of threads jobs can be assigned to.
pub trait Team: Send + Sync + 'static {
    /// Queues or runs `job`.
    fn assign(&self, job: Job);

    /// Called when the office floor opens.
    ///
    /// # Errors
    ///
    /// [`TeamError`] if the team's threads cannot be started.
    fn start(&self) -> Result<(), TeamError> {
        Ok(())
    }

    /// Called when the office floor closes. Must not return before queued jobs ran.
    fn stop(&self) {}
}

/// Runs every job on the assigning thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassiveTeam;

impl Team for PassiveTeam {
    fn assign(&self, job: Job) {
        job();
    }
}

struct WorkerQueue {
    jobs: Mutex<VecDeque<Job>>,
    available: Condvar,
    running: AtomicBool,
}

/// Fixed number of worker threads draining a shared queue.
///
/// Jobs assigned before [`start`](Team::start) wait in the queue.
pub struct WorkerTeam {
    name: String,
    size: usize,
    queue: Arc<WorkerQueue>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl core::fmt::Debug for WorkerTeam {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkerTeam")
            .field("name", &self.name)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

impl WorkerTeam {
    /// Creates a team of `size` workers (at least one).
    #[must_use]
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            size: size.max(1),
            queue: Arc::new(WorkerQueue {
                jobs: Mutex::new(VecDeque::new()),
                available: Condvar::new(),
                running: AtomicBool::new(false),
            }),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Team name, used as the worker thread name prefix.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of worker threads.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    fn work(queue: &WorkerQueue) {
        loop {
            let job = {
                let mut jobs = queue.jobs.lock();
                loop {
                    if let Some(job) = jobs.pop_front() {
                        break Some(job);
                    }
                    if !queue.running.load(Ordering::Acquire) {
                        break None;
                    }
                    queue.available.wait(&mut jobs);
                }
            };
            match job {
                Some(job) => job(),
                None => return,
            }
        }
    }
}

impl Team for WorkerTeam {
    fn assign(&self, job: Job) {
        self.queue.jobs.lock().push_back(job);
        self.queue.available.notify_one();
    }

    fn start(&self) -> Result<(), TeamError> {
        if self.queue.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut workers = self.workers.lock();
        for index in 0..self.size {
            let queue = Arc::clone(&self.queue);
            let handle = std::thread::Builder::new()
                .name(format!("{}-{}", self.name, index))
                .spawn(move || WorkerTeam::work(&queue))
                .map_err(|source| TeamError::Spawn {
                    team: self.name.clone(),
                    source,
                })?;
            workers.push(handle);
        }
        tracing::debug!(team = %self.name, size = self.size, "team started");
        Ok(())
    }

    fn stop(&self) {
        {
            // Flip under the queue lock so no worker misses the wake-up.
            let _jobs = self.queue.jobs.lock();
            self.queue.running.store(false, Ordering::Release);
        }
        self.queue.available.notify_all();
        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        for worker in workers {
            if worker.join().is_err() {
                tracing::error!(team = %self.name, "worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::AtomicUsize;

    #[test]
    fn passive_team_runs_inline() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        PassiveTeam.assign(Box::new(move || flag.store(true, Ordering::SeqCst)));
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn worker_team_drains_queue_before_stopping() {
        let team = WorkerTeam::new("workers", 3);
        let count = Arc::new(AtomicUsize::new(0));

        // Queued before start.
        for _ in 0..10 {
            let count = Arc::clone(&count);
            team.assign(Box::new(move || {
                count.fetch_add(1, Ordering::SeqCst);
            }));
        }
        team.start().unwrap();
        for _ in 0..10 {
            let count = Arc::clone(&count);
            team.assign(Box::new(move || {
                count.fetch_add(1, Ordering::SeqCst);
            }));
        }
        team.stop();

        assert_eq!(count.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn workers_are_named_after_team() {
        let team = WorkerTeam::new("io", 1);
        team.start().unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        team.assign(Box::new(move || {
            let name = std::thread::current().name().map(str::to_string);
            tx.send(name).unwrap();
        }));
        assert_eq!(rx.recv().unwrap().as_deref(), Some("io-0"));
        team.stop();
    }
}
