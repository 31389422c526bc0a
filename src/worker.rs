//! Single-job background worker.
//!
//! At most one job is in flight: `queue` is ignored while a job is pending and
//! `wait` blocks until the pending job (if any) has run.

use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::error::EngineError;

enum Job {
    Run,
    Shutdown,
}

#[derive(Default)]
struct Flags {
    pending: bool,
    closed: bool,
}

struct JobState {
    flags: Mutex<Flags>,
    done: Condvar,
}

/// Handle used to queue work onto, and wait for, the worker thread.
pub(crate) struct Executor {
    jobs: Sender<Job>,
    state: Arc<JobState>,
}

/// Receiving half of an [`Executor`], consumed when the thread is spawned.
pub(crate) struct JobReceiver {
    jobs: Receiver<Job>,
    state: Arc<JobState>,
}

impl Executor {
    /// Create an executor whose thread is started later with [`JobReceiver::spawn`].
    pub(crate) fn new() -> (Self, JobReceiver) {
        let (tx, rx) = unbounded();
        let state = Arc::new(JobState {
            flags: Mutex::new(Flags::default()),
            done: Condvar::new(),
        });
        (
            Self {
                jobs: tx,
                state: state.clone(),
            },
            JobReceiver { jobs: rx, state },
        )
    }

    /// Queue one run of the task unless one is already pending.
    pub(crate) fn queue(&self) {
        let mut flags = self.state.flags.lock();
        if flags.pending || flags.closed {
            return;
        }
        if self.jobs.send(Job::Run).is_ok() {
            flags.pending = true;
        }
    }

    /// Block until no job is pending.
    pub(crate) fn wait(&self) {
        let mut flags = self.state.flags.lock();
        while flags.pending {
            self.state.done.wait(&mut flags);
        }
    }

    /// Ask the worker thread to exit after the current job.
    pub(crate) fn shutdown(&self) {
        let _ = self.jobs.send(Job::Shutdown);
    }
}

impl JobReceiver {
    /// Start the worker thread. `task` returns `false` when its owner is gone,
    /// which also ends the thread.
    pub(crate) fn spawn<F>(self, name: &str, mut task: F) -> Result<(), EngineError>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let thread_name = name.to_string();
        thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                while let Ok(job) = self.jobs.recv() {
                    let keep_running = match job {
                        Job::Run => task(),
                        Job::Shutdown => false,
                    };
                    self.finish(false);
                    if !keep_running {
                        break;
                    }
                }
                // Release anyone still waiting on a job that will never run.
                self.finish(true);
                debug!(worker = %thread_name, "worker exited");
            })
            .map_err(EngineError::WorkerSpawn)?;
        Ok(())
    }

    fn finish(&self, close: bool) {
        let mut flags = self.state.flags.lock();
        flags.pending = false;
        flags.closed |= close;
        self.state.done.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn queued_job_runs_before_wait_returns() {
        let (executor, receiver) = Executor::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        receiver
            .spawn("test-worker", move || {
                thread::sleep(Duration::from_millis(5));
                counter.fetch_add(1, Ordering::SeqCst);
                true
            })
            .unwrap();

        executor.queue();
        executor.wait();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!executor.state.flags.lock().pending);

        executor.queue();
        executor.wait();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        executor.shutdown();
    }

    #[test]
    fn only_one_job_in_flight() {
        let (executor, receiver) = Executor::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        receiver
            .spawn("test-worker", move || {
                thread::sleep(Duration::from_millis(20));
                counter.fetch_add(1, Ordering::SeqCst);
                true
            })
            .unwrap();

        executor.queue();
        executor.queue();
        executor.queue();
        executor.wait();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        executor.shutdown();
    }

    #[test]
    fn wait_returns_after_task_asks_to_stop() {
        let (executor, receiver) = Executor::new();
        receiver.spawn("test-worker", || false).unwrap();
        executor.queue();
        executor.wait();
        // Thread is gone; further queues are dropped without hanging waiters.
        executor.queue();
        thread::sleep(Duration::from_millis(10));
        executor.wait();
    }

    #[test]
    fn wait_without_jobs_returns_immediately() {
        let (executor, _receiver) = Executor::new();
        executor.wait();
        assert!(!executor.state.flags.lock().pending);
    }
}
