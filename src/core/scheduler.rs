// src/core/scheduler.rs

//! Deferred work and debouncing.
//!
//! A [`Scheduler`] runs a job later, on the host's next loop turn. A
//! [`Debouncer`] sits in front of it so that any number of notifications
//! before that turn collapse into a single job.

use log::debug;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A unit of deferred work.
pub type Job = Box<dyn FnOnce()>;

/// Defers jobs to a later turn of the host's loop.
pub trait Scheduler {
    /// Runs `job` exactly once at some later point.
    fn schedule_once(&self, job: Job);
}

/// A scheduler driven by its owner: jobs run when [`ManualScheduler::run_pending`]
/// is called. Hosts call it once per loop turn; tests call it directly.
#[derive(Default)]
pub struct ManualScheduler {
    queue: RefCell<VecDeque<Job>>,
}

impl ManualScheduler {
    /// A scheduler with an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of jobs waiting for the next [`ManualScheduler::run_pending`].
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Runs the jobs queued so far. Jobs scheduled while running wait for the
    /// next call. Returns how many jobs ran.
    pub fn run_pending(&self) -> usize {
        let jobs: Vec<Job> = self.queue.borrow_mut().drain(..).collect();
        let count = jobs.len();
        for job in jobs {
            job();
        }
        count
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_once(&self, job: Job) {
        self.queue.borrow_mut().push_back(job);
    }
}

/// Coalesces notifications into one scheduled job.
#[derive(Debug, Clone, Default)]
pub struct Debouncer {
    scheduled: Arc<AtomicBool>,
}

impl Debouncer {
    /// A debouncer with nothing scheduled.
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a job is queued and has not started.
    pub fn is_scheduled(&self) -> bool {
        self.scheduled.load(Ordering::SeqCst)
    }

    /// Schedules `job` unless a job is already waiting to run. The flag is
    /// cleared as the job starts, so notifications made by the job itself
    /// schedule a new run. Returns whether `job` was scheduled.
    pub fn notify<F>(&self, scheduler: &dyn Scheduler, job: F) -> bool
    where
        F: FnOnce() + 'static,
    {
        if self.scheduled.swap(true, Ordering::SeqCst) {
            debug!("Recompute already scheduled; coalescing");
            return false;
        }
        let flag = Arc::clone(&self.scheduled);
        scheduler.schedule_once(Box::new(move || {
            flag.store(false, Ordering::SeqCst);
            job();
        }));
        true
    }
}
