//! Blocking FIFO of jobs shared between the scheduler and its workers

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};

use crate::Job;

/// Thread-safe job queue
///
/// `None` entries are shutdown sentinels. They are queued at the front so a
/// worker sees them before any pending work.
#[derive(Debug, Default)]
pub struct JobChannel {
    queue: Mutex<VecDeque<Option<Job>>>,
    available: Condvar,
}

impl JobChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a job at the back of the queue
    pub fn push_back(&self, job: Job) {
        self.push(Some(job), false);
    }

    /// Insert a job ahead of everything already queued
    pub fn push_front(&self, job: Job) {
        self.push(Some(job), true);
    }

    /// Queue a shutdown sentinel for one consumer
    pub fn shutdown(&self) {
        self.push(None, true);
    }

    /// Remove the first item, blocking while the queue is empty
    ///
    /// Returns `None` when the consumer popped a shutdown sentinel and must
    /// stop.
    pub fn pop_front(&self) -> Option<Job> {
        let mut queue = self.lock();
        loop {
            if let Some(item) = queue.pop_front() {
                return item;
            }
            queue = match self.available.wait(queue) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    /// Number of queued items, sentinels included
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, item: Option<Job>, front: bool) {
        let mut queue = self.lock();
        if front {
            queue.push_front(item);
        } else {
            queue.push_back(item);
        }
        drop(queue);
        self.available.notify_one();
    }

    // Queue contents stay valid even if a holder panicked.
    fn lock(&self) -> MutexGuard<'_, VecDeque<Option<Job>>> {
        match self.queue.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
