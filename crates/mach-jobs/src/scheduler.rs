//! Job scheduler: a bounded pool of job servers
//!
//! Jobs are submitted with [`JobScheduler::schedule`] and come back through
//! [`JobScheduler::collect`] in completion order. The scheduler tracks how
//! many jobs are in flight so `collect` knows when everything has been
//! handed back, and remembers the status of the first failure.

use std::sync::Arc;

use tracing::debug;

use crate::{Job, JobChannel, JobError, JobId, JobServer};

/// Pool size used when the caller does not choose one
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Owner of a worker pool and its request/reply channels
#[derive(Debug)]
pub struct JobScheduler {
    concurrency: usize,
    request: Arc<JobChannel>,
    reply: Arc<JobChannel>,
    servers: Vec<JobServer>,
    outstanding: usize,
    status: i32,
}

impl JobScheduler {
    /// Create a scheduler that will run up to `concurrency` jobs at once
    ///
    /// No worker is started until [`start`](Self::start) or the first
    /// [`collect`](Self::collect).
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            request: Arc::new(JobChannel::new()),
            reply: Arc::new(JobChannel::new()),
            servers: Vec::new(),
            outstanding: 0,
            status: 0,
        }
    }

    pub fn with_default_concurrency() -> Self {
        Self::new(default_concurrency())
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn is_started(&self) -> bool {
        !self.servers.is_empty()
    }

    /// Spin up the worker pool. Calling it again is a no-op.
    pub fn start(&mut self) -> Result<(), JobError> {
        if self.is_started() {
            return Ok(());
        }
        for index in 0..self.concurrency {
            let server = JobServer::start(index, Arc::clone(&self.request), Arc::clone(&self.reply));
            match server {
                Ok(server) => self.servers.push(server),
                Err(e) => {
                    self.shutdown();
                    return Err(JobError::WorkerSpawn(e));
                }
            }
        }
        debug!(workers = self.concurrency, "job scheduler started");
        Ok(())
    }

    /// Queue a job for execution
    ///
    /// Jobs queued before [`start`](Self::start) wait in the request channel.
    pub fn schedule(&mut self, job: Job) -> JobId {
        let id = job.id();
        debug!(job = %id, command = job.command(), "scheduled");
        self.outstanding += 1;
        self.request.push_back(job);
        id
    }

    /// Wait for the next finished job
    ///
    /// Returns `None` once every scheduled job has been collected.
    pub fn collect(&mut self) -> Result<Option<Job>, JobError> {
        if self.outstanding == 0 {
            return Ok(None);
        }
        self.start()?;

        let Some(job) = self.reply.pop_front() else {
            return Ok(None);
        };
        self.outstanding -= 1;
        if self.status == 0 {
            if let Some(status) = job.status().filter(|s| *s != 0) {
                self.status = status;
            }
        }
        Ok(Some(job))
    }

    /// Number of scheduled jobs not yet collected
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Status of the first failing job collected so far, 0 if none failed
    pub fn status(&self) -> i32 {
        self.status
    }

    fn shutdown(&mut self) {
        if self.servers.is_empty() {
            return;
        }
        for _ in &self.servers {
            self.request.shutdown();
        }
        for server in self.servers.drain(..) {
            server.join();
        }
        debug!("job scheduler stopped");
    }
}

impl Drop for JobScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
