//! Job: one external command invocation
//!
//! A job is created by the scheduling caller, executed exactly once by a
//! worker and handed back. Ownership moves along the channels, so a job is
//! never touched by two threads at once.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Status recorded when the process could not be spawned or waited for
pub const STATUS_SPAWN_FAILED: i32 = -255;

/// Process-wide counter for job identifiers
static JOB_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier of a job within one process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

impl JobId {
    fn next() -> Self {
        JobId(JOB_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job#{}", self.0)
    }
}

/// How a finished job's process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Process exited normally with this code
    Exited(i32),
    /// Process was killed by this signal
    Signaled(i32),
    /// Process could not be started or reaped
    SpawnFailed,
}

/// A unit of external work
#[derive(Debug, Clone)]
pub struct Job {
    id: JobId,
    command: String,
    pub(crate) status: Option<i32>,
    pub(crate) output: String,
}

impl Job {
    /// Create an unfinished job for a shell command line
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            id: JobId::next(),
            command: command.into(),
            status: None,
            output: String::new(),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Exit status, `None` until the job has run
    ///
    /// Non-negative values are process exit codes. A process killed by signal
    /// `N` reports `-N`, and [`STATUS_SPAWN_FAILED`] marks a process that
    /// never ran.
    pub fn status(&self) -> Option<i32> {
        self.status
    }

    /// Combined stdout and stderr of the process
    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_some()
    }

    /// True once the job finished with status 0
    pub fn succeeded(&self) -> bool {
        self.status == Some(0)
    }

    /// Decode the recorded status
    pub fn termination(&self) -> Option<Termination> {
        self.status.map(|status| match status {
            STATUS_SPAWN_FAILED => Termination::SpawnFailed,
            s if s < 0 => Termination::Signaled(-s),
            s => Termination::Exited(s),
        })
    }

    /// Human-readable outcome, `not run` for an unfinished job
    pub fn outcome(&self) -> String {
        self.termination()
            .map_or_else(|| "not run".to_string(), |t| t.to_string())
    }

    /// Mark the job as finished without running it
    ///
    /// Used for dry runs, where the caller still wants a finished job to
    /// translate into build metadata.
    pub fn finish(&mut self, status: i32, output: impl Into<String>) {
        self.status = Some(status);
        self.output = output.into();
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Exited(code) => write!(f, "exit status {}", code),
            Termination::Signaled(signal) => write!(f, "killed by signal {}", signal),
            Termination::SpawnFailed => write!(f, "failed to spawn"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_is_unfinished() {
        let job = Job::new("cc -c a.c");
        assert_eq!(job.command(), "cc -c a.c");
        assert!(!job.is_finished());
        assert!(!job.succeeded());
        assert!(job.termination().is_none());
        assert!(job.output().is_empty());
    }

    #[test]
    fn test_job_ids_are_unique() {
        let a = Job::new("true");
        let b = Job::new("true");
        assert_ne!(a.id(), b.id());
        assert!(b.id() > a.id());
    }

    #[test]
    fn test_termination_decoding() {
        let mut job = Job::new("x");
        job.finish(0, "");
        assert_eq!(job.termination(), Some(Termination::Exited(0)));
        assert!(job.succeeded());

        job.finish(2, "boom");
        assert_eq!(job.termination(), Some(Termination::Exited(2)));
        assert!(!job.succeeded());

        job.finish(-9, "");
        assert_eq!(job.termination(), Some(Termination::Signaled(9)));

        job.finish(STATUS_SPAWN_FAILED, "no such shell");
        assert_eq!(job.termination(), Some(Termination::SpawnFailed));
        assert_eq!(job.output(), "no such shell");
    }

    #[test]
    fn test_termination_display() {
        assert_eq!(Termination::Exited(1).to_string(), "exit status 1");
        assert_eq!(Termination::Signaled(11).to_string(), "killed by signal 11");
        assert_eq!(Termination::SpawnFailed.to_string(), "failed to spawn");
    }

    #[test]
    fn test_outcome() {
        let mut job = Job::new("x");
        assert_eq!(job.outcome(), "not run");
        job.finish(-15, "");
        assert_eq!(job.outcome(), "killed by signal 15");
    }
}
