//! Parallel job execution for mach
//!
//! A [`JobScheduler`] owns a pool of [`JobServer`] threads. Work is handed to
//! the pool through a shared request [`JobChannel`] and finished jobs come
//! back through a shared reply channel, in whatever order the external
//! processes complete.

mod channel;
mod job;
mod scheduler;
mod server;

pub use channel::JobChannel;
pub use job::{Job, JobId, Termination, STATUS_SPAWN_FAILED};
pub use scheduler::{default_concurrency, JobScheduler};
pub use server::{execute, JobServer};

/// Errors raised while managing the worker pool
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("failed to start job server thread: {0}")]
    WorkerSpawn(#[from] std::io::Error),
}
