//! Job server: a worker thread that runs jobs as external processes
//!
//! Each server loops popping jobs from a request channel, runs the command
//! through the platform shell, records status and combined output, and
//! pushes the finished job onto the reply channel. A shutdown sentinel stops
//! the loop.

use std::io::{self, BufRead, BufReader, Read};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{debug, trace};

use crate::{Job, JobChannel, STATUS_SPAWN_FAILED};

/// Handle to one running worker thread
#[derive(Debug)]
pub struct JobServer {
    index: usize,
    handle: Option<JoinHandle<()>>,
}

impl JobServer {
    /// Start a worker serving `request` and answering on `reply`
    pub fn start(
        index: usize,
        request: Arc<JobChannel>,
        reply: Arc<JobChannel>,
    ) -> io::Result<Self> {
        let handle = thread::Builder::new()
            .name(format!("mach-job-{}", index))
            .spawn(move || serve(index, &request, &reply))?;

        Ok(Self {
            index,
            handle: Some(handle),
        })
    }

    /// Wait for the worker to stop
    ///
    /// The caller must already have queued a shutdown sentinel for this
    /// worker, otherwise this blocks forever.
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                debug!(worker = self.index, "job server thread panicked");
            }
        }
    }
}

fn serve(index: usize, request: &JobChannel, reply: &JobChannel) {
    debug!(worker = index, "job server started");
    while let Some(mut job) = request.pop_front() {
        trace!(worker = index, job = %job.id(), command = job.command(), "executing");
        execute(&mut job);
        debug!(worker = index, job = %job.id(), status = ?job.status(), "job finished");
        reply.push_back(job);
    }
    debug!(worker = index, "job server stopped");
}

/// Run a job's command synchronously and record its result on the job
///
/// Never fails: spawn and wait errors are recorded as
/// [`STATUS_SPAWN_FAILED`] with the error text as output.
pub fn execute(job: &mut Job) {
    let mut command = shell_command(job.command());
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            let message = format!("failed to spawn `{}`: {}", job.command(), e);
            job.finish(STATUS_SPAWN_FAILED, message);
            return;
        }
    };

    let output = Arc::new(Mutex::new(Vec::new()));
    let readers: Vec<_> = [
        child.stdout.take().map(|s| Box::new(s) as Box<dyn Read + Send>),
        child.stderr.take().map(|s| Box::new(s) as Box<dyn Read + Send>),
    ]
    .into_iter()
    .flatten()
    .map(|stream| {
        let output = Arc::clone(&output);
        thread::spawn(move || collect_lines(stream, &output))
    })
    .collect();

    let waited = child.wait();
    for reader in readers {
        let _ = reader.join();
    }

    let text = match output.lock() {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(poisoned) => String::from_utf8_lossy(&poisoned.into_inner()).into_owned(),
    };

    match waited {
        Ok(status) => job.finish(exit_status_code(status), text),
        Err(e) => job.finish(STATUS_SPAWN_FAILED, format!("{}failed to wait for process: {}", text, e)),
    }
}

/// Append whole lines from `stream` to the shared output buffer
fn collect_lines(stream: Box<dyn Read + Send>, output: &Mutex<Vec<u8>>) {
    let mut reader = BufReader::new(stream);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                if let Ok(mut buffer) = output.lock() {
                    buffer.extend_from_slice(&line);
                }
            }
        }
    }
}

#[cfg(unix)]
fn shell_command(command_line: &str) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(command_line);
    command
}

#[cfg(not(unix))]
fn shell_command(command_line: &str) -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg(command_line);
    command
}

fn exit_status_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    STATUS_SPAWN_FAILED
}
