//! Interrupt handling (SIGINT/SIGTERM)
//!
//! The first interrupt raises a flag the build phases poll before scheduling
//! more work; jobs already running are left to finish and are collected as
//! usual. A second interrupt asks for an immediate exit.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

/// Exit code used when the build stops on an interrupt
pub const EXIT_CODE_INTERRUPTED: i32 = 130;

/// Action to take after receiving a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// First signal: schedule nothing new, let running jobs drain
    StopScheduling,
    /// Second signal: exit now
    ImmediateExit,
    /// Third+ signal: ignore
    Ignore,
}

/// Shared interrupt state
#[derive(Debug, Default)]
pub struct SignalState {
    interrupted: Arc<AtomicBool>,
    signal_count: AtomicU8,
}

impl SignalState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag handed to a build session
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupted)
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    pub fn signal_count(&self) -> u8 {
        self.signal_count.load(Ordering::SeqCst)
    }

    /// Record one received signal
    pub fn handle_signal(&self) -> SignalAction {
        match self.signal_count.fetch_add(1, Ordering::SeqCst) {
            0 => {
                self.interrupted.store(true, Ordering::SeqCst);
                SignalAction::StopScheduling
            }
            1 => SignalAction::ImmediateExit,
            _ => SignalAction::Ignore,
        }
    }
}

/// Install the process-wide handler
///
/// Must be called at most once per process.
pub fn install(state: Arc<SignalState>) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || match state.handle_signal() {
        SignalAction::StopScheduling => {
            eprintln!("\nmach: interrupted, waiting for running jobs...");
        }
        SignalAction::ImmediateExit => {
            eprintln!("\nmach: interrupted again, exiting");
            std::process::exit(EXIT_CODE_INTERRUPTED);
        }
        SignalAction::Ignore => {}
    })
}
