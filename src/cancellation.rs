//! Cooperative cancellation
//!
//! An interrupt does not kill the archiver. The first SIGINT/SIGTERM only asks
//! the run to wind down after the current download; a second one forces the
//! in-flight downloader process to be killed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
struct CancellationState {
    stop_requested: AtomicBool,
    forced: AtomicBool,
    child_running: AtomicBool,
}

/// Shared stop flag checked by the orchestrator at well-defined points
///
/// Cloning yields another handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    state: Arc<CancellationState>,
}

/// What an interrupt signal escalated to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// First signal: finish the current download, then stop
    GracefulStop,
    /// Repeated signal: abort immediately
    ForceQuit,
}

impl CancellationToken {
    /// Creates a token with no stop requested
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks the run to stop at the next suspension point
    pub fn request_stop(&self) {
        self.state.stop_requested.store(true, Ordering::SeqCst);
    }

    /// Whether a stop has been requested
    pub fn is_stop_requested(&self) -> bool {
        self.state.stop_requested.load(Ordering::SeqCst)
    }

    /// Whether the in-flight download must be aborted
    pub fn is_forced(&self) -> bool {
        self.state.forced.load(Ordering::SeqCst)
    }

    /// Handles one interrupt signal
    ///
    /// The first call requests a graceful stop, every later call forces.
    pub fn interrupt(&self) -> Interrupt {
        if self.state.stop_requested.swap(true, Ordering::SeqCst) {
            self.state.forced.store(true, Ordering::SeqCst);
            Interrupt::ForceQuit
        } else {
            Interrupt::GracefulStop
        }
    }

    /// Whether a downloader process is currently running
    pub fn is_child_running(&self) -> bool {
        self.state.child_running.load(Ordering::SeqCst)
    }

    /// Marks a downloader process as running until the guard is dropped
    pub(crate) fn track_child(&self) -> ChildGuard {
        self.state.child_running.store(true, Ordering::SeqCst);
        ChildGuard {
            token: self.clone(),
        }
    }
}

/// Clears the "child running" flag on drop
pub(crate) struct ChildGuard {
    token: CancellationToken,
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        self.token
            .state
            .child_running
            .store(false, Ordering::SeqCst);
    }
}

/// Routes SIGINT and SIGTERM into `token`
///
/// On a forced quit with no downloader running there is nothing to wind down,
/// so the process exits right away with status 1. With a downloader running,
/// the invoker notices the forced flag, kills the child and the run aborts.
pub fn install_signal_handler(token: CancellationToken) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || match token.interrupt() {
        Interrupt::GracefulStop => {
            eprintln!("\nGraceful stop requested. Finishing current download...");
        }
        Interrupt::ForceQuit => {
            eprintln!("\nForce quit!");
            if !token.is_child_running() {
                std::process::exit(1);
            }
        }
    })
}
