//! Signal handling: SIGTERM/SIGINT stop the walk gracefully.
//!
//! Uses the `signal-hook` crate for safe signal registration. The walker polls
//! the shared flag between work items; migration children already running are
//! waited for normally.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::consts::{SIGINT, SIGTERM};

/// Stop flag shared between the signal handler and the walk workers.
#[derive(Clone)]
pub struct SignalHandler {
    stop_flag: Arc<AtomicBool>,
}

impl SignalHandler {
    /// Create a new handler and register OS signal hooks.
    ///
    /// Registration is best-effort; failures are logged to stderr but not fatal.
    pub fn new() -> Self {
        let handler = Self::unregistered();
        handler.register_signals();
        handler
    }

    /// A handler with no OS hooks.
    #[must_use]
    pub fn unregistered() -> Self {
        Self {
            stop_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The flag to hand to the walker as its cancellation flag.
    #[must_use]
    pub fn flag(&self) -> &AtomicBool {
        &self.stop_flag
    }

    /// An owned handle on the same flag, for the visitor.
    #[must_use]
    pub fn shared_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_flag)
    }

    fn register_signals(&self) {
        if let Err(e) = signal_hook::flag::register(SIGTERM, Arc::clone(&self.stop_flag)) {
            eprintln!("[OSTM-SIGNAL] failed to register SIGTERM: {e}");
        }
        if let Err(e) = signal_hook::flag::register(SIGINT, Arc::clone(&self.stop_flag)) {
            eprintln!("[OSTM-SIGNAL] failed to register SIGINT: {e}");
        }
    }
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}
