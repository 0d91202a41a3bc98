//! Cooperative cancellation shared between the Ctrl-C handler and the session

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cleared-until-cancelled flag; clones share the same state.
///
/// Nothing is aborted forcibly: loops poll `is_cancelled` at their own
/// checkpoints, so a blocking socket read delays observation until it returns.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        !self.is_cancelled()
    }

    /// Route Ctrl-C into this token instead of killing the process
    pub fn install_ctrlc_handler(&self) -> Result<()> {
        let token = self.clone();
        ctrlc::set_handler(move || {
            eprintln!("\nCtrl+C pressed. Exiting...");
            token.cancel();
        })
        .context("Error setting Ctrl-C handler")
    }
}
