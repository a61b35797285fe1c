//! Lifecycle notifications
//!
//! Notifications are fire-and-forget: the runner logs a failed delivery
//! and carries on.

use std::sync::{Mutex, PoisonError};

use tracing::info;

use crate::Result;

/// Receiver of human-readable lifecycle messages (chat, pager, ...).
pub trait Notifier: Send + Sync {
    /// Deliver `message`.
    ///
    /// # Errors
    ///
    /// Returns an error if delivery failed. Callers ignore it after logging.
    fn notify(&self, message: &str) -> Result<()>;
}

/// Routes notifications to the `tracing` log at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, message: &str) -> Result<()> {
        info!(target: "chaos_harness::notify", "{message}");
        Ok(())
    }
}

/// Keeps every notification in memory.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    messages: Mutex<Vec<String>>,
}

impl MemoryNotifier {
    /// Create an empty notifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages received so far, oldest first.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, message: &str) -> Result<()> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_string());
        Ok(())
    }
}
