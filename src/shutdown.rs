//! Cooperative shutdown token
//!
//! A clonable handle shared between the poller, the fetcher, and the API
//! server. Every wait in the poll loop selects against `cancelled()` so a
//! shutdown wakes the loop immediately instead of letting delays elapse.

use std::time::Duration;
use tokio::sync::watch;

/// Clonable shutdown token backed by a watch channel
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx, rx }
    }

    /// Signal shutdown to all clones
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    /// Whether shutdown has been signaled
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown is signaled
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if *rx.borrow() {
            return;
        }
        // The sender half lives inside every clone, so changed() only fails
        // after trigger() has already been observed.
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
    }

    /// Sleep for `duration` unless shutdown fires first.
    ///
    /// Returns true if shutdown interrupted the sleep.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            _ = self.cancelled() => true,
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
