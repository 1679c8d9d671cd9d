//! Cooperative shutdown, replacing the stop-semaphore idiom with a
//! broadcastable cancellation flag built on [`tokio::sync::watch`].
//!
//! Every long-lived task (socket accept loop, per-shard owner, election
//! timer) is handed a [`ShutdownRx`] and is expected to `select!` on
//! [`ShutdownRx::signaled`] alongside its real work, returning as soon as it
//! fires rather than being torn down externally.

use tokio::sync::watch;

/// Owns the shutdown flag. Dropping this (or calling [`ShutdownTx::shutdown`])
/// signals every outstanding [`ShutdownRx`].
#[derive(Debug)]
pub struct ShutdownTx(watch::Sender<bool>);

/// A cloneable handle a task polls to learn whether shutdown has begun.
#[derive(Debug, Clone)]
pub struct ShutdownRx(watch::Receiver<bool>);

/// Construct a fresh shutdown flag and its first receiver.
pub fn channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTx(tx), ShutdownRx(rx))
}

impl ShutdownTx {
    /// Signal all receivers. Idempotent; calling it twice is a no-op the
    /// second time.
    pub fn shutdown(&self) {
        // A send error here means every receiver has already been dropped,
        // which is not a failure for the sender.
        let _ = self.0.send(true);
    }
}

impl ShutdownRx {
    /// Returns a new handle to the same shutdown flag.
    pub fn child(&self) -> ShutdownRx {
        ShutdownRx(self.0.clone())
    }

    /// True if shutdown has already been signaled.
    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once shutdown has been signaled. Safe to `select!` alongside
    /// other futures; cancellation-safe because `watch::Receiver::changed`
    /// is.
    pub async fn signaled(&mut self) {
        if self.is_shutdown() {
            return;
        }
        // Only `RecvError` (sender dropped without ever sending `true`)
        // reaches here, which for our purposes also means "shut down".
        let _ = self.0.changed().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn signaled_resolves_after_shutdown() {
        let (tx, mut rx) = channel();
        assert!(!rx.is_shutdown());

        let mut child = rx.child();
        tx.shutdown();

        rx.signaled().await;
        child.signaled().await;
        assert!(rx.is_shutdown());
        assert!(child.is_shutdown());
    }

    #[tokio::test]
    async fn signaled_is_immediate_if_already_shut_down() {
        let (tx, mut rx) = channel();
        tx.shutdown();
        // Must not hang even though no further sends occur.
        rx.signaled().await;
    }

    #[tokio::test]
    async fn dropping_the_sender_also_unblocks_receivers() {
        let (tx, mut rx) = channel();
        drop(tx);
        rx.signaled().await;
    }
}
