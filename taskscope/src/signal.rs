//! Single-fire notification observed by everything waiting on a scope.

use tokio::sync::watch;

/// Observer handle for a scope's end-of-life notification.
///
/// A signal starts open and closes at most once, when the scope it belongs
/// to ends. Every clone observes the same transition, and observing is
/// level-triggered: a signal obtained after the scope already ended reports
/// closed immediately.
#[derive(Clone, Debug)]
pub struct Signal {
    rx: watch::Receiver<bool>,
}

impl Signal {
    pub(crate) fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    /// Returns whether the owning scope has ended.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.rx.borrow()
    }

    /// Completes when the owning scope ends.
    ///
    /// Resolves immediately if the scope already ended. If the scope is
    /// dropped without ever being cancelled the signal can no longer close,
    /// and this future never completes.
    pub async fn closed(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // Sender gone while still open: nothing can close this
                // signal any more.
                std::future::pending::<()>().await;
            }
        }
    }

    /// Completes when the owning scope ends or is dropped while still open.
    ///
    /// Internal variant of [`closed`](Self::closed) for watcher tasks, which
    /// must exit rather than park forever when their scope disappears.
    pub(crate) async fn closed_or_lost(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use tokio_test::{assert_pending, assert_ready, task};

    fn open_signal() -> (watch::Sender<bool>, Signal) {
        let (tx, rx) = watch::channel(false);
        (tx, Signal::new(rx))
    }

    #[test]
    fn test_signal_starts_open() {
        let (_tx, signal) = open_signal();
        assert!(!signal.is_closed());
    }

    #[test]
    fn test_close_wakes_waiter() {
        let (tx, signal) = open_signal();

        let mut waiter = task::spawn(signal.closed());
        assert_pending!(waiter.poll());

        tx.send_replace(true);
        assert!(waiter.is_woken());
        assert_ready!(waiter.poll());
    }

    #[test]
    fn test_late_observer_sees_closed() {
        let (tx, signal) = open_signal();
        tx.send_replace(true);

        assert!(signal.is_closed());
        assert!(signal.closed().now_or_never().is_some());
    }

    #[test]
    fn test_clones_share_the_transition() {
        let (tx, signal) = open_signal();
        let twin = signal.clone();

        tx.send_replace(true);
        assert!(signal.is_closed());
        assert!(twin.is_closed());
        assert!(twin.closed().now_or_never().is_some());
    }

    #[test]
    fn test_lost_sender_leaves_closed_pending() {
        let (tx, signal) = open_signal();

        let mut waiter = task::spawn(signal.closed());
        assert_pending!(waiter.poll());

        // Dropping the sender while open means the signal can never close;
        // the public waiter stays pending.
        drop(tx);
        assert_pending!(waiter.poll());
    }

    #[test]
    fn test_closed_or_lost_returns_on_lost_sender() {
        let (tx, signal) = open_signal();

        let mut waiter = task::spawn(async move { signal.closed_or_lost().await });
        assert_pending!(waiter.poll());

        drop(tx);
        assert!(waiter.is_woken());
        assert_ready!(waiter.poll());
    }

    #[test]
    fn test_closed_or_lost_returns_on_close() {
        let (tx, signal) = open_signal();
        tx.send_replace(true);

        assert!(signal.closed_or_lost().now_or_never().is_some());
    }
}
