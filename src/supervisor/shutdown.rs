//! Process-wide shutdown broadcast.
//!
//! One [`Shutdown`] is created at startup and closed exactly once. Every
//! dispatch loop holds a [`ShutdownSignal`] and races it against each
//! blocking point.

use tokio::sync::watch;

/// Owner side of the shutdown broadcast.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// New observer handle.
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Close the signal. Returns `true` only for the call that performed the
    /// open → closed transition.
    pub fn trigger(&self) -> bool {
        self.tx.send_if_modified(|closed| {
            if *closed {
                false
            } else {
                *closed = true;
                true
            }
        })
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side of the shutdown broadcast. Cheap to clone.
///
/// A dropped [`Shutdown`] counts as closed.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn is_set(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolve once shutdown has been signalled. Cancel-safe.
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn trigger_transitions_once() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.is_triggered());
        assert!(shutdown.trigger());
        assert!(!shutdown.trigger());
        assert!(shutdown.is_triggered());
    }

    #[test]
    fn signal_observes_trigger() {
        let shutdown = Shutdown::new();
        let signal = shutdown.signal();
        assert!(!signal.is_set());
        shutdown.trigger();
        assert!(signal.is_set());
        assert!(signal.clone().is_set());
    }

    #[tokio::test]
    async fn wait_resolves_after_trigger() {
        let shutdown = Shutdown::new();
        let signal = shutdown.signal();
        let waiter = tokio::spawn(async move { signal.wait().await });
        tokio::task::yield_now().await;
        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("wait should resolve")
            .unwrap();
    }

    #[tokio::test]
    async fn wait_resolves_immediately_when_already_set() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        let signal = shutdown.signal();
        tokio::time::timeout(Duration::from_millis(50), signal.wait())
            .await
            .expect("already-set signal should not block");
    }

    #[tokio::test]
    async fn dropped_owner_counts_as_shutdown() {
        let shutdown = Shutdown::new();
        let signal = shutdown.signal();
        drop(shutdown);
        assert!(signal.is_set());
        tokio::time::timeout(Duration::from_millis(50), signal.wait())
            .await
            .expect("closed channel should release waiters");
    }
}
