//! Shutdown coordination for the transport layer.

use std::sync::Arc;

use tokio::sync::watch;

/// Handle for the exit signal that aborts in-flight receives.
///
/// Wraps a watch channel so the signal is level-triggered: receives that are
/// already suspended wake up and abort, and receives issued after the
/// trigger abort immediately. Clones share the same channel.
#[derive(Clone)]
pub struct Shutdown {
    /// Watch channel sender; `true` once triggered.
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    /// Create a new, untriggered shutdown handle.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Trigger the signal. Idempotent.
    ///
    /// The value is replaced even when no receiver is subscribed yet, so
    /// the latch is never lost to an early trigger.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Whether the signal has already fired.
    pub fn has_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trigger_is_visible_to_existing_and_new_subscribers() {
        let shutdown = Shutdown::new();
        let mut early = shutdown.subscribe();
        assert!(!*early.borrow());

        shutdown.trigger();

        early.changed().await.unwrap();
        assert!(*early.borrow());

        let late = shutdown.subscribe();
        assert!(*late.borrow());
        assert!(shutdown.has_triggered());
    }

    #[test]
    fn trigger_with_no_subscribers_still_latches() {
        let shutdown = Shutdown::new();
        shutdown.trigger();

        assert!(shutdown.has_triggered());
        let late = shutdown.subscribe();
        assert!(*late.borrow());
    }
}
