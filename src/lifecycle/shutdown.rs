//! Shutdown coordination for the proxy.
//!
//! One process-wide latch: the first `trigger` broadcasts to every
//! subscriber, later calls are no-ops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

#[derive(Debug)]
struct Latch {
    tx: broadcast::Sender<()>,
    fired: AtomicBool,
}

/// Fire-once shutdown broadcast, shared by cloning.
#[derive(Debug, Clone)]
pub struct Shutdown {
    latch: Arc<Latch>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            latch: Arc::new(Latch {
                tx,
                fired: AtomicBool::new(false),
            }),
        }
    }

    /// Receiver that yields once when shutdown starts.
    ///
    /// Subscribe before triggering; a receiver created afterwards never fires,
    /// check `is_triggered` instead.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.latch.tx.subscribe()
    }

    /// Start shutdown. Returns `false` if it was already started.
    pub fn trigger(&self) -> bool {
        if self.latch.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        let listeners = self.latch.tx.send(()).unwrap_or(0);
        tracing::info!(listeners, "Shutdown triggered");
        true
    }

    pub fn is_triggered(&self) -> bool {
        self.latch.fired.load(Ordering::Acquire)
    }

    /// Number of tasks still listening.
    pub fn receiver_count(&self) -> usize {
        self.latch.tx.receiver_count()
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
    use tokio::sync::broadcast::error::TryRecvError;

    #[tokio::test]
    async fn test_trigger_reaches_subscribers_once() {
        let shutdown = Shutdown::new();
        let mut a = shutdown.subscribe();
        let mut b = shutdown.clone().subscribe();
        assert_eq!(shutdown.receiver_count(), 2);

        assert!(shutdown.trigger());
        assert!(!shutdown.clone().trigger());
        assert!(shutdown.is_triggered());

        assert!(a.recv().await.is_ok());
        assert!(b.recv().await.is_ok());
        assert_eq!(a.try_recv(), Err(TryRecvError::Empty));
        assert_eq!(b.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn test_trigger_without_subscribers() {
        let shutdown = Shutdown::default();
        assert!(!shutdown.is_triggered());
        assert!(shutdown.trigger());
        assert!(shutdown.is_triggered());
    }
}
