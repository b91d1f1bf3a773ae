//! Multi-subscriber change feed.
//!
//! Used by the local store to announce mutations and by remote stores to
//! push live snapshots. Subscribing returns a channel receiver; dropping
//! the receiver unsubscribes.
//!
//! # Usage
//!
//! ```rust
//! use tasksync_core::ChangeFeed;
//!
//! let feed = ChangeFeed::new();
//! let mut rx = feed.subscribe();
//!
//! feed.emit(42u32);
//! assert_eq!(rx.try_recv().unwrap(), 42);
//!
//! drop(rx);
//! feed.emit(43);
//! assert_eq!(feed.subscriber_count(), 0);
//! ```

use parking_lot::RwLock;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// A change feed that distributes events to every live subscriber.
///
/// The change feed:
/// - Delivers each event at least once to each subscriber alive at emit time
/// - Preserves emit order per subscriber
/// - Never blocks the emitter (channels are unbounded)
/// - Drops disconnected subscribers lazily on the next emit
pub struct ChangeFeed<E> {
    subscribers: RwLock<Vec<UnboundedSender<E>>>,
}

impl<E: Clone> ChangeFeed<E> {
    /// Creates a change feed with no subscribers.
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Subscribes to all future events.
    pub fn subscribe(&self) -> UnboundedReceiver<E> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Emits an event to all subscribers, removing disconnected ones.
    pub fn emit(&self, event: E) {
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Returns the number of subscribers that were alive at the last emit.
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }
}

impl<E: Clone> Default for ChangeFeed<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiple_subscribers() {
        let feed = ChangeFeed::new();
        let mut rx1 = feed.subscribe();
        let mut rx2 = feed.subscribe();

        feed.emit("a");
        assert_eq!(rx1.try_recv().unwrap(), "a");
        assert_eq!(rx2.try_recv().unwrap(), "a");
    }

    #[test]
    fn preserves_order() {
        let feed = ChangeFeed::new();
        let mut rx = feed.subscribe();
        for i in 0..5 {
            feed.emit(i);
        }
        let got: Vec<_> = (0..5).map(|_| rx.try_recv().unwrap()).collect();
        assert_eq!(got, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn dropped_receiver_unsubscribes() {
        let feed = ChangeFeed::new();
        let rx = feed.subscribe();
        let _keep = feed.subscribe();
        assert_eq!(feed.subscriber_count(), 2);

        drop(rx);
        feed.emit(1);
        assert_eq!(feed.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn async_receive() {
        let feed = std::sync::Arc::new(ChangeFeed::new());
        let mut rx = feed.subscribe();

        let emitter = std::sync::Arc::clone(&feed);
        tokio::spawn(async move { emitter.emit(7u8) });

        assert_eq!(rx.recv().await, Some(7));
    }
}
