//! In-memory event bridge
//!
//! EventBridge stores published events in a Vec for replay and uses a
//! broadcast channel for live subscribers. Publishing is synchronous so it
//! can happen while other state is locked, which keeps a state change and
//! its event atomic with respect to other callers.

use std::sync::{Mutex, MutexGuard};

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::trace;

use super::BridgeEvent;

/// Sequence number for events (monotonically increasing)
pub type EventSeq = u64;

/// Default broadcast channel capacity
pub const DEFAULT_CAPACITY: usize = 256;

struct History {
    events: Vec<(EventSeq, BridgeEvent)>,
    next_seq: EventSeq,
}

/// Publish/subscribe surface for [`BridgeEvent`]s
///
/// Subscribers see every event published after they subscribe, in publish
/// order. Late joiners can replay with [`EventBridge::events_from`].
pub struct EventBridge {
    history: Mutex<History>,
    tx: broadcast::Sender<(EventSeq, BridgeEvent)>,
}

impl EventBridge {
    /// Create a new EventBridge with the given broadcast channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            history: Mutex::new(History {
                events: Vec::new(),
                next_seq: 0,
            }),
            tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, History> {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Publish an event, returns its sequence number
    pub fn publish(&self, event: BridgeEvent) -> EventSeq {
        let mut history = self.lock();
        let seq = history.next_seq;
        history.next_seq += 1;
        history.events.push((seq, event.clone()));

        trace!(seq, event = event.name(), "Bridge event published");

        // Sent under the lock so live order matches sequence order
        let _ = self.tx.send((seq, event));
        seq
    }

    /// Subscribe to all events from now (live stream)
    pub fn subscribe(&self) -> broadcast::Receiver<(EventSeq, BridgeEvent)> {
        self.tx.subscribe()
    }

    /// Get all events starting from a sequence number (for replay)
    pub fn events_from(&self, seq: EventSeq) -> Vec<(EventSeq, BridgeEvent)> {
        self.lock()
            .events
            .iter()
            .filter(|(s, _)| *s >= seq)
            .cloned()
            .collect()
    }

    /// Current sequence number (high water mark)
    pub fn current_seq(&self) -> EventSeq {
        self.lock().next_seq
    }

    /// Wait for the first event at or after `from` matching `predicate`
    ///
    /// Already-published events are checked first, so an event published
    /// between taking `from` and calling this is never missed.
    pub async fn wait_for<F>(&self, from: EventSeq, predicate: F) -> (EventSeq, BridgeEvent)
    where
        F: Fn(&BridgeEvent) -> bool,
    {
        let mut rx = self.subscribe();
        let mut cursor = from;

        loop {
            for (seq, event) in self.events_from(cursor) {
                if predicate(&event) {
                    return (seq, event);
                }
                cursor = seq + 1;
            }

            match rx.recv().await {
                Ok((seq, event)) if seq >= cursor => {
                    if predicate(&event) {
                        return (seq, event);
                    }
                    cursor = seq + 1;
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                // The bridge owns the sender, so the channel outlives `self`
                Err(RecvError::Closed) => std::future::pending::<()>().await,
            }
        }
    }
}

impl Default for EventBridge {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    fn uri(n: u32) -> BridgeEvent {
        BridgeEvent::Uri {
            uri: format!("wc:{n}@2"),
        }
    }

    // ==================== Publish Tests ====================

    #[test]
    fn publish_returns_sequence_number() {
        let bridge = EventBridge::default();
        assert_eq!(bridge.publish(BridgeEvent::Init), 0);
        assert_eq!(bridge.publish(uri(1)), 1);
        assert_eq!(bridge.current_seq(), 2);
    }

    #[test]
    fn publish_without_subscribers_still_records() {
        let bridge = EventBridge::default();
        bridge.publish(BridgeEvent::Init);
        assert_eq!(bridge.events_from(0).len(), 1);
    }

    // ==================== Subscribe Tests ====================

    #[tokio::test]
    async fn subscribe_receives_events_in_order() {
        let bridge = EventBridge::default();
        let mut rx = bridge.subscribe();

        bridge.publish(BridgeEvent::Init);
        bridge.publish(uri(1));

        let (seq1, first) = rx.recv().await.unwrap();
        let (seq2, second) = rx.recv().await.unwrap();
        assert_eq!((seq1, seq2), (0, 1));
        assert_eq!(first, BridgeEvent::Init);
        assert_eq!(second, uri(1));
    }

    #[tokio::test]
    async fn subscriber_does_not_see_earlier_events() {
        let bridge = EventBridge::default();
        bridge.publish(BridgeEvent::Init);
        let mut rx = bridge.subscribe();
        bridge.publish(uri(2));

        let (seq, _) = rx.recv().await.unwrap();
        assert_eq!(seq, 1);
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_events() {
        let bridge = EventBridge::default();
        let mut rx1 = bridge.subscribe();
        let mut rx2 = bridge.subscribe();

        bridge.publish(BridgeEvent::Init);

        assert_eq!(rx1.recv().await.unwrap().0, 0);
        assert_eq!(rx2.recv().await.unwrap().0, 0);
    }

    // ==================== Replay Tests ====================

    #[test]
    fn events_from_returns_events_starting_at_seq() {
        let bridge = EventBridge::default();
        bridge.publish(BridgeEvent::Init);
        bridge.publish(uri(1));
        bridge.publish(uri(2));

        let events = bridge.events_from(1);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].0, 1);
        assert!(bridge.events_from(10).is_empty());
    }

    // ==================== Wait Tests ====================

    #[tokio::test]
    async fn wait_for_finds_already_published_event() {
        let bridge = EventBridge::default();
        bridge.publish(BridgeEvent::Init);
        bridge.publish(uri(7));

        let (seq, event) = bridge
            .wait_for(0, |e| matches!(e, BridgeEvent::Uri { .. }))
            .await;
        assert_eq!(seq, 1);
        assert_eq!(event, uri(7));
    }

    #[tokio::test]
    async fn wait_for_waits_for_future_event() {
        let bridge = Arc::new(EventBridge::default());
        let publisher = Arc::clone(&bridge);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            publisher.publish(BridgeEvent::Close {
                topic: "t".to_string(),
            });
        });

        let (_, event) = tokio::time::timeout(
            Duration::from_secs(1),
            bridge.wait_for(0, |e| matches!(e, BridgeEvent::Close { .. })),
        )
        .await
        .unwrap();
        assert_eq!(event.topic(), Some("t"));
    }

    #[tokio::test]
    async fn wait_for_skips_events_before_cursor() {
        let bridge = EventBridge::default();
        bridge.publish(uri(1));
        let from = bridge.current_seq();
        bridge.publish(uri(2));

        let (seq, event) = bridge
            .wait_for(from, |e| matches!(e, BridgeEvent::Uri { .. }))
            .await;
        assert_eq!(seq, 1);
        assert_eq!(event, uri(2));
    }

    // ==================== Concurrent Access Tests ====================

    #[tokio::test]
    async fn concurrent_publish_maintains_sequence_integrity() {
        let bridge = Arc::new(EventBridge::new(1000));
        let mut handles = vec![];

        for _ in 0..10 {
            let bridge = Arc::clone(&bridge);
            handles.push(tokio::spawn(async move {
                for _ in 0..10 {
                    bridge.publish(BridgeEvent::Init);
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(bridge.current_seq(), 100);
        let seqs: Vec<_> = bridge.events_from(0).iter().map(|(s, _)| *s).collect();
        assert_eq!(seqs, (0..100u64).collect::<Vec<_>>());
    }
}
