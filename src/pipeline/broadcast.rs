//! Broadcast Hub - fan-out of feed events to every connected viewer
//!
//! Each subscriber owns a bounded queue. A broadcast never awaits a
//! subscriber: delivery uses `try_send`, closed subscribers are collected
//! during the pass and removed after it, and a full queue drops that one event
//! for that one subscriber.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::types::FeedEvent;

/// Opaque subscriber handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// A subscriber's end of the hub.
pub struct Subscription {
    pub id: SubscriberId,
    pub rx: mpsc::Receiver<FeedEvent>,
}

/// Outcome of one broadcast pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    /// Subscribers whose queue was full; they missed this event only.
    pub dropped: usize,
    /// Subscribers found closed and removed after the pass.
    pub removed: usize,
}

pub struct BroadcastHub {
    subscribers: Mutex<HashMap<SubscriberId, mpsc::Sender<FeedEvent>>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl BroadcastHub {
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    pub async fn subscribe(&self) -> Subscription {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.buffer);
        let count = {
            let mut subs = self.subscribers.lock().await;
            subs.insert(id, tx);
            subs.len()
        };
        debug!(subscriber = %id, count, "[BroadcastHub] Subscriber joined");
        Subscription { id, rx }
    }

    /// Remove a subscriber. Returns `false` if it was already gone.
    pub async fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.subscribers.lock().await.remove(&id).is_some();
        if removed {
            debug!(subscriber = %id, "[BroadcastHub] Subscriber left");
        }
        removed
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    /// Deliver `event` to every subscriber without waiting on any of them.
    pub async fn broadcast(&self, event: &FeedEvent) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let mut subs = self.subscribers.lock().await;

        let mut closed = Vec::new();
        for (id, tx) in subs.iter() {
            match tx.try_send(event.clone()) {
                Ok(()) => report.delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    report.dropped += 1;
                    warn!(subscriber = %id, kind = event.kind(), "[BroadcastHub] Queue full, event dropped for subscriber");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(*id),
            }
        }

        for id in &closed {
            subs.remove(id);
        }
        report.removed = closed.len();
        drop(subs);

        if report.removed > 0 {
            debug!(removed = report.removed, "[BroadcastHub] Removed closed subscribers");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResumeNotice;
    use chrono::Utc;

    fn event() -> FeedEvent {
        FeedEvent::SystemResumed(ResumeNotice {
            downtime_seconds: 1.0,
            timestamp: Utc::now(),
        })
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all() {
        let hub = BroadcastHub::new(4);
        let mut a = hub.subscribe().await;
        let mut b = hub.subscribe().await;

        let report = hub.broadcast(&event()).await;
        assert_eq!(report.delivered, 2);
        assert!(a.rx.recv().await.is_some());
        assert!(b.rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_closed_subscriber_removed_others_unaffected() {
        let hub = BroadcastHub::new(4);
        let mut alive = hub.subscribe().await;
        let dead = hub.subscribe().await;
        drop(dead.rx);

        let report = hub.broadcast(&event()).await;
        assert_eq!(report, BroadcastReport { delivered: 1, dropped: 0, removed: 1 });
        assert_eq!(hub.subscriber_count().await, 1);
        assert!(alive.rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_full_queue_drops_event_but_keeps_subscriber() {
        let hub = BroadcastHub::new(1);
        let mut slow = hub.subscribe().await;

        hub.broadcast(&event()).await;
        let report = hub.broadcast(&event()).await;
        assert_eq!(report.dropped, 1);
        assert_eq!(hub.subscriber_count().await, 1);

        assert!(slow.rx.recv().await.is_some());
        assert!(slow.rx.try_recv().is_err());

        let report = hub.broadcast(&event()).await;
        assert_eq!(report.delivered, 1);
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let hub = BroadcastHub::new(4);
        let sub = hub.subscribe().await;
        assert!(hub.unsubscribe(sub.id).await);
        assert!(!hub.unsubscribe(sub.id).await);
        assert_eq!(hub.broadcast(&event()).await.delivered, 0);
    }
}
