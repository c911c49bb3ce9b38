//! Qualifying-lead event fan-out.
//!
//! Each subscriber owns an unbounded channel, so events reach every live
//! subscriber in publish order. A send that fails (receiver gone) removes
//! that subscriber; the publisher never sees an error. Dropping a
//! [`Subscription`] unsubscribes it. [`LeadFanout::close`] ends every
//! subscription, which lets long-lived event streams finish on shutdown.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

use leadwatch_core::models::LeadEvent;

/// The narrow capability the scheduler depends on.
pub trait LeadPublisher: Send + Sync {
    /// Deliver `event` to every current subscriber; returns how many received it.
    fn publish(&self, event: &LeadEvent) -> usize;
}

pub type SubscriptionId = u64;

#[derive(Default)]
struct Registry {
    next_id: SubscriptionId,
    subscribers: HashMap<SubscriptionId, mpsc::UnboundedSender<LeadEvent>>,
    closed: bool,
}

/// In-process subscriber set. Cheap to clone; clones share the same set.
#[derive(Clone, Default)]
pub struct LeadFanout {
    registry: Arc<Mutex<Registry>>,
}

impl LeadFanout {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut registry = self.registry();
            registry.next_id += 1;
            let id = registry.next_id;
            // after close the sender is dropped here and the receiver ends at once
            if !registry.closed {
                registry.subscribers.insert(id, tx);
            }
            id
        };
        tracing::info!(subscriber = id, "event subscriber connected");
        Subscription {
            id,
            rx,
            fanout: self.clone(),
        }
    }

    /// Remove a subscriber. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.registry().subscribers.remove(&id).is_some();
        if removed {
            tracing::info!(subscriber = id, "event subscriber disconnected");
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry().subscribers.len()
    }

    /// Drop every subscriber and refuse new ones. Pending events are still
    /// delivered; each receiver then sees the end of its stream.
    pub fn close(&self) {
        let mut registry = self.registry();
        registry.closed = true;
        let dropped = registry.subscribers.len();
        registry.subscribers.clear();
        tracing::info!(dropped, "event fan-out closed");
    }
}

impl LeadPublisher for LeadFanout {
    fn publish(&self, event: &LeadEvent) -> usize {
        let mut registry = self.registry();
        registry.subscribers.retain(|id, tx| {
            let alive = tx.send(event.clone()).is_ok();
            if !alive {
                tracing::debug!(subscriber = *id, "pruning dead event subscriber");
            }
            alive
        });
        let delivered = registry.subscribers.len();
        tracing::debug!(id = %event.item.id, delivered, "published lead event");
        delivered
    }
}

/// A live subscription. Unsubscribes on drop.
pub struct Subscription {
    id: SubscriptionId,
    rx: mpsc::UnboundedReceiver<LeadEvent>,
    fanout: LeadFanout,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Next event, or `None` once the subscription has been removed.
    pub async fn recv(&mut self) -> Option<LeadEvent> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.fanout.unsubscribe(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadwatch_core::models::{AnalysisResult, Item, Reach, Urgency};

    fn event(id: &str) -> LeadEvent {
        LeadEvent {
            item: Item {
                id: id.into(),
                title: "t".into(),
                body: String::new(),
                author: String::new(),
                partition: "jobs".into(),
                engagement: 0,
                comment_count: 0,
                created_utc: 0,
                url: String::new(),
                permalink: String::new(),
            },
            analysis: AnalysisResult {
                score: 80,
                reasoning: String::new(),
                recommendation: String::new(),
                reach: Reach::Yes,
                pain_points: vec![],
                urgency: Urgency::High,
                analyzed_at: 0,
            },
        }
    }

    #[tokio::test]
    async fn test_every_subscriber_gets_events_in_order() {
        let fanout = LeadFanout::new();
        let mut a = fanout.subscribe();
        let mut b = fanout.subscribe();

        assert_eq!(fanout.publish(&event("p1")), 2);
        assert_eq!(fanout.publish(&event("p2")), 2);

        for sub in [&mut a, &mut b] {
            assert_eq!(sub.recv().await.unwrap().item.id, "p1");
            assert_eq!(sub.recv().await.unwrap().item.id, "p2");
        }
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let fanout = LeadFanout::new();
        let a = fanout.subscribe();
        let _b = fanout.subscribe();
        assert_eq!(fanout.subscriber_count(), 2);

        let id = a.id();
        drop(a);
        assert_eq!(fanout.subscriber_count(), 1);
        assert!(!fanout.unsubscribe(id));
        assert_eq!(fanout.publish(&event("p")), 1);
    }

    #[tokio::test]
    async fn test_close_ends_subscriptions() {
        let fanout = LeadFanout::new();
        let mut a = fanout.subscribe();
        fanout.publish(&event("p1"));

        fanout.close();
        assert_eq!(fanout.subscriber_count(), 0);
        assert_eq!(a.recv().await.unwrap().item.id, "p1");
        assert!(a.recv().await.is_none());

        let mut late = fanout.subscribe();
        assert!(late.recv().await.is_none());
        assert_eq!(fanout.publish(&event("p2")), 0);
    }

    #[test]
    fn test_publish_with_no_subscribers() {
        assert_eq!(LeadFanout::new().publish(&event("p")), 0);
    }

    #[test]
    fn test_dead_sender_is_pruned() {
        let fanout = LeadFanout::new();
        // simulate a receiver that went away without unsubscribing
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        fanout.registry().subscribers.insert(99, tx);
        let _live = fanout.subscribe();

        assert_eq!(fanout.publish(&event("p")), 1);
        assert_eq!(fanout.subscriber_count(), 1);
    }
}
