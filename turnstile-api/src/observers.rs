use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use turnstile_core::NotificationEvent;

/// One connected realtime client. `send` returns `false` once the client is
/// gone, which tells the registry to drop it.
#[async_trait]
pub trait Observer: Send + Sync {
    async fn send(&self, event: &NotificationEvent) -> bool;
}

struct Entry {
    group: Uuid,
    observer: Arc<dyn Observer>,
}

/// Connected observers, keyed by subscription group (one group per buyer).
/// Confirmations are steered to the buyer's group; everything else is
/// broadcast. Observers whose transport has closed are pruned on the next
/// dispatch that touches them.
#[derive(Default)]
pub struct ObserverRegistry {
    next_id: AtomicU64,
    observers: RwLock<HashMap<u64, Entry>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an observer under a group and returns its registration handle.
    pub async fn register(&self, group: Uuid, observer: Arc<dyn Observer>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.observers
            .write()
            .await
            .insert(id, Entry { group, observer });
        debug!("Observer {} registered in group {}", id, group);
        id
    }

    pub async fn unregister(&self, id: u64) {
        if self.observers.write().await.remove(&id).is_some() {
            debug!("Observer {} unregistered", id);
        }
    }

    pub async fn len(&self) -> usize {
        self.observers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.observers.read().await.is_empty()
    }

    /// Sends to every connected observer.
    pub async fn broadcast(&self, event: &NotificationEvent) {
        let targets = self.snapshot(None).await;
        self.dispatch(targets, event).await;
    }

    /// Sends to the observers of one subscription group.
    pub async fn notify_group(&self, group: Uuid, event: &NotificationEvent) {
        let targets = self.snapshot(Some(group)).await;
        self.dispatch(targets, event).await;
    }

    // The read lock is released before any send, so a slow observer can not
    // block registration.
    async fn snapshot(&self, group: Option<Uuid>) -> Vec<(u64, Arc<dyn Observer>)> {
        self.observers
            .read()
            .await
            .iter()
            .filter(|(_, entry)| group.map_or(true, |g| entry.group == g))
            .map(|(id, entry)| (*id, entry.observer.clone()))
            .collect()
    }

    async fn dispatch(&self, targets: Vec<(u64, Arc<dyn Observer>)>, event: &NotificationEvent) {
        let mut gone = Vec::new();
        for (id, observer) in targets {
            if !observer.send(event).await {
                gone.push(id);
            }
        }
        if !gone.is_empty() {
            let mut observers = self.observers.write().await;
            for id in gone {
                observers.remove(&id);
                debug!("Observer {} dropped, transport closed", id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tokio::sync::mpsc;

    struct ChannelObserver {
        tx: mpsc::UnboundedSender<NotificationEvent>,
    }

    #[async_trait]
    impl Observer for ChannelObserver {
        async fn send(&self, event: &NotificationEvent) -> bool {
            self.tx.send(event.clone()).is_ok()
        }
    }

    fn observer() -> (Arc<ChannelObserver>, mpsc::UnboundedReceiver<NotificationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(ChannelObserver { tx }), rx)
    }

    fn heartbeat() -> NotificationEvent {
        NotificationEvent::Heartbeat {
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_every_group() {
        let registry = ObserverRegistry::new();
        let (alpha, mut alpha_rx) = observer();
        let (beta, mut beta_rx) = observer();
        registry.register(Uuid::new_v4(), alpha).await;
        registry.register(Uuid::new_v4(), beta).await;

        registry.broadcast(&heartbeat()).await;

        assert!(alpha_rx.try_recv().is_ok());
        assert!(beta_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn notify_group_is_targeted() {
        let registry = ObserverRegistry::new();
        let buyer = Uuid::new_v4();
        let (ours, mut ours_rx) = observer();
        let (theirs, mut theirs_rx) = observer();
        registry.register(buyer, ours).await;
        registry.register(Uuid::new_v4(), theirs).await;

        let event = NotificationEvent::BookingConfirmed {
            booking_id: Uuid::new_v4(),
            buyer_id: buyer,
            ticket_id: Uuid::new_v4(),
        };
        registry.notify_group(buyer, &event).await;

        assert_eq!(ours_rx.try_recv().unwrap(), event);
        assert!(theirs_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_observers_are_pruned_on_dispatch() {
        let registry = ObserverRegistry::new();
        let (alive, _alive_rx) = observer();
        let (dead, dead_rx) = observer();
        registry.register(Uuid::new_v4(), alive).await;
        registry.register(Uuid::new_v4(), dead).await;
        drop(dead_rx);

        assert_eq!(registry.len().await, 2);
        registry.broadcast(&heartbeat()).await;
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn unregister_removes_the_handle() {
        let registry = ObserverRegistry::new();
        let (obs, mut rx) = observer();
        let id = registry.register(Uuid::new_v4(), obs).await;

        registry.unregister(id).await;
        assert!(registry.is_empty().await);

        registry.broadcast(&heartbeat()).await;
        assert!(rx.try_recv().is_err());
    }
}
