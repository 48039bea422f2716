use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use turnstile_core::NotificationEvent;

use crate::observers::{Observer, ObserverRegistry};
use crate::state::AppState;

/// Liveness cadence towards connected observers, independent of traffic.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Undelivered events an SSE connection may buffer before we start dropping.
const OBSERVER_BUFFER: usize = 64;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/notifications/stream", get(stream_notifications))
}

struct SseObserver {
    tx: mpsc::Sender<NotificationEvent>,
}

#[async_trait]
impl Observer for SseObserver {
    async fn send(&self, event: &NotificationEvent) -> bool {
        match self.tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                // Reader is not keeping up. Delivery is best-effort, so the
                // event is dropped and the connection lives on.
                debug!("Observer buffer full, dropping {}", event.name());
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamQuery {
    buyer_id: Uuid,
}

/// SSE subscription endpoint. Each connection becomes one observer in the
/// buyer's group and is dropped from the registry once the client goes away.
async fn stream_notifications(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let (tx, rx) = mpsc::channel(OBSERVER_BUFFER);
    let id = state
        .observers
        .register(query.buyer_id, Arc::new(SseObserver { tx }))
        .await;
    info!(
        "Realtime subscriber {} connected for buyer {}",
        id, query.buyer_id
    );

    let stream = ReceiverStream::new(rx)
        .map(|event| Event::default().event(event.name()).json_data(&event));

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Pumps decoded notification events onto connected observers and emits the
/// heartbeat. Runs until the shutdown flag flips or the source stream ends.
pub async fn run_relay<S>(
    mut events: S,
    registry: Arc<ObserverRegistry>,
    mut shutdown: watch::Receiver<bool>,
) where
    S: Stream<Item = NotificationEvent> + Unpin,
{
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    info!("Notification relay started");

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("Notification relay stopping");
                    break;
                }
            }
            _ = heartbeat.tick() => {
                registry
                    .broadcast(&NotificationEvent::Heartbeat { timestamp: Utc::now() })
                    .await;
            }
            event = events.next() => {
                match event {
                    Some(event) => dispatch(&registry, event).await,
                    None => {
                        warn!("Notification source closed, relay exiting");
                        break;
                    }
                }
            }
        }
    }
}

/// Confirmations go to the buyer's own group plus an anonymized broadcast;
/// inventory changes and anything else go to everyone.
async fn dispatch(registry: &ObserverRegistry, event: NotificationEvent) {
    match event {
        NotificationEvent::BookingConfirmed {
            booking_id,
            buyer_id,
            ..
        } => {
            registry.notify_group(buyer_id, &event).await;
            registry
                .broadcast(&NotificationEvent::AnyBookingConfirmed {
                    booking_id,
                    buyer_id,
                })
                .await;
        }
        other => registry.broadcast(&other).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    struct ChannelObserver {
        tx: mpsc::UnboundedSender<NotificationEvent>,
    }

    #[async_trait]
    impl Observer for ChannelObserver {
        async fn send(&self, event: &NotificationEvent) -> bool {
            self.tx.send(event.clone()).is_ok()
        }
    }

    fn observer() -> (
        Arc<ChannelObserver>,
        mpsc::UnboundedReceiver<NotificationEvent>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(ChannelObserver { tx }), rx)
    }

    /// Heartbeats interleave freely with business events; skip them.
    async fn next_business_event(
        rx: &mut mpsc::UnboundedReceiver<NotificationEvent>,
    ) -> NotificationEvent {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("no event within deadline")
                .expect("relay channel closed");
            if !matches!(event, NotificationEvent::Heartbeat { .. }) {
                return event;
            }
        }
    }

    #[tokio::test]
    async fn confirmations_are_steered_and_anonymized() {
        let registry = Arc::new(ObserverRegistry::new());
        let buyer = Uuid::new_v4();
        let (ours, mut ours_rx) = observer();
        let (theirs, mut theirs_rx) = observer();
        registry.register(buyer, ours).await;
        registry.register(Uuid::new_v4(), theirs).await;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_relay(
            UnboundedReceiverStream::new(event_rx),
            registry,
            shutdown_rx,
        ));

        let booking_id = Uuid::new_v4();
        event_tx
            .send(NotificationEvent::BookingConfirmed {
                booking_id,
                buyer_id: buyer,
                ticket_id: Uuid::new_v4(),
            })
            .unwrap();

        // The buyer sees the full confirmation, then the broadcast twin.
        assert!(matches!(
            next_business_event(&mut ours_rx).await,
            NotificationEvent::BookingConfirmed { booking_id: id, .. } if id == booking_id
        ));
        assert!(matches!(
            next_business_event(&mut ours_rx).await,
            NotificationEvent::AnyBookingConfirmed { booking_id: id, .. } if id == booking_id
        ));

        // Everyone else only sees the anonymized broadcast.
        assert!(matches!(
            next_business_event(&mut theirs_rx).await,
            NotificationEvent::AnyBookingConfirmed { booking_id: id, .. } if id == booking_id
        ));

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn inventory_updates_are_broadcast() {
        let registry = Arc::new(ObserverRegistry::new());
        let (alpha, mut alpha_rx) = observer();
        let (beta, mut beta_rx) = observer();
        registry.register(Uuid::new_v4(), alpha).await;
        registry.register(Uuid::new_v4(), beta).await;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_relay(
            UnboundedReceiverStream::new(event_rx),
            registry,
            shutdown_rx,
        ));

        let ticket_id = Uuid::new_v4();
        event_tx
            .send(NotificationEvent::InventoryUpdated {
                ticket_id,
                available_count: 12,
            })
            .unwrap();

        for rx in [&mut alpha_rx, &mut beta_rx] {
            assert!(matches!(
                next_business_event(rx).await,
                NotificationEvent::InventoryUpdated { available_count: 12, .. }
            ));
        }

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_fires_on_a_fixed_cadence() {
        let registry = Arc::new(ObserverRegistry::new());
        let (obs, mut rx) = observer();
        registry.register(Uuid::new_v4(), obs).await;

        let (_event_tx, event_rx) = mpsc::unbounded_channel::<NotificationEvent>();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_relay(
            UnboundedReceiverStream::new(event_rx),
            registry,
            shutdown_rx,
        ));

        for _ in 0..3 {
            let event = rx.recv().await.unwrap();
            assert!(matches!(event, NotificationEvent::Heartbeat { .. }));
        }

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn relay_exits_when_the_source_closes() {
        let registry = Arc::new(ObserverRegistry::new());
        let (event_tx, event_rx) = mpsc::unbounded_channel::<NotificationEvent>();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_relay(
            UnboundedReceiverStream::new(event_rx),
            registry,
            shutdown_rx,
        ));

        drop(event_tx);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("relay did not exit after source closed")
            .unwrap();
    }
}
