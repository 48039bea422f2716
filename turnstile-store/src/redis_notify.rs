use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use turnstile_core::{
    Booking, BookingError, BookingResult, NotificationEvent, NotificationRelay, BOOKING_CHANNEL,
    INVENTORY_CHANNEL,
};

/// Publishing side of the notification fan-out, on Redis pub/sub. Events are
/// fire-and-forget: nobody subscribed means nobody hears, and that is fine.
#[derive(Clone)]
pub struct RedisNotificationRelay {
    client: redis::Client,
}

impl RedisNotificationRelay {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    async fn publish(&self, channel: &str, event: &NotificationEvent) -> BookingResult<()> {
        let payload =
            serde_json::to_string(event).map_err(|e| BookingError::Notify(e.to_string()))?;
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BookingError::Notify(e.to_string()))?;

        let receivers: i64 = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(&payload)
            .query_async(&mut conn)
            .await
            .map_err(|e| BookingError::Notify(e.to_string()))?;

        debug!("Published {} on {} to {} subscriber(s)", event.name(), channel, receivers);
        Ok(())
    }
}

#[async_trait]
impl NotificationRelay for RedisNotificationRelay {
    async fn booking_confirmed(&self, booking: &Booking) -> BookingResult<()> {
        info!("Publishing confirmation for booking {} (buyer {})", booking.id, booking.buyer_id);
        self.publish(
            BOOKING_CHANNEL,
            &NotificationEvent::BookingConfirmed {
                booking_id: booking.id,
                buyer_id: booking.buyer_id,
                ticket_id: booking.ticket_id,
            },
        )
        .await
    }

    async fn inventory_updated(&self, ticket_id: Uuid, available: i64) -> BookingResult<()> {
        info!("Publishing inventory update for ticket {}: {} left", ticket_id, available);
        self.publish(
            INVENTORY_CHANNEL,
            &NotificationEvent::InventoryUpdated {
                ticket_id,
                available_count: available,
            },
        )
        .await
    }
}

/// Subscribing side of the fan-out. Joins both channels and yields decoded
/// events; payloads that do not parse are logged and dropped rather than
/// tearing the stream down.
pub struct NotificationSubscriber {
    client: redis::Client,
}

impl NotificationSubscriber {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    pub async fn events(self) -> Result<impl Stream<Item = NotificationEvent>, redis::RedisError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(BOOKING_CHANNEL).await?;
        pubsub.subscribe(INVENTORY_CHANNEL).await?;
        info!(
            "Subscribed to notification channels: {}, {}",
            BOOKING_CHANNEL, INVENTORY_CHANNEL
        );

        Ok(pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = match msg.get_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("Unreadable notification payload: {}", e);
                    return None;
                }
            };
            match serde_json::from_str::<NotificationEvent>(&payload) {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!("Dropping undecodable notification: {} ({})", payload, e);
                    None
                }
            }
        }))
    }
}
