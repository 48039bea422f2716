use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, info, warn};
use uuid::Uuid;

use turnstile_core::{Booking, BookingError, BookingResult, IntentProducer, InventoryCache};

/// Retry budget for handing an intent to the broker.
#[derive(Debug, Clone, Copy)]
pub struct PublishPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for PublishPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(100),
        }
    }
}

/// Admission edge of the pipeline. A booking request costs one atomic counter
/// decrement and one queue publish; nothing here waits on the database.
pub struct ReservationIntake {
    cache: Arc<dyn InventoryCache>,
    producer: Arc<dyn IntentProducer>,
    policy: PublishPolicy,
}

impl ReservationIntake {
    pub fn new(
        cache: Arc<dyn InventoryCache>,
        producer: Arc<dyn IntentProducer>,
        policy: PublishPolicy,
    ) -> Self {
        Self {
            cache,
            producer,
            policy,
        }
    }

    /// Admits one reservation for `buyer_id` and queues it for settlement.
    ///
    /// Admission claims a counter unit before anything else. If the intent
    /// cannot be published after all retries, the unit is released again so
    /// the slot goes back on sale, and the caller sees the broker error.
    pub async fn book(&self, ticket_id: Uuid, buyer_id: Uuid) -> BookingResult<Uuid> {
        if !self.cache.try_reserve(ticket_id).await? {
            info!("Admission rejected for ticket {}: sold out", ticket_id);
            return Err(BookingError::SoldOut);
        }

        let booking = Booking::new(ticket_id, buyer_id);

        match self.publish_with_retry(&booking).await {
            Ok(()) => {
                info!(
                    "Booking {} accepted for ticket {} (buyer {})",
                    booking.id, ticket_id, buyer_id
                );
                Ok(booking.id)
            }
            Err(e) => {
                warn!(
                    "Publish failed for booking {}, releasing admission slot: {}",
                    booking.id, e
                );
                if let Err(release_err) = self.cache.release(ticket_id).await {
                    // The counter now under-reports until the ticket is
                    // reseeded; the ledger is unaffected.
                    error!(
                        "Compensating release failed for ticket {}: {}",
                        ticket_id, release_err
                    );
                }
                Err(e)
            }
        }
    }

    /// Live remaining count as the admission counter sees it.
    pub async fn available(&self, ticket_id: Uuid) -> BookingResult<i64> {
        self.cache.available(ticket_id).await
    }

    async fn publish_with_retry(&self, booking: &Booking) -> BookingResult<()> {
        let attempts = self.policy.attempts.max(1);
        let mut last = BookingError::BrokerUnavailable("no publish attempt made".into());

        for attempt in 1..=attempts {
            match self.producer.publish(booking).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(
                        "Intent publish attempt {}/{} failed for booking {}: {}",
                        attempt, attempts, booking.id, e
                    );
                    last = e;
                    if attempt < attempts {
                        sleep(self.policy.backoff * attempt).await;
                    }
                }
            }
        }
        Err(last)
    }
}
