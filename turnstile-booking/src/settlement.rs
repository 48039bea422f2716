use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use turnstile_core::{
    decode_intent, Booking, BookingError, BookingResult, BookingStatus, IntentConsumer,
    IntentDelivery, Ledger, NotificationRelay, SettleOutcome,
};

/// Pause before re-polling a consumer that just failed.
const POLL_BACKOFF: Duration = Duration::from_secs(1);

/// Settlement side of the pipeline: drains the intent queue and turns each
/// admitted reservation into a ledger row, then announces the result.
///
/// Delivery is at-least-once, so everything here is written to be replayed:
/// the ledger write is idempotent per booking id, and offsets are only
/// committed once a delivery has been fully dealt with.
pub struct SettlementWorker<C> {
    consumer: C,
    ledger: Arc<dyn Ledger>,
    relay: Arc<dyn NotificationRelay>,
    cas_retries: u32,
}

impl<C: IntentConsumer> SettlementWorker<C> {
    pub fn new(
        consumer: C,
        ledger: Arc<dyn Ledger>,
        relay: Arc<dyn NotificationRelay>,
        cas_retries: u32,
    ) -> Self {
        Self {
            consumer,
            ledger,
            relay,
            cas_retries,
        }
    }

    /// Consume loop. Runs until `shutdown` flips to true; a delivery in
    /// flight at that moment is still settled and committed before the loop
    /// exits.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("Settlement worker started, waiting for intents");
        loop {
            let delivery = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Shutdown requested, settlement worker stopping");
                        break;
                    }
                    continue;
                }
                delivery = self.consumer.next() => delivery,
            };

            match delivery {
                Ok(delivery) => match self.settle_delivery(&delivery).await {
                    Ok(()) => {
                        if let Err(e) = self.consumer.ack(&delivery).await {
                            warn!(
                                "Offset commit failed at {}/{}, intent may be redelivered: {}",
                                delivery.partition, delivery.offset, e
                            );
                        }
                    }
                    Err(e) => {
                        // No ack: the broker will hand this intent back.
                        error!(
                            "Settlement failed at {}/{}, leaving intent for redelivery: {}",
                            delivery.partition, delivery.offset, e
                        );
                    }
                },
                Err(e) => {
                    error!("Intent consumer failure: {}", e);
                    tokio::time::sleep(POLL_BACKOFF).await;
                }
            }
        }
    }

    /// Settles one delivery. `Ok` means the delivery is finished and its
    /// offset may be committed, including the cases where the payload was
    /// garbage or the booking had to be marked failed. `Err` means a
    /// transient fault and the delivery must be redelivered.
    pub async fn settle_delivery(&self, delivery: &IntentDelivery) -> BookingResult<()> {
        let intent = match decode_intent(&delivery.payload) {
            Ok(intent) => intent,
            Err(e) => {
                // Poisoned payload: a retry can never fix it, so log and move on.
                error!(
                    "Dropping malformed intent at {}/{} (correlation {:?}): {}",
                    delivery.partition, delivery.offset, delivery.correlation, e
                );
                return Ok(());
            }
        };

        info!(
            "Settling booking {} for ticket {} (correlation {:?})",
            intent.id, intent.ticket_id, delivery.correlation
        );
        self.settle(intent).await
    }

    /// Core settlement. Reads the ticket, decrements it under its concurrency
    /// token and records the booking, retrying with a fresh read whenever a
    /// parallel writer got there first.
    pub async fn settle(&self, intent: Booking) -> BookingResult<()> {
        let mut confirmed = intent.clone();
        confirmed.confirm();

        let retries = self.cas_retries.max(1);
        for _ in 0..retries {
            let Some(mut ticket) = self.ledger.get_ticket(intent.ticket_id).await? else {
                return self
                    .abandon(intent, "ticket missing from ledger, was it seeded?")
                    .await;
            };

            if ticket.reserve().is_err() {
                // An empty pool can also mean this very intent already took
                // the last unit on an earlier delivery, so look before failing.
                if self.finish_duplicate(&intent).await? {
                    return Ok(());
                }
                // The counter admitted more than the ledger holds. The ledger
                // wins; this booking fails rather than oversell.
                return self.abandon(intent, "ledger has no units left").await;
            }

            match self.ledger.settle(&ticket, &confirmed).await {
                Ok(SettleOutcome::Applied) => {
                    self.announce(&confirmed, ticket.available_count).await?;
                    return Ok(());
                }
                Ok(SettleOutcome::AlreadySettled) => {
                    self.finish_duplicate(&intent).await?;
                    return Ok(());
                }
                Err(BookingError::ConcurrencyConflict(ticket_id)) => {
                    warn!(
                        "Conflicting write on ticket {}, retrying settlement of booking {}",
                        ticket_id, intent.id
                    );
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        Err(BookingError::SettlementFailure(format!(
            "gave up on booking {} after {} conflicting writes on ticket {}",
            intent.id, retries, intent.ticket_id
        )))
    }

    /// Finishes a redelivered intent whose booking row already exists. A
    /// `Confirmed` row announces again off the stored state, healing a crash
    /// that hit between the ledger commit and the fan-out; a `Failed` row
    /// only needs the ack. Returns `false` when no row was found.
    async fn finish_duplicate(&self, intent: &Booking) -> BookingResult<bool> {
        let Some(stored) = self.ledger.get_booking(intent.id).await? else {
            return Ok(false);
        };

        info!("Booking {} already settled, redelivered intent", intent.id);
        if stored.status == BookingStatus::Confirmed {
            let available = self
                .ledger
                .get_ticket(stored.ticket_id)
                .await?
                .map(|t| t.available_count)
                .unwrap_or(0);
            self.announce(&stored, available).await?;
        }
        Ok(true)
    }

    /// Records the booking as failed and finishes the delivery. The admission
    /// counter is deliberately not touched: handing units back for a ticket
    /// the ledger cannot settle would only admit more doomed bookings.
    async fn abandon(&self, mut booking: Booking, reason: &str) -> BookingResult<()> {
        booking.fail();
        if !self.ledger.add_booking(&booking).await? {
            // Row already written by an earlier delivery; only the ack is left.
            info!("Booking {} already recorded, nothing to add", booking.id);
            return Ok(());
        }
        error!(
            "Booking {} on ticket {} marked failed: {}",
            booking.id, booking.ticket_id, reason
        );
        Ok(())
    }

    async fn announce(&self, booking: &Booking, available: i64) -> BookingResult<()> {
        self.relay.booking_confirmed(booking).await?;
        self.relay
            .inventory_updated(booking.ticket_id, available)
            .await?;
        Ok(())
    }
}
