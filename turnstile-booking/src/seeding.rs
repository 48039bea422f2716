use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use turnstile_core::{BookingResult, InventoryCache, Ledger, NotificationRelay, Ticket};

/// Bootstrap path for load tests and operations: creates the ledger row and
/// the admission counter for a ticket pool. Both writes are insert-if-absent,
/// so reseeding a live sale changes nothing.
pub struct SeedService {
    ledger: Arc<dyn Ledger>,
    cache: Arc<dyn InventoryCache>,
    relay: Arc<dyn NotificationRelay>,
}

impl SeedService {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        cache: Arc<dyn InventoryCache>,
        relay: Arc<dyn NotificationRelay>,
    ) -> Self {
        Self {
            ledger,
            cache,
            relay,
        }
    }

    /// Seeds a ticket pool and announces its live count. Returns the count as
    /// the admission counter sees it afterwards.
    pub async fn seed(&self, ticket_id: Uuid, event_name: &str, count: i64) -> BookingResult<i64> {
        let ticket = Ticket::new(ticket_id, event_name, count);
        let inserted = self.ledger.add_ticket(&ticket).await?;
        if !inserted {
            info!("Ticket {} already in ledger, row left untouched", ticket_id);
        }

        self.cache.initialize(ticket_id, count).await?;
        let available = self.cache.available(ticket_id).await?;
        self.relay.inventory_updated(ticket_id, available).await?;

        info!(
            "Seeded ticket {} ({}) with {} units, counter at {}",
            ticket_id, event_name, count, available
        );
        Ok(available)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use turnstile_core::memory::{MemoryInventoryCache, MemoryLedger, MemoryRelay};
    use turnstile_core::NotificationEvent;

    #[tokio::test]
    async fn seed_creates_ledger_row_and_counter() {
        let ledger = Arc::new(MemoryLedger::new());
        let cache = Arc::new(MemoryInventoryCache::new());
        let relay = Arc::new(MemoryRelay::new());
        let seeder = SeedService::new(ledger.clone(), cache.clone(), relay.clone());

        let ticket_id = Uuid::new_v4();
        let available = seeder.seed(ticket_id, "Launch Night", 100).await.unwrap();

        assert_eq!(available, 100);
        let ticket = ledger.get_ticket(ticket_id).await.unwrap().unwrap();
        assert_eq!(ticket.total_count, 100);
        assert_eq!(ticket.available_count, 100);
        assert_eq!(cache.available(ticket_id).await.unwrap(), 100);

        let events = relay.events().await;
        assert!(matches!(
            events.as_slice(),
            [NotificationEvent::InventoryUpdated { available_count: 100, .. }]
        ));
    }

    #[tokio::test]
    async fn reseeding_a_live_sale_changes_nothing() {
        let ledger = Arc::new(MemoryLedger::new());
        let cache = Arc::new(MemoryInventoryCache::new());
        let relay = Arc::new(MemoryRelay::new());
        let seeder = SeedService::new(ledger.clone(), cache.clone(), relay.clone());

        let ticket_id = Uuid::new_v4();
        seeder.seed(ticket_id, "Launch Night", 10).await.unwrap();

        // Sale in progress: a unit is taken, then someone reseeds.
        assert!(cache.try_reserve(ticket_id).await.unwrap());
        let available = seeder.seed(ticket_id, "Launch Night", 10).await.unwrap();

        assert_eq!(available, 9);
        assert_eq!(cache.available(ticket_id).await.unwrap(), 9);
        let ticket = ledger.get_ticket(ticket_id).await.unwrap().unwrap();
        assert_eq!(ticket.available_count, 10);
    }
}
