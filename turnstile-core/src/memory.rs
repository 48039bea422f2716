//! In-memory implementations of the pipeline ports. They back the test suites
//! and single-process development runs, and they keep the same observable
//! contracts as the networked implementations: the cache compensates failed
//! decrements, the ledger rejects stale versions, and the queue redelivers
//! anything that was never acked.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

use crate::{
    Booking, BookingError, BookingResult, IntentConsumer, IntentDelivery, IntentProducer,
    InventoryCache, Ledger, NotificationEvent, NotificationRelay, SettleOutcome, Ticket,
};

/// Counter store with DECR-then-compensate semantics. An unknown ticket
/// behaves like an empty counter, exactly as the shared cache does.
#[derive(Default)]
pub struct MemoryInventoryCache {
    counters: Mutex<HashMap<Uuid, i64>>,
}

impl MemoryInventoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InventoryCache for MemoryInventoryCache {
    async fn initialize(&self, ticket_id: Uuid, count: i64) -> BookingResult<()> {
        let mut counters = self.counters.lock().await;
        counters.entry(ticket_id).or_insert(count);
        Ok(())
    }

    async fn try_reserve(&self, ticket_id: Uuid) -> BookingResult<bool> {
        let mut counters = self.counters.lock().await;
        let counter = counters.entry(ticket_id).or_insert(0);
        *counter -= 1;
        if *counter < 0 {
            *counter += 1;
            return Ok(false);
        }
        Ok(true)
    }

    async fn release(&self, ticket_id: Uuid) -> BookingResult<()> {
        let mut counters = self.counters.lock().await;
        *counters.entry(ticket_id).or_insert(0) += 1;
        Ok(())
    }

    async fn available(&self, ticket_id: Uuid) -> BookingResult<i64> {
        let counters = self.counters.lock().await;
        Ok(counters.get(&ticket_id).copied().unwrap_or(0))
    }
}

#[derive(Default)]
struct LedgerState {
    tickets: HashMap<Uuid, Ticket>,
    bookings: HashMap<Uuid, Booking>,
}

/// Ledger over plain maps, with the same version discipline as the database:
/// every write bumps the ticket version and stale writers are turned away.
#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn booking_count(&self) -> usize {
        self.state.lock().await.bookings.len()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn get_ticket(&self, id: Uuid) -> BookingResult<Option<Ticket>> {
        Ok(self.state.lock().await.tickets.get(&id).cloned())
    }

    async fn add_ticket(&self, ticket: &Ticket) -> BookingResult<bool> {
        let mut state = self.state.lock().await;
        if state.tickets.contains_key(&ticket.id) {
            return Ok(false);
        }
        state.tickets.insert(ticket.id, ticket.clone());
        Ok(true)
    }

    async fn update_ticket(&self, ticket: &Ticket) -> BookingResult<()> {
        let mut state = self.state.lock().await;
        let stored = state
            .tickets
            .get_mut(&ticket.id)
            .ok_or(BookingError::TicketNotFound(ticket.id))?;
        if stored.version != ticket.version {
            return Err(BookingError::ConcurrencyConflict(ticket.id));
        }
        *stored = ticket.clone();
        stored.version += 1;
        Ok(())
    }

    async fn get_booking(&self, id: Uuid) -> BookingResult<Option<Booking>> {
        Ok(self.state.lock().await.bookings.get(&id).cloned())
    }

    async fn add_booking(&self, booking: &Booking) -> BookingResult<bool> {
        let mut state = self.state.lock().await;
        if state.bookings.contains_key(&booking.id) {
            return Ok(false);
        }
        state.bookings.insert(booking.id, booking.clone());
        Ok(true)
    }

    async fn settle(&self, ticket: &Ticket, booking: &Booking) -> BookingResult<SettleOutcome> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        if state.bookings.contains_key(&booking.id) {
            return Ok(SettleOutcome::AlreadySettled);
        }
        let stored = state
            .tickets
            .get_mut(&ticket.id)
            .ok_or(BookingError::TicketNotFound(ticket.id))?;
        if stored.version != ticket.version {
            return Err(BookingError::ConcurrencyConflict(ticket.id));
        }
        *stored = ticket.clone();
        stored.version += 1;
        state.bookings.insert(booking.id, booking.clone());
        Ok(SettleOutcome::Applied)
    }
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<IntentDelivery>,
    inflight: HashMap<i64, IntentDelivery>,
    next_offset: i64,
}

/// Single-partition intent queue with at-least-once redelivery. Deliveries
/// stay in flight until acked, and [`MemoryQueue::redeliver_unacked`] pushes
/// them back to the front, mimicking a consumer crash before offset commit.
#[derive(Default)]
pub struct MemoryQueue {
    state: Mutex<QueueState>,
    ready_signal: Notify,
}

impl MemoryQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn consumer(self: &Arc<Self>) -> MemoryConsumer {
        MemoryConsumer {
            queue: Arc::clone(self),
        }
    }

    /// Puts every unacked delivery back at the head of the queue, oldest
    /// first.
    pub async fn redeliver_unacked(&self) {
        let mut state = self.state.lock().await;
        let mut unacked: Vec<IntentDelivery> = state.inflight.drain().map(|(_, d)| d).collect();
        unacked.sort_by_key(|d| d.offset);
        if !unacked.is_empty() {
            tracing::debug!("Redelivering {} unacked intent(s)", unacked.len());
        }
        for delivery in unacked.into_iter().rev() {
            state.ready.push_front(delivery);
        }
        self.ready_signal.notify_one();
    }

    pub async fn depth(&self) -> usize {
        self.state.lock().await.ready.len()
    }
}

#[async_trait]
impl IntentProducer for MemoryQueue {
    async fn publish(&self, intent: &Booking) -> BookingResult<()> {
        let payload = serde_json::to_vec(intent)
            .map_err(|e| BookingError::BrokerUnavailable(e.to_string()))?;
        let mut state = self.state.lock().await;
        let offset = state.next_offset;
        state.next_offset += 1;
        state.ready.push_back(IntentDelivery {
            payload,
            partition: 0,
            offset,
            correlation: Some(intent.id.simple().to_string()),
        });
        drop(state);
        self.ready_signal.notify_one();
        Ok(())
    }
}

/// Consuming handle onto a [`MemoryQueue`].
pub struct MemoryConsumer {
    queue: Arc<MemoryQueue>,
}

#[async_trait]
impl IntentConsumer for MemoryConsumer {
    async fn next(&mut self) -> BookingResult<IntentDelivery> {
        loop {
            {
                let mut state = self.queue.state.lock().await;
                if let Some(delivery) = state.ready.pop_front() {
                    state.inflight.insert(delivery.offset, delivery.clone());
                    return Ok(delivery);
                }
            }
            self.queue.ready_signal.notified().await;
        }
    }

    async fn ack(&mut self, delivery: &IntentDelivery) -> BookingResult<()> {
        self.queue.state.lock().await.inflight.remove(&delivery.offset);
        Ok(())
    }
}

/// Relay that records what settlement published, for assertions.
#[derive(Default)]
pub struct MemoryRelay {
    events: Mutex<Vec<NotificationEvent>>,
}

impl MemoryRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl NotificationRelay for MemoryRelay {
    async fn booking_confirmed(&self, booking: &Booking) -> BookingResult<()> {
        self.events
            .lock()
            .await
            .push(NotificationEvent::BookingConfirmed {
                booking_id: booking.id,
                buyer_id: booking.buyer_id,
                ticket_id: booking.ticket_id,
            });
        Ok(())
    }

    async fn inventory_updated(&self, ticket_id: Uuid, available: i64) -> BookingResult<()> {
        self.events
            .lock()
            .await
            .push(NotificationEvent::InventoryUpdated {
                ticket_id,
                available_count: available,
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BookingStatus;

    #[tokio::test]
    async fn cache_initialize_never_overwrites() {
        let cache = MemoryInventoryCache::new();
        let ticket_id = Uuid::new_v4();

        cache.initialize(ticket_id, 10).await.unwrap();
        assert!(cache.try_reserve(ticket_id).await.unwrap());

        // A second seed mid-sale must not reset the counter.
        cache.initialize(ticket_id, 10).await.unwrap();
        assert_eq!(cache.available(ticket_id).await.unwrap(), 9);
    }

    #[tokio::test]
    async fn cache_reserve_compensates_below_zero() {
        let cache = MemoryInventoryCache::new();
        let ticket_id = Uuid::new_v4();
        cache.initialize(ticket_id, 1).await.unwrap();

        assert!(cache.try_reserve(ticket_id).await.unwrap());
        assert!(!cache.try_reserve(ticket_id).await.unwrap());
        // The failed attempt put the unit back, the counter never wedges
        // negative.
        assert_eq!(cache.available(ticket_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn cache_unknown_ticket_reads_zero_and_rejects() {
        let cache = MemoryInventoryCache::new();
        let ticket_id = Uuid::new_v4();

        assert_eq!(cache.available(ticket_id).await.unwrap(), 0);
        assert!(!cache.try_reserve(ticket_id).await.unwrap());
        assert_eq!(cache.available(ticket_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn cache_release_returns_units() {
        let cache = MemoryInventoryCache::new();
        let ticket_id = Uuid::new_v4();
        cache.initialize(ticket_id, 1).await.unwrap();

        assert!(cache.try_reserve(ticket_id).await.unwrap());
        cache.release(ticket_id).await.unwrap();
        assert_eq!(cache.available(ticket_id).await.unwrap(), 1);
        assert!(cache.try_reserve(ticket_id).await.unwrap());
    }

    #[tokio::test]
    async fn cache_concurrent_admissions_never_exceed_pool() {
        let cache = Arc::new(MemoryInventoryCache::new());
        let ticket_id = Uuid::new_v4();
        cache.initialize(ticket_id, 10).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..25 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                cache.try_reserve(ticket_id).await.unwrap()
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }

        assert_eq!(admitted, 10);
        assert_eq!(cache.available(ticket_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn ledger_add_ticket_is_insert_if_absent() {
        let ledger = MemoryLedger::new();
        let ticket = Ticket::new(Uuid::new_v4(), "Gala", 5);

        assert!(ledger.add_ticket(&ticket).await.unwrap());
        let mut reseeded = ticket.clone();
        reseeded.available_count = 100;
        assert!(!ledger.add_ticket(&reseeded).await.unwrap());

        let stored = ledger.get_ticket(ticket.id).await.unwrap().unwrap();
        assert_eq!(stored.available_count, 5);
    }

    #[tokio::test]
    async fn ledger_update_rejects_stale_version() {
        let ledger = MemoryLedger::new();
        let ticket = Ticket::new(Uuid::new_v4(), "Gala", 5);
        ledger.add_ticket(&ticket).await.unwrap();

        let mut first = ledger.get_ticket(ticket.id).await.unwrap().unwrap();
        let mut second = first.clone();

        first.reserve().unwrap();
        ledger.update_ticket(&first).await.unwrap();

        second.reserve().unwrap();
        let err = ledger.update_ticket(&second).await.unwrap_err();
        assert!(matches!(err, BookingError::ConcurrencyConflict(id) if id == ticket.id));

        // Only the first write landed.
        let stored = ledger.get_ticket(ticket.id).await.unwrap().unwrap();
        assert_eq!(stored.available_count, 4);
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn ledger_settle_is_idempotent_per_booking() {
        let ledger = MemoryLedger::new();
        let ticket = Ticket::new(Uuid::new_v4(), "Gala", 5);
        ledger.add_ticket(&ticket).await.unwrap();

        let mut booking = Booking::new(ticket.id, Uuid::new_v4());
        booking.confirm();

        let mut read = ledger.get_ticket(ticket.id).await.unwrap().unwrap();
        read.reserve().unwrap();
        assert_eq!(
            ledger.settle(&read, &booking).await.unwrap(),
            SettleOutcome::Applied
        );

        // Same booking again, as a redelivery would do.
        let mut reread = ledger.get_ticket(ticket.id).await.unwrap().unwrap();
        reread.reserve().unwrap();
        assert_eq!(
            ledger.settle(&reread, &booking).await.unwrap(),
            SettleOutcome::AlreadySettled
        );

        let stored = ledger.get_ticket(ticket.id).await.unwrap().unwrap();
        assert_eq!(stored.available_count, 4);
        assert_eq!(ledger.booking_count().await, 1);

        let row = ledger.get_booking(booking.id).await.unwrap().unwrap();
        assert_eq!(row.status, BookingStatus::Confirmed);
    }

    #[tokio::test]
    async fn queue_delivers_published_intents_in_order() {
        let queue = MemoryQueue::new();
        let mut consumer = queue.consumer();

        let first = Booking::new(Uuid::new_v4(), Uuid::new_v4());
        let second = Booking::new(Uuid::new_v4(), Uuid::new_v4());
        queue.publish(&first).await.unwrap();
        queue.publish(&second).await.unwrap();

        let delivery = consumer.next().await.unwrap();
        assert_eq!(crate::decode_intent(&delivery.payload).unwrap(), first);
        consumer.ack(&delivery).await.unwrap();

        let delivery = consumer.next().await.unwrap();
        assert_eq!(crate::decode_intent(&delivery.payload).unwrap(), second);
    }

    #[tokio::test]
    async fn queue_redelivers_unacked_only() {
        let queue = MemoryQueue::new();
        let mut consumer = queue.consumer();

        let acked = Booking::new(Uuid::new_v4(), Uuid::new_v4());
        let lost = Booking::new(Uuid::new_v4(), Uuid::new_v4());
        queue.publish(&acked).await.unwrap();
        queue.publish(&lost).await.unwrap();

        let delivery = consumer.next().await.unwrap();
        consumer.ack(&delivery).await.unwrap();
        let unacked = consumer.next().await.unwrap();

        // Crash before the second ack: the delivery must come back.
        queue.redeliver_unacked().await;
        let redelivered = consumer.next().await.unwrap();
        assert_eq!(redelivered.offset, unacked.offset);
        assert_eq!(crate::decode_intent(&redelivered.payload).unwrap(), lost);

        consumer.ack(&redelivered).await.unwrap();
        queue.redeliver_unacked().await;
        assert_eq!(queue.depth().await, 0);
    }

    #[tokio::test]
    async fn relay_records_published_events() {
        let relay = MemoryRelay::new();
        let booking = Booking::new(Uuid::new_v4(), Uuid::new_v4());

        relay.booking_confirmed(&booking).await.unwrap();
        relay.inventory_updated(booking.ticket_id, 7).await.unwrap();

        let events = relay.events().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            NotificationEvent::BookingConfirmed { booking_id, .. } if *booking_id == booking.id
        ));
        assert!(matches!(
            &events[1],
            NotificationEvent::InventoryUpdated { available_count: 7, .. }
        ));
    }
}
