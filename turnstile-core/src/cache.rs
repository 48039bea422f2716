use async_trait::async_trait;
use uuid::Uuid;

use crate::BookingResult;

/// Shared admission counters sitting in front of the ledger. The counter is a
/// gate, not the source of truth: it bounds how many reservation intents get
/// queued, while the ledger decides what was actually sold.
#[async_trait]
pub trait InventoryCache: Send + Sync {
    /// Seeds the counter for a ticket. Only takes effect when the counter is
    /// absent; an in-progress sale is never overwritten.
    async fn initialize(&self, ticket_id: Uuid, count: i64) -> BookingResult<()>;

    /// Atomically claims one unit. Returns `false` when the pool is exhausted
    /// or the ticket was never seeded.
    async fn try_reserve(&self, ticket_id: Uuid) -> BookingResult<bool>;

    /// Gives one unit back, compensating an admission whose intent never made
    /// it onto the queue.
    async fn release(&self, ticket_id: Uuid) -> BookingResult<()>;

    /// Best-effort remaining count. Absent counters read as zero.
    async fn available(&self, ticket_id: Uuid) -> BookingResult<i64>;
}
