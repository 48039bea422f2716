use async_trait::async_trait;
use uuid::Uuid;

use crate::{Booking, BookingResult, Ticket};

/// What the combined settlement write did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    /// Booking recorded and ticket count written.
    Applied,
    /// An earlier delivery already settled this booking id; nothing changed.
    AlreadySettled,
}

/// Durable source of truth for tickets and bookings.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn get_ticket(&self, id: Uuid) -> BookingResult<Option<Ticket>>;

    /// Inserts the ticket if its id is unknown. Returns `false` when a row
    /// already exists, which is left untouched.
    async fn add_ticket(&self, ticket: &Ticket) -> BookingResult<bool>;

    /// Writes the ticket back guarded by its concurrency token: fails with
    /// [`crate::BookingError::ConcurrencyConflict`] when the stored version no
    /// longer matches the one the caller read.
    async fn update_ticket(&self, ticket: &Ticket) -> BookingResult<()>;

    async fn get_booking(&self, id: Uuid) -> BookingResult<Option<Booking>>;

    /// Inserts the booking if its id is unknown. Returns `false` for a
    /// duplicate id.
    async fn add_booking(&self, booking: &Booking) -> BookingResult<bool>;

    /// Records the booking and writes the decremented ticket as one atomic
    /// unit. A duplicate booking id leaves the ticket untouched and reports
    /// [`SettleOutcome::AlreadySettled`]; a stale ticket version leaves the
    /// booking unrecorded and fails with a concurrency conflict.
    async fn settle(&self, ticket: &Ticket, booking: &Booking) -> BookingResult<SettleOutcome>;
}
