pub mod booking;
pub mod cache;
pub mod events;
pub mod ledger;
pub mod memory;
pub mod queue;
pub mod ticket;

use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Ticket is sold out")]
    SoldOut,
    #[error("Ticket {0} not found, has it been seeded?")]
    TicketNotFound(Uuid),
    #[error("Concurrent update on ticket {0}")]
    ConcurrencyConflict(Uuid),
    #[error("Intent broker unavailable: {0}")]
    BrokerUnavailable(String),
    #[error("Malformed intent payload: {0}")]
    MalformedMessage(String),
    #[error("Inventory cache failure: {0}")]
    Cache(String),
    #[error("Notification fan-out failure: {0}")]
    Notify(String),
    #[error("Ledger storage failure: {0}")]
    Storage(String),
    #[error("Settlement failed: {0}")]
    SettlementFailure(String),
}

pub type BookingResult<T> = Result<T, BookingError>;

pub use booking::{Booking, BookingStatus};
pub use cache::InventoryCache;
pub use events::{NotificationEvent, NotificationRelay, BOOKING_CHANNEL, INVENTORY_CHANNEL};
pub use ledger::{Ledger, SettleOutcome};
pub use queue::{
    decode_intent, IntentConsumer, IntentDelivery, IntentProducer, INTENT_GROUP, INTENT_TOPIC,
};
pub use ticket::Ticket;
