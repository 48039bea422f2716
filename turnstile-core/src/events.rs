use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Booking, BookingResult};

/// Channel carrying booking confirmations from settlement to the relay.
pub const BOOKING_CHANNEL: &str = "booking-notifications";

/// Channel carrying live counter updates from settlement to the relay.
pub const INVENTORY_CHANNEL: &str = "inventory-notifications";

/// A pipeline milestone pushed to connected observers. Encoded as JSON with a
/// `type` discriminator so one channel can carry every variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum NotificationEvent {
    /// Delivered to the booking's buyer only.
    BookingConfirmed {
        booking_id: Uuid,
        buyer_id: Uuid,
        ticket_id: Uuid,
    },
    /// Broadcast twin of a confirmation, trimmed to what every observer may
    /// see. Synthesized by the relay, never published by settlement.
    AnyBookingConfirmed { booking_id: Uuid, buyer_id: Uuid },
    /// Broadcast whenever the remaining count of a pool changes.
    InventoryUpdated { ticket_id: Uuid, available_count: i64 },
    /// Liveness signal, emitted on a fixed cadence regardless of traffic.
    Heartbeat { timestamp: DateTime<Utc> },
}

impl NotificationEvent {
    /// Event name used by the realtime transport.
    pub fn name(&self) -> &'static str {
        match self {
            NotificationEvent::BookingConfirmed { .. } => "bookingconfirmed",
            NotificationEvent::AnyBookingConfirmed { .. } => "anybookingconfirmed",
            NotificationEvent::InventoryUpdated { .. } => "inventoryupdated",
            NotificationEvent::Heartbeat { .. } => "heartbeat",
        }
    }
}

/// Fire-and-forget fan-out of milestones. Nothing is stored or replayed;
/// observers that are not connected when an event fires simply miss it.
#[async_trait]
pub trait NotificationRelay: Send + Sync {
    async fn booking_confirmed(&self, booking: &Booking) -> BookingResult<()>;
    async fn inventory_updated(&self, ticket_id: Uuid, available: i64) -> BookingResult<()>;
}
