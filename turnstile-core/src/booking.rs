use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{BookingError, BookingResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Failed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "Pending",
            BookingStatus::Confirmed => "Confirmed",
            BookingStatus::Failed => "Failed",
        }
    }

    pub fn parse(value: &str) -> BookingResult<Self> {
        match value {
            "Pending" => Ok(BookingStatus::Pending),
            "Confirmed" => Ok(BookingStatus::Confirmed),
            "Failed" => Ok(BookingStatus::Failed),
            other => Err(BookingError::Storage(format!(
                "unknown booking status: {other}"
            ))),
        }
    }
}

/// One buyer's claim on one unit of a ticket pool. Born `Pending` at the
/// admission edge, it travels the intent queue as JSON and only becomes
/// `Confirmed` (or `Failed`) once settlement writes it to the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub buyer_id: Uuid,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn new(ticket_id: Uuid, buyer_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            ticket_id,
            buyer_id,
            status: BookingStatus::Pending,
            created_at: Utc::now(),
        }
    }

    pub fn confirm(&mut self) {
        self.status = BookingStatus::Confirmed;
    }

    pub fn fail(&mut self) {
        self.status = BookingStatus::Failed;
    }
}
