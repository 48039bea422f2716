use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{BookingError, BookingResult};

/// A sale pool for one event. The ledger row behind this struct is the source
/// of truth for how many units were actually sold; the cache counter is only
/// the admission gate in front of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: Uuid,
    pub event_name: String,
    pub total_count: i64,
    pub available_count: i64,
    /// Concurrency token. The ledger bumps it on every successful write and
    /// rejects writes carrying a stale value.
    pub version: i64,
}

impl Ticket {
    /// A freshly seeded pool starts fully available.
    pub fn new(id: Uuid, event_name: impl Into<String>, total_count: i64) -> Self {
        Self {
            id,
            event_name: event_name.into(),
            total_count,
            available_count: total_count,
            version: 0,
        }
    }

    /// Takes one unit out of the pool, failing once it is exhausted.
    pub fn reserve(&mut self) -> BookingResult<()> {
        if self.available_count <= 0 {
            return Err(BookingError::SoldOut);
        }
        self.available_count -= 1;
        Ok(())
    }

    pub fn is_sold_out(&self) -> bool {
        self.available_count <= 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_decrements_available_count() {
        let mut ticket = Ticket::new(Uuid::new_v4(), "Launch Night", 2);
        assert_eq!(ticket.available_count, 2);

        ticket.reserve().unwrap();
        assert_eq!(ticket.available_count, 1);
        assert!(!ticket.is_sold_out());

        ticket.reserve().unwrap();
        assert_eq!(ticket.available_count, 0);
        assert!(ticket.is_sold_out());
    }

    #[test]
    fn reserve_fails_when_sold_out() {
        let mut ticket = Ticket::new(Uuid::new_v4(), "Launch Night", 1);
        ticket.reserve().unwrap();

        let err = ticket.reserve().unwrap_err();
        assert!(matches!(err, BookingError::SoldOut));
        assert_eq!(ticket.available_count, 0);
    }
}
