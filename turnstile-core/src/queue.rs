use async_trait::async_trait;

use crate::{Booking, BookingError, BookingResult};

/// Topic carrying reservation intents from the admission edge to settlement.
pub const INTENT_TOPIC: &str = "booking-intents";

/// Consumer group shared by every settlement worker, so each intent lands on
/// exactly one of them.
pub const INTENT_GROUP: &str = "booking-group";

/// Producing side of the intent queue.
#[async_trait]
pub trait IntentProducer: Send + Sync {
    /// Hands an admitted reservation to the settlement path. Resolves once the
    /// broker has acknowledged the message.
    async fn publish(&self, intent: &Booking) -> BookingResult<()>;
}

/// One message pulled off the intent queue. Settlement acks it only after the
/// ledger write landed; deliveries that were never acked come back.
#[derive(Debug, Clone)]
pub struct IntentDelivery {
    pub payload: Vec<u8>,
    pub partition: i32,
    pub offset: i64,
    /// Correlation id stamped by the producer, carried for log stitching.
    pub correlation: Option<String>,
}

/// Consuming side of the intent queue, with explicit acknowledgement.
#[async_trait]
pub trait IntentConsumer: Send + Sync {
    /// Waits for the next delivery.
    async fn next(&mut self) -> BookingResult<IntentDelivery>;

    /// Marks the delivery settled; redelivery stops here.
    async fn ack(&mut self, delivery: &IntentDelivery) -> BookingResult<()>;
}

/// Decodes a wire payload back into a [`Booking`] intent.
pub fn decode_intent(payload: &[u8]) -> BookingResult<Booking> {
    serde_json::from_slice(payload).map_err(|e| BookingError::MalformedMessage(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn decode_rejects_garbage() {
        let err = decode_intent(b"not json at all").unwrap_err();
        assert!(matches!(err, BookingError::MalformedMessage(_)));
    }

    #[test]
    fn decode_rejects_wrong_shape() {
        let err = decode_intent(br#"{"id": 42}"#).unwrap_err();
        assert!(matches!(err, BookingError::MalformedMessage(_)));
    }

    #[test]
    fn decode_accepts_produced_payload() {
        let booking = Booking::new(Uuid::new_v4(), Uuid::new_v4());
        let payload = serde_json::to_vec(&booking).unwrap();
        assert_eq!(decode_intent(&payload).unwrap(), booking);
    }
}
