use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{Header, Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};
use std::time::Duration;
use tracing::{error, info};

use async_trait::async_trait;
use uuid::Uuid;

use turnstile_core::{
    Booking, BookingError, BookingResult, IntentConsumer, IntentDelivery, IntentProducer,
};

/// Header carrying the producer-side correlation id across the queue.
const CORRELATION_HEADER: &str = "x-correlation-id";

/// Kafka producer for reservation intents, keyed by ticket id so all intents
/// for one pool land on one partition and settle in admission order.
#[derive(Clone)]
pub struct KafkaIntentProducer {
    producer: FutureProducer,
    topic: String,
}

impl KafkaIntentProducer {
    pub fn new(brokers: &str, topic: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self {
            producer,
            topic: topic.to_string(),
        })
    }
}

#[async_trait]
impl IntentProducer for KafkaIntentProducer {
    async fn publish(&self, intent: &Booking) -> BookingResult<()> {
        let payload = serde_json::to_vec(intent)
            .map_err(|e| BookingError::BrokerUnavailable(e.to_string()))?;
        let key = intent.ticket_id.to_string();
        let correlation = Uuid::new_v4().simple().to_string();

        let record = FutureRecord::to(&self.topic)
            .key(&key)
            .payload(&payload)
            .headers(OwnedHeaders::new().insert(Header {
                key: CORRELATION_HEADER,
                value: Some(&correlation),
            }));

        match self
            .producer
            .send(record, Timeout::After(Duration::from_secs(0)))
            .await
        {
            Ok(delivery) => {
                let partition = delivery.partition;
                let offset = delivery.offset;
                info!(
                    "Sent intent {} to {}: partition {} offset {} correlation {}",
                    intent.id, self.topic, partition, offset, correlation
                );
                Ok(())
            }
            Err((e, _msg)) => {
                error!("Failed to send intent {} to {}: {}", intent.id, self.topic, e);
                Err(BookingError::BrokerUnavailable(e.to_string()))
            }
        }
    }
}

/// Settlement-side consumer. Auto-commit is off: an offset is committed only
/// after the ledger write landed, so a crash in between replays the intent.
pub struct KafkaIntentConsumer {
    consumer: StreamConsumer,
    topic: String,
}

impl KafkaIntentConsumer {
    pub fn new(brokers: &str, group_id: &str, topic: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .create()?;
        consumer.subscribe(&[topic])?;
        info!("Subscribed to {} as group {}", topic, group_id);

        Ok(Self {
            consumer,
            topic: topic.to_string(),
        })
    }
}

#[async_trait]
impl IntentConsumer for KafkaIntentConsumer {
    async fn next(&mut self) -> BookingResult<IntentDelivery> {
        let message = self
            .consumer
            .recv()
            .await
            .map_err(|e| BookingError::BrokerUnavailable(e.to_string()))?;

        let correlation = message.headers().and_then(|headers| {
            headers
                .iter()
                .find(|h| h.key == CORRELATION_HEADER)
                .and_then(|h| h.value.map(|v| String::from_utf8_lossy(v).into_owned()))
        });

        Ok(IntentDelivery {
            payload: message.payload().unwrap_or_default().to_vec(),
            partition: message.partition(),
            offset: message.offset(),
            correlation,
        })
    }

    async fn ack(&mut self, delivery: &IntentDelivery) -> BookingResult<()> {
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(
                &self.topic,
                delivery.partition,
                Offset::Offset(delivery.offset + 1),
            )
            .map_err(|e| BookingError::BrokerUnavailable(e.to_string()))?;
        self.consumer
            .commit(&offsets, CommitMode::Async)
            .map_err(|e| BookingError::BrokerUnavailable(e.to_string()))?;
        Ok(())
    }
}
