use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, RedisResult};
use tracing::debug;
use uuid::Uuid;

use turnstile_core::{BookingError, BookingResult, InventoryCache};

/// Redis-backed admission counters, one key per ticket. All mutation goes
/// through server-side INCR/DECR, so concurrent callers across processes see
/// one consistent counter without any locking on our side.
#[derive(Clone)]
pub struct RedisInventoryCache {
    client: redis::Client,
    op_timeout: Duration,
}

impl RedisInventoryCache {
    pub async fn new(connection_string: &str, op_timeout: Duration) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client, op_timeout })
    }

    fn key(ticket_id: Uuid) -> String {
        format!("ticket:{}:availability", ticket_id)
    }

    async fn with_timeout<T>(&self, op: impl Future<Output = RedisResult<T>>) -> BookingResult<T> {
        match tokio::time::timeout(self.op_timeout, op).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(BookingError::Cache(e.to_string())),
            Err(_) => Err(BookingError::Cache(format!(
                "operation timed out after {:?}",
                self.op_timeout
            ))),
        }
    }

    async fn connection(&self) -> BookingResult<redis::aio::MultiplexedConnection> {
        self.with_timeout(self.client.get_multiplexed_async_connection())
            .await
    }
}

#[async_trait]
impl InventoryCache for RedisInventoryCache {
    async fn initialize(&self, ticket_id: Uuid, count: i64) -> BookingResult<()> {
        let mut conn = self.connection().await?;
        let key = Self::key(ticket_id);

        // SET NX: only seed if the key does not exist, so a re-seed can never
        // clobber a counter mid-sale.
        let outcome: Option<String> = self
            .with_timeout(async {
                redis::cmd("SET")
                    .arg(&key)
                    .arg(count)
                    .arg("NX")
                    .query_async(&mut conn)
                    .await
            })
            .await?;

        if outcome.is_some() {
            debug!("Availability counter seeded: {} = {}", key, count);
        } else {
            debug!("Availability counter already present, left untouched: {}", key);
        }
        Ok(())
    }

    async fn try_reserve(&self, ticket_id: Uuid) -> BookingResult<bool> {
        let mut conn = self.connection().await?;
        let key = Self::key(ticket_id);

        // DECR first, then hand the unit back if we drove the counter
        // negative. An absent key decrements to -1 and is compensated the
        // same way, so unseeded tickets read as sold out.
        let remaining: i64 = self.with_timeout(conn.decr(&key, 1)).await?;
        if remaining < 0 {
            let _: i64 = self.with_timeout(conn.incr(&key, 1)).await?;
            return Ok(false);
        }
        Ok(true)
    }

    async fn release(&self, ticket_id: Uuid) -> BookingResult<()> {
        let mut conn = self.connection().await?;
        let key = Self::key(ticket_id);
        let _: i64 = self.with_timeout(conn.incr(&key, 1)).await?;
        Ok(())
    }

    async fn available(&self, ticket_id: Uuid) -> BookingResult<i64> {
        let mut conn = self.connection().await?;
        let key = Self::key(ticket_id);
        let count: Option<i64> = self.with_timeout(conn.get(&key)).await?;
        Ok(count.unwrap_or(0))
    }
}
