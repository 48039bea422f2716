use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use turnstile_core::{
    Booking, BookingError, BookingResult, BookingStatus, Ledger, SettleOutcome, Ticket,
};

pub struct StoreLedger {
    pool: PgPool,
}

impl StoreLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct TicketRow {
    id: Uuid,
    event_name: String,
    total_count: i64,
    available_count: i64,
    version: i64,
}

impl TicketRow {
    fn into_ticket(self) -> Ticket {
        Ticket {
            id: self.id,
            event_name: self.event_name,
            total_count: self.total_count,
            available_count: self.available_count,
            version: self.version,
        }
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    ticket_id: Uuid,
    buyer_id: Uuid,
    status: String,
    created_at: DateTime<Utc>,
}

impl BookingRow {
    fn into_booking(self) -> BookingResult<Booking> {
        Ok(Booking {
            id: self.id,
            ticket_id: self.ticket_id,
            buyer_id: self.buyer_id,
            status: BookingStatus::parse(&self.status)?,
            created_at: self.created_at,
        })
    }
}

fn storage_err(e: sqlx::Error) -> BookingError {
    BookingError::Storage(e.to_string())
}

const INSERT_BOOKING: &str = r#"
    INSERT INTO bookings (id, ticket_id, buyer_id, status, created_at)
    VALUES ($1, $2, $3, $4, $5)
    ON CONFLICT (id) DO NOTHING
"#;

const UPDATE_TICKET: &str = r#"
    UPDATE tickets
    SET available_count = $1, version = version + 1
    WHERE id = $2 AND version = $3
"#;

#[async_trait]
impl Ledger for StoreLedger {
    async fn get_ticket(&self, id: Uuid) -> BookingResult<Option<Ticket>> {
        let row = sqlx::query_as::<_, TicketRow>(
            "SELECT id, event_name, total_count, available_count, version FROM tickets WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(row.map(TicketRow::into_ticket))
    }

    async fn add_ticket(&self, ticket: &Ticket) -> BookingResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO tickets (id, event_name, total_count, available_count, version)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(ticket.id)
        .bind(&ticket.event_name)
        .bind(ticket.total_count)
        .bind(ticket.available_count)
        .bind(ticket.version)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_ticket(&self, ticket: &Ticket) -> BookingResult<()> {
        let result = sqlx::query(UPDATE_TICKET)
            .bind(ticket.available_count)
            .bind(ticket.id)
            .bind(ticket.version)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        // Zero rows means the version moved under us (or the row vanished,
        // which settlement treats the same way).
        if result.rows_affected() == 0 {
            return Err(BookingError::ConcurrencyConflict(ticket.id));
        }
        Ok(())
    }

    async fn get_booking(&self, id: Uuid) -> BookingResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(
            "SELECT id, ticket_id, buyer_id, status, created_at FROM bookings WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        row.map(BookingRow::into_booking).transpose()
    }

    async fn add_booking(&self, booking: &Booking) -> BookingResult<bool> {
        let result = sqlx::query(INSERT_BOOKING)
            .bind(booking.id)
            .bind(booking.ticket_id)
            .bind(booking.buyer_id)
            .bind(booking.status.as_str())
            .bind(booking.created_at)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn settle(&self, ticket: &Ticket, booking: &Booking) -> BookingResult<SettleOutcome> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        // Booking insert goes first: a duplicate delivery must bail out
        // before it can touch the ticket count.
        let inserted = sqlx::query(INSERT_BOOKING)
            .bind(booking.id)
            .bind(booking.ticket_id)
            .bind(booking.buyer_id)
            .bind(booking.status.as_str())
            .bind(booking.created_at)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;

        if inserted.rows_affected() == 0 {
            tx.rollback().await.map_err(storage_err)?;
            return Ok(SettleOutcome::AlreadySettled);
        }

        let updated = sqlx::query(UPDATE_TICKET)
            .bind(ticket.available_count)
            .bind(ticket.id)
            .bind(ticket.version)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;

        if updated.rows_affected() == 0 {
            tx.rollback().await.map_err(storage_err)?;
            return Err(BookingError::ConcurrencyConflict(ticket.id));
        }

        tx.commit().await.map_err(storage_err)?;
        info!(
            "Settled booking {} on ticket {}: {} left",
            booking.id, ticket.id, ticket.available_count
        );
        Ok(SettleOutcome::Applied)
    }
}
