use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/tickets/book", post(book_ticket))
        .route("/v1/tickets/{ticket_id}/inventory", get(get_inventory))
        .route("/v1/tickets/seed", post(seed_ticket))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookTicketRequest {
    ticket_id: Uuid,
    buyer_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BookTicketResponse {
    booking_id: Uuid,
    message: &'static str,
}

/// Admission endpoint. Replies 202 as soon as the intent is on the queue;
/// the confirmation arrives later over the notification stream.
async fn book_ticket(
    State(state): State<AppState>,
    Json(req): Json<BookTicketRequest>,
) -> Result<(StatusCode, Json<BookTicketResponse>), ApiError> {
    let booking_id = state.intake.book(req.ticket_id, req.buyer_id).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(BookTicketResponse {
            booking_id,
            message: "Booking accepted for settlement",
        }),
    ))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InventoryResponse {
    ticket_id: Uuid,
    available_count: i64,
}

/// Live counter read. This is the admission view, which may briefly run ahead
/// of the ledger while intents are still in flight.
async fn get_inventory(
    State(state): State<AppState>,
    Path(ticket_id): Path<Uuid>,
) -> Result<Json<InventoryResponse>, ApiError> {
    let available_count = state.intake.available(ticket_id).await?;

    Ok(Json(InventoryResponse {
        ticket_id,
        available_count,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeedTicketRequest {
    ticket_id: Uuid,
    event_label: String,
    count: i64,
}

/// Load-test and operations bootstrap: idempotently creates the ledger row
/// and the admission counter for a pool.
async fn seed_ticket(
    State(state): State<AppState>,
    Json(req): Json<SeedTicketRequest>,
) -> Result<Json<InventoryResponse>, ApiError> {
    let available_count = state
        .seeder
        .seed(req.ticket_id, &req.event_label, req.count)
        .await?;

    Ok(Json(InventoryResponse {
        ticket_id: req.ticket_id,
        available_count,
    }))
}
