use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use turnstile_core::BookingError;

/// HTTP boundary around [`BookingError`]. Client-caused conditions keep their
/// message; infrastructure faults are logged and collapsed to a generic body.
#[derive(Debug)]
pub struct ApiError(BookingError);

impl From<BookingError> for ApiError {
    fn from(err: BookingError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self.0 {
            BookingError::SoldOut => (StatusCode::CONFLICT, self.0.to_string()),
            BookingError::TicketNotFound(_) => (StatusCode::NOT_FOUND, self.0.to_string()),
            BookingError::MalformedMessage(_) => (StatusCode::BAD_REQUEST, self.0.to_string()),
            BookingError::BrokerUnavailable(_) | BookingError::Cache(_) => {
                tracing::error!("Pipeline unavailable: {}", self.0);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Booking pipeline unavailable".to_string(),
                )
            }
            _ => {
                tracing::error!("Internal Server Error: {}", self.0);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
