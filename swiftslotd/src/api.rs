//! HTTP API for the SwiftSlot daemon.
//!
//! Provides REST endpoints for:
//! - Health check
//! - Vendors and their availability
//! - Bookings (create is guarded by `Idempotency-Key`)
//! - Payment initialization and the confirmation webhook

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, Query, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::error;
use uuid::Uuid;

use swiftslot_domain::{
    Booking, BookingId, BookingStatus, BuyerId, PaymentRef, PaymentStatus, SlotCalendar,
    StoredResponse, Vendor, VendorId,
};
use swiftslot_engine::{
    ConfirmOutcome, EngineError, IdempotencyGuard, PaymentMachine, ReservationEngine,
    ReservationRequest, CREATE_BOOKING_SCOPE,
};
use swiftslot_store::Store;

use crate::config::Config;

/// Header carrying the caller's idempotency key
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

// =============================================================================
// API State
// =============================================================================

/// Shared state for API handlers.
pub struct ApiState<S: Store + 'static> {
    pub reservations: ReservationEngine<S>,
    pub idempotency: IdempotencyGuard<S>,
    pub payments: PaymentMachine<S>,
    pub default_buyer_id: BuyerId,
    pub request_timeout: Duration,
}

impl<S: Store + 'static> ApiState<S> {
    /// Wire the engine components over `store`.
    pub fn new(store: Arc<S>, config: &Config) -> Self {
        Self {
            reservations: ReservationEngine::new(
                store.clone(),
                SlotCalendar::default(),
                config.booking.policy(),
            ),
            idempotency: IdempotencyGuard::new(store.clone()),
            payments: PaymentMachine::new(store),
            default_buyer_id: config.booking.default_buyer_id,
            request_timeout: config.api.request_timeout,
        }
    }
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Body of a successful reservation.
#[derive(Debug, Serialize)]
pub struct BookingCreated {
    pub id: BookingId,
    pub vendor_id: VendorId,
    pub start_time_utc: DateTime<Utc>,
    pub end_time_utc: DateTime<Utc>,
    pub status: BookingStatus,
}

impl From<&Booking> for BookingCreated {
    fn from(booking: &Booking) -> Self {
        Self {
            id: booking.id,
            vendor_id: booking.vendor_id,
            start_time_utc: booking.start_time_utc,
            end_time_utc: booking.end_time_utc,
            status: booking.status,
        }
    }
}

/// Availability query string.
#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub date: Option<String>,
}

/// Free slots of one vendor day.
#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub available_slots: Vec<DateTime<Utc>>,
}

/// Request to start checkout.
#[derive(Debug, Deserialize)]
pub struct InitializePaymentRequest {
    pub booking_id: Option<BookingId>,
}

/// Checkout reference handed to the payment provider.
#[derive(Debug, Serialize)]
pub struct PaymentInitialized {
    #[serde(rename = "ref")]
    pub reference: PaymentRef,
    pub status: PaymentStatus,
}

/// Webhook acknowledgement.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub message: String,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

// =============================================================================
// Router
// =============================================================================

/// Create the API router.
pub fn create_router<S>(state: Arc<ApiState<S>>) -> Router
where
    S: Store + 'static,
{
    let timeout = state.request_timeout;

    Router::new()
        .route("/health", get(health_handler))
        .route("/vendors", get(list_vendors_handler))
        .route("/vendors/:id", get(get_vendor_handler))
        .route("/vendors/:id/availability", get(availability_handler))
        .route("/bookings", get(list_bookings_handler).post(create_booking_handler))
        .route("/bookings/:id", get(get_booking_handler))
        .route("/payments/initialize", post(initialize_payment_handler))
        .route("/payments/webhook", post(payment_webhook_handler))
        .with_state(state)
        .layer(TimeoutLayer::new(timeout))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint.
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn list_vendors_handler<S: Store + 'static>(
    State(state): State<Arc<ApiState<S>>>,
) -> Result<Json<Vec<Vendor>>, ApiError> {
    let vendors = state.reservations.list_vendors().await.map_err(|e| to_error_response(&e))?;
    Ok(Json(vendors))
}

async fn get_vendor_handler<S: Store + 'static>(
    State(state): State<Arc<ApiState<S>>>,
    id: Result<Path<VendorId>, PathRejection>,
) -> Result<Json<Vendor>, ApiError> {
    let Path(id) = id.map_err(path_error)?;
    let vendor = state.reservations.get_vendor(id).await.map_err(|e| to_error_response(&e))?;
    Ok(Json(vendor))
}

/// Free slot starts for `?date=YYYY-MM-DD`.
async fn availability_handler<S: Store + 'static>(
    State(state): State<Arc<ApiState<S>>>,
    id: Result<Path<VendorId>, PathRejection>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, ApiError> {
    let Path(id) = id.map_err(path_error)?;

    let date = query
        .date
        .as_deref()
        .and_then(|raw| NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok())
        .ok_or_else(|| {
            to_error_response(&EngineError::validation(
                "invalid_date",
                "Query parameter `date` must be YYYY-MM-DD",
            ))
        })?;

    let available_slots = state
        .reservations
        .availability(id, date)
        .await
        .map_err(|e| to_error_response(&e))?;

    Ok(Json(AvailabilityResponse { available_slots }))
}

async fn list_bookings_handler<S: Store + 'static>(
    State(state): State<Arc<ApiState<S>>>,
) -> Result<Json<Vec<Booking>>, ApiError> {
    let bookings = state.reservations.list_bookings().await.map_err(|e| to_error_response(&e))?;
    Ok(Json(bookings))
}

async fn get_booking_handler<S: Store + 'static>(
    State(state): State<Arc<ApiState<S>>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Booking>, ApiError> {
    // An unparseable id names no booking.
    let Path(id) = id.map_err(|_| {
        to_error_response(&EngineError::not_found("booking_not_found", "Booking not found"))
    })?;
    let booking = state.reservations.get_booking(id).await.map_err(|e| to_error_response(&e))?;
    Ok(Json(booking))
}

/// Reserve a slot.
///
/// The whole response, errors included, is recorded under the
/// `Idempotency-Key` header and replayed verbatim on retries.
async fn create_booking_handler<S: Store + 'static>(
    State(state): State<Arc<ApiState<S>>>,
    headers: HeaderMap,
    payload: Result<Json<ReservationRequest>, JsonRejection>,
) -> Response {
    let key = headers.get(IDEMPOTENCY_KEY_HEADER).and_then(|value| value.to_str().ok());
    let reservations = &state.reservations;
    let buyer_id = state.default_buyer_id;

    let outcome = state
        .idempotency
        .execute(key, CREATE_BOOKING_SCOPE, || async move {
            let request = match payload {
                Ok(Json(request)) => request,
                Err(rejection) => {
                    return stored_error(&EngineError::validation("invalid_body", rejection.body_text()))
                },
            };

            match reservations.reserve(&request, buyer_id).await {
                Ok(booking) => stored_json(StatusCode::CREATED, &BookingCreated::from(&booking)),
                Err(e) => stored_error(&e),
            }
        })
        .await;

    match outcome {
        Ok(stored) => stored_response(stored),
        Err(e) => to_error_response(&e).into_response(),
    }
}

async fn initialize_payment_handler<S: Store + 'static>(
    State(state): State<Arc<ApiState<S>>>,
    payload: Result<Json<InitializePaymentRequest>, JsonRejection>,
) -> Result<Json<PaymentInitialized>, ApiError> {
    let Json(request) = payload.map_err(json_error)?;

    let attempt = state
        .payments
        .initialize(request.booking_id)
        .await
        .map_err(|e| to_error_response(&e))?;

    Ok(Json(PaymentInitialized {
        reference: attempt.reference,
        status: attempt.status,
    }))
}

/// Payment provider callback. The `event` field is kept as the audit payload.
async fn payment_webhook_handler<S: Store + 'static>(
    State(state): State<Arc<ApiState<S>>>,
    payload: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<WebhookResponse>, ApiError> {
    let Json(event) = payload.map_err(json_error)?;
    let reference = event.get("ref").and_then(serde_json::Value::as_str);
    let provider_event = event.get("event").cloned().unwrap_or(serde_json::Value::Null);

    let outcome = state
        .payments
        .confirm(reference, provider_event)
        .await
        .map_err(|e| to_error_response(&e))?;

    let message = match outcome {
        ConfirmOutcome::Confirmed(_) => "Payment successful",
        ConfirmOutcome::AlreadyPaid(_) => "Already paid",
    };

    Ok(Json(WebhookResponse { message: message.to_string() }))
}

// =============================================================================
// Helpers
// =============================================================================

/// Map an engine error to its HTTP status and `{error, code}` body.
pub fn to_error_response(error: &EngineError) -> ApiError {
    let status = match error {
        EngineError::Validation { .. } => StatusCode::BAD_REQUEST,
        EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
        EngineError::Conflict { .. } => StatusCode::CONFLICT,
        EngineError::Store(_) | EngineError::Domain(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let message = if error.is_internal() {
        error!(error = %error, "Request failed");
        "Internal server error".to_string()
    } else {
        error.to_string()
    };

    (
        status,
        Json(ErrorResponse {
            error: message,
            code: error.code().to_string(),
        }),
    )
}

fn json_error(rejection: JsonRejection) -> ApiError {
    to_error_response(&EngineError::validation("invalid_body", rejection.body_text()))
}

fn path_error(rejection: PathRejection) -> ApiError {
    to_error_response(&EngineError::validation("invalid_id", rejection.body_text()))
}

fn stored_json<T: Serialize>(status: StatusCode, body: &T) -> StoredResponse {
    StoredResponse::json(status.as_u16(), body).unwrap_or_else(|e| {
        error!(error = %e, "Failed to encode response body");
        StoredResponse {
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            body: r#"{"error":"Internal server error","code":"internal_error"}"#.to_string(),
        }
    })
}

fn stored_error(error: &EngineError) -> StoredResponse {
    let (status, Json(body)) = to_error_response(error);
    stored_json(status, &body)
}

/// Emit a recorded response exactly as stored.
fn stored_response(stored: StoredResponse) -> Response {
    let status = StatusCode::from_u16(stored.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, [(header::CONTENT_TYPE, "application/json")], stored.body).into_response()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use swiftslot_store::StoreError;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (EngineError::validation("missing_fields", "Missing required fields"), StatusCode::BAD_REQUEST),
            (EngineError::not_found("booking_not_found", "Booking not found"), StatusCode::NOT_FOUND),
            (EngineError::conflict("slot_conflict", "Slot already booked"), StatusCode::CONFLICT),
            (
                EngineError::Store(StoreError::Database("disk full".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            let (status, Json(body)) = to_error_response(&error);
            assert_eq!(status, expected);
            assert_eq!(body.code, error.code());
        }
    }

    #[test]
    fn test_internal_error_message_is_generic() {
        let (_, Json(body)) =
            to_error_response(&EngineError::Store(StoreError::Database("secret detail".into())));
        assert_eq!(body.error, "Internal server error");
        assert_eq!(body.code, "internal_error");
    }

    #[test]
    fn test_stored_error_body() {
        let stored = stored_error(&EngineError::conflict("slot_conflict", "Slot already booked"));
        assert_eq!(stored.status, 409);
        assert_eq!(stored.body, r#"{"error":"Slot already booked","code":"slot_conflict"}"#);
    }
}
