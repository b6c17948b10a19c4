//! Payment State Machine: `pending → paid`, reached once per attempt.
//!
//! The transition itself is [`PaymentAttempt::confirm`]; this module wires
//! it to the store so the attempt and its booking change together.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use swiftslot_domain::{BookingId, PaymentAttempt, PaymentRef};
use swiftslot_store::{ConfirmOutcome, Store, StoreError};

use crate::error::{EngineError, EngineResult};

/// Checkout initialization and confirmation.
pub struct PaymentMachine<S: Store> {
    store: Arc<S>,
}

impl<S: Store> PaymentMachine<S> {
    /// Create a new payment machine.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Start checkout for a booking.
    ///
    /// A booking has at most one attempt; a repeated call returns the
    /// existing one unchanged.
    pub async fn initialize(&self, booking_id: Option<BookingId>) -> EngineResult<PaymentAttempt> {
        let booking_id = booking_id
            .ok_or_else(|| EngineError::validation("missing_fields", "Missing booking_id"))?;

        let attempt = match self.store.payments().insert_if_absent(&PaymentAttempt::new(booking_id)).await {
            Ok(attempt) => attempt,
            Err(StoreError::NotFound { .. }) => {
                return Err(EngineError::not_found("booking_not_found", "Booking not found"))
            },
            Err(e) => return Err(e.into()),
        };

        info!(
            %booking_id,
            reference = %attempt.reference,
            status = %attempt.status,
            "Payment initialized"
        );
        Ok(attempt)
    }

    /// Apply a confirmation event for `reference`.
    ///
    /// Confirming an already paid attempt is a successful no-op.
    pub async fn confirm(
        &self,
        reference: Option<&str>,
        event: serde_json::Value,
    ) -> EngineResult<ConfirmOutcome> {
        let reference = reference
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .ok_or_else(|| {
                EngineError::validation("missing_payment_reference", "Missing payment reference")
            })?;
        let reference = PaymentRef::new(reference)?;

        match self.store.payments().confirm(&reference, &event, Utc::now()).await {
            Ok(ConfirmOutcome::Confirmed(attempt)) => {
                info!(%reference, booking_id = %attempt.booking_id, "Payment confirmed");
                Ok(ConfirmOutcome::Confirmed(attempt))
            },
            Ok(ConfirmOutcome::AlreadyPaid(attempt)) => {
                info!(%reference, booking_id = %attempt.booking_id, "Payment already confirmed");
                Ok(ConfirmOutcome::AlreadyPaid(attempt))
            },
            Err(StoreError::NotFound { .. }) => {
                warn!(%reference, "Confirmation for unknown payment");
                Err(EngineError::not_found("payment_not_found", "Payment not found"))
            },
            Err(e) => Err(e.into()),
        }
    }

    /// Attempt for a booking, if checkout was started
    pub async fn find_by_booking(&self, booking_id: BookingId) -> EngineResult<Option<PaymentAttempt>> {
        Ok(self.store.payments().find_by_booking(booking_id).await?)
    }
}
