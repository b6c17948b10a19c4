//! Domain Entities for SwiftSlot
//!
//! Vendors, bookings with their slot claims, payment attempts and
//! idempotency records.

use crate::value_objects::{DomainError, PaymentRef, VendorTimezone};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// =============================================================================
// IDs
// =============================================================================

/// Unique identifier for a Vendor
pub type VendorId = i64;

/// Identifier of a buyer, resolved by an external identity collaborator
pub type BuyerId = i64;

/// Unique identifier for a Booking
pub type BookingId = Uuid;

/// Unique identifier for a PaymentAttempt
pub type PaymentAttemptId = Uuid;

/// Length of every bookable slot
pub const SLOT_DURATION_MINUTES: i64 = 30;

/// Slot length as a `Duration`
pub fn slot_duration() -> Duration {
    Duration::minutes(SLOT_DURATION_MINUTES)
}

// =============================================================================
// Vendor
// =============================================================================

/// A vendor whose time can be booked. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vendor {
    pub id: VendorId,
    pub name: String,
    pub timezone: VendorTimezone,
}

impl Vendor {
    /// Create a vendor
    pub fn new(id: VendorId, name: impl Into<String>, timezone: VendorTimezone) -> Self {
        Self { id, name: name.into(), timezone }
    }
}

// =============================================================================
// Booking
// =============================================================================

/// Booking lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    /// Slot held, not yet paid
    Pending,
    /// Payment confirmed
    Paid,
}

impl BookingStatus {
    /// Storage/wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Paid => "paid",
        }
    }
}

impl FromStr for BookingStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "paid" => Ok(BookingStatus::Paid),
            other => Err(DomainError::InvalidStatus(other.to_string())),
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A buyer's hold on one vendor slot
///
/// Created only together with its `SlotClaim`. The status is changed only
/// by a payment confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub vendor_id: VendorId,
    pub buyer_id: BuyerId,
    pub start_time_utc: DateTime<Utc>,
    pub end_time_utc: DateTime<Utc>,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    /// Create a pending booking for the slot starting at `start_time_utc`
    pub fn new(vendor_id: VendorId, buyer_id: BuyerId, start_time_utc: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            vendor_id,
            buyer_id,
            start_time_utc,
            end_time_utc: start_time_utc + slot_duration(),
            status: BookingStatus::Pending,
            created_at: Utc::now(),
        }
    }

    /// The slot claim this booking owns
    pub fn claim(&self) -> SlotClaim {
        SlotClaim {
            vendor_id: self.vendor_id,
            slot_start_utc: self.start_time_utc,
            booking_id: self.id,
        }
    }

    /// Check if the booking has been paid
    pub fn is_paid(&self) -> bool {
        self.status == BookingStatus::Paid
    }
}

// =============================================================================
// SlotClaim
// =============================================================================

/// Uniqueness artifact: at most one claim per (vendor, slot start)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotClaim {
    pub vendor_id: VendorId,
    pub slot_start_utc: DateTime<Utc>,
    pub booking_id: BookingId,
}

// =============================================================================
// PaymentAttempt
// =============================================================================

/// Payment attempt status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Awaiting confirmation
    Pending,
    /// Confirmed (terminal)
    Paid,
}

impl PaymentStatus {
    /// Storage/wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            other => Err(DomainError::InvalidStatus(other.to_string())),
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of applying a confirmation to a payment attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentTransition {
    /// pending → paid happened now
    Confirmed,
    /// Attempt was already paid; nothing changed
    AlreadyPaid,
}

/// One checkout attempt for a booking
///
/// State machine: `Pending → Paid`. `Paid` is terminal and only reachable
/// through [`PaymentAttempt::confirm`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentAttempt {
    pub id: PaymentAttemptId,
    pub booking_id: BookingId,
    pub reference: PaymentRef,
    pub status: PaymentStatus,
    pub raw_event: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl PaymentAttempt {
    /// Create a pending attempt with a fresh reference
    pub fn new(booking_id: BookingId) -> Self {
        Self {
            id: Uuid::now_v7(),
            booking_id,
            reference: PaymentRef::generate(),
            status: PaymentStatus::Pending,
            raw_event: None,
            created_at: Utc::now(),
            paid_at: None,
        }
    }

    /// Apply a confirmation event.
    ///
    /// The first confirmation stores `event` as the audit payload; later
    /// ones leave the attempt untouched.
    pub fn confirm(&mut self, event: serde_json::Value, at: DateTime<Utc>) -> PaymentTransition {
        match self.status {
            PaymentStatus::Paid => PaymentTransition::AlreadyPaid,
            PaymentStatus::Pending => {
                self.status = PaymentStatus::Paid;
                self.raw_event = Some(event);
                self.paid_at = Some(at);
                PaymentTransition::Confirmed
            },
        }
    }

    /// Check if the attempt is paid
    pub fn is_paid(&self) -> bool {
        self.status == PaymentStatus::Paid
    }
}

// =============================================================================
// Idempotency
// =============================================================================

/// A response produced by a guarded handler, kept verbatim for replay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResponse {
    /// HTTP status code
    pub status: u16,
    /// Exact serialized body
    pub body: String,
}

impl StoredResponse {
    /// Serialize `body` as JSON once; the resulting bytes are what gets replayed
    ///
    /// # Errors
    /// Returns `DomainError::InvalidStoredResponse` if `body` cannot be serialized
    pub fn json<T: Serialize>(status: u16, body: &T) -> Result<Self, DomainError> {
        let body = serde_json::to_string(body)
            .map_err(|e| DomainError::InvalidStoredResponse(e.to_string()))?;
        Ok(Self { status, body })
    }
}

/// Binding of an idempotency key to the response first produced for it.
/// Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: String,
    pub scope: String,
    /// Encoded [`StoredResponse`]
    pub response_payload: String,
    pub created_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    /// Encode `response` into a new record
    ///
    /// # Errors
    /// Returns `DomainError::InvalidStoredResponse` if encoding fails
    pub fn new(
        key: impl Into<String>,
        scope: impl Into<String>,
        response: &StoredResponse,
    ) -> Result<Self, DomainError> {
        let response_payload = serde_json::to_string(response)
            .map_err(|e| DomainError::InvalidStoredResponse(e.to_string()))?;
        Ok(Self {
            key: key.into(),
            scope: scope.into(),
            response_payload,
            created_at: Utc::now(),
        })
    }

    /// Decode the stored response
    ///
    /// # Errors
    /// Returns `DomainError::InvalidStoredResponse` if the payload is corrupt
    pub fn response(&self) -> Result<StoredResponse, DomainError> {
        serde_json::from_str(&self.response_payload)
            .map_err(|e| DomainError::InvalidStoredResponse(e.to_string()))
    }
}
