//! Repository trait definitions (Ports)
//!
//! These traits define the storage interface for the domain.
//! Implementations can be PostgreSQL, in-memory, or mock for testing.
//!
//! Each mutating method is its own transaction boundary. Callers never
//! hold a transaction open across calls.

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use swiftslot_domain::{
    Booking, BookingId, IdempotencyRecord, PaymentAttempt, PaymentRef, Vendor, VendorId,
};

/// Repository for Vendor entities
#[async_trait]
pub trait VendorRepository: Send + Sync {
    /// Insert a vendor (no-op if the id already exists)
    async fn save(&self, vendor: &Vendor) -> Result<(), StoreError>;

    /// Find a vendor by ID
    async fn find_by_id(&self, id: VendorId) -> Result<Option<Vendor>, StoreError>;

    /// All vendors ordered by id
    async fn list(&self) -> Result<Vec<Vendor>, StoreError>;
}

/// Repository for Booking entities and their slot claims
#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Atomically insert `booking` and its slot claim.
    ///
    /// # Errors
    /// `StoreError::Duplicate` if (vendor, slot start) is already claimed;
    /// nothing is written in that case.
    async fn insert_with_claim(&self, booking: &Booking) -> Result<(), StoreError>;

    /// Find a booking by ID
    async fn find_by_id(&self, id: BookingId) -> Result<Option<Booking>, StoreError>;

    /// All bookings, newest first
    async fn list(&self) -> Result<Vec<Booking>, StoreError>;

    /// Claimed slot starts for a vendor within `[from, to]`, ascending
    async fn claimed_slots(
        &self,
        vendor_id: VendorId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, StoreError>;
}

/// Result of confirming a payment attempt in storage
#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmOutcome {
    /// Attempt and booking were both set to paid in one unit
    Confirmed(PaymentAttempt),
    /// Attempt was already paid; nothing was written
    AlreadyPaid(PaymentAttempt),
}

/// Repository for PaymentAttempt entities
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Insert `attempt` unless its booking already has one.
    ///
    /// Returns the attempt that is stored for the booking afterwards (the
    /// given one, or the pre-existing one).
    ///
    /// # Errors
    /// `StoreError::NotFound` if the booking does not exist.
    async fn insert_if_absent(&self, attempt: &PaymentAttempt) -> Result<PaymentAttempt, StoreError>;

    /// Find the attempt for a booking
    async fn find_by_booking(&self, booking_id: BookingId) -> Result<Option<PaymentAttempt>, StoreError>;

    /// Mark the attempt paid (keeping `event` as audit payload) and its
    /// booking paid, as one atomic unit.
    ///
    /// # Errors
    /// `StoreError::NotFound` if no attempt has `reference`.
    async fn confirm(
        &self,
        reference: &PaymentRef,
        event: &serde_json::Value,
        at: DateTime<Utc>,
    ) -> Result<ConfirmOutcome, StoreError>;
}

/// Repository for IdempotencyRecord entities (insert/read only)
#[async_trait]
pub trait IdempotencyRepository: Send + Sync {
    /// Find the record for `key`
    async fn find(&self, key: &str) -> Result<Option<IdempotencyRecord>, StoreError>;

    /// Insert a record.
    ///
    /// # Errors
    /// `StoreError::Duplicate` if a record for the key already exists.
    async fn insert(&self, record: &IdempotencyRecord) -> Result<(), StoreError>;
}

/// Combined store interface
pub trait Store: Send + Sync {
    /// Get vendor repository
    fn vendors(&self) -> &dyn VendorRepository;

    /// Get booking repository
    fn bookings(&self) -> &dyn BookingRepository;

    /// Get payment repository
    fn payments(&self) -> &dyn PaymentRepository;

    /// Get idempotency repository
    fn idempotency(&self) -> &dyn IdempotencyRepository;
}
