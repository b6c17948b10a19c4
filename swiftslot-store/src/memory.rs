//! In-memory store implementation
//!
//! Used for testing and development without a database.
//! All tables live behind one `RwLock`; each repository method takes the
//! lock once, so every mutation is applied as a single atomic unit. The
//! lock is never held across an await point.

use crate::error::StoreError;
use crate::repository::{
    BookingRepository, ConfirmOutcome, IdempotencyRepository, PaymentRepository, Store,
    VendorRepository,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use swiftslot_domain::{
    Booking, BookingId, BookingStatus, IdempotencyRecord, PaymentAttempt, PaymentRef,
    PaymentTransition, Vendor, VendorId,
};

/// In-memory store for testing
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

#[derive(Default)]
struct Tables {
    vendors: BTreeMap<VendorId, Vendor>,
    bookings: HashMap<BookingId, Booking>,
    /// (vendor, slot start) → booking holding it
    claims: BTreeMap<(VendorId, DateTime<Utc>), BookingId>,
    /// booking → its single payment attempt
    payments: HashMap<BookingId, PaymentAttempt>,
    /// reference token → booking
    payment_refs: HashMap<String, BookingId>,
    idempotency: HashMap<String, IdempotencyRecord>,
}

impl MemoryStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }

    /// Create a store pre-populated with `vendors`
    pub fn with_vendors(vendors: impl IntoIterator<Item = Vendor>) -> Self {
        let tables = Tables {
            vendors: vendors.into_iter().map(|v| (v.id, v)).collect(),
            ..Tables::default()
        };
        Self { tables: RwLock::new(tables) }
    }

    /// Get the number of bookings
    pub fn booking_count(&self) -> usize {
        self.read().map(|t| t.bookings.len()).unwrap_or(0)
    }

    /// Get the number of slot claims
    pub fn claim_count(&self) -> usize {
        self.read().map(|t| t.claims.len()).unwrap_or(0)
    }

    /// Get the number of payment attempts
    pub fn payment_count(&self) -> usize {
        self.read().map(|t| t.payments.len()).unwrap_or(0)
    }

    /// Get the number of idempotency records
    pub fn idempotency_count(&self) -> usize {
        self.read().map(|t| t.idempotency.len()).unwrap_or(0)
    }

    /// Clear all bookings, payments and idempotency records (vendors stay)
    pub fn clear(&self) {
        if let Ok(mut tables) = self.write() {
            tables.bookings.clear();
            tables.claims.clear();
            tables.payments.clear();
            tables.payment_refs.clear();
            tables.idempotency.clear();
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Database("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Database("memory store lock poisoned".to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Vendor Repository Implementation
// =============================================================================

#[async_trait]
impl VendorRepository for MemoryStore {
    async fn save(&self, vendor: &Vendor) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        tables.vendors.entry(vendor.id).or_insert_with(|| vendor.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: VendorId) -> Result<Option<Vendor>, StoreError> {
        Ok(self.read()?.vendors.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Vendor>, StoreError> {
        Ok(self.read()?.vendors.values().cloned().collect())
    }
}

// =============================================================================
// Booking Repository Implementation
// =============================================================================

#[async_trait]
impl BookingRepository for MemoryStore {
    async fn insert_with_claim(&self, booking: &Booking) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let claim_key = (booking.vendor_id, booking.start_time_utc);

        if tables.claims.contains_key(&claim_key) {
            return Err(StoreError::duplicate(
                "slot_claim",
                format!("{}@{}", booking.vendor_id, booking.start_time_utc.to_rfc3339()),
            ));
        }

        tables.claims.insert(claim_key, booking.id);
        tables.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: BookingId) -> Result<Option<Booking>, StoreError> {
        Ok(self.read()?.bookings.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Booking>, StoreError> {
        let tables = self.read()?;
        let mut bookings: Vec<Booking> = tables.bookings.values().cloned().collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(bookings)
    }

    async fn claimed_slots(
        &self,
        vendor_id: VendorId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, StoreError> {
        if from > to {
            return Ok(Vec::new());
        }
        let tables = self.read()?;
        Ok(tables
            .claims
            .range((vendor_id, from)..=(vendor_id, to))
            .map(|((_, start), _)| *start)
            .collect())
    }
}

// =============================================================================
// Payment Repository Implementation
// =============================================================================

#[async_trait]
impl PaymentRepository for MemoryStore {
    async fn insert_if_absent(&self, attempt: &PaymentAttempt) -> Result<PaymentAttempt, StoreError> {
        let mut tables = self.write()?;

        if !tables.bookings.contains_key(&attempt.booking_id) {
            return Err(StoreError::not_found("booking", attempt.booking_id.to_string()));
        }
        if let Some(existing) = tables.payments.get(&attempt.booking_id) {
            return Ok(existing.clone());
        }
        if tables.payment_refs.contains_key(attempt.reference.as_str()) {
            return Err(StoreError::duplicate("payment_attempt", attempt.reference.to_string()));
        }

        tables
            .payment_refs
            .insert(attempt.reference.as_str().to_string(), attempt.booking_id);
        tables.payments.insert(attempt.booking_id, attempt.clone());
        Ok(attempt.clone())
    }

    async fn find_by_booking(&self, booking_id: BookingId) -> Result<Option<PaymentAttempt>, StoreError> {
        Ok(self.read()?.payments.get(&booking_id).cloned())
    }

    async fn confirm(
        &self,
        reference: &PaymentRef,
        event: &serde_json::Value,
        at: DateTime<Utc>,
    ) -> Result<ConfirmOutcome, StoreError> {
        let mut tables = self.write()?;
        let tables = &mut *tables;

        let booking_id = *tables
            .payment_refs
            .get(reference.as_str())
            .ok_or_else(|| StoreError::not_found("payment_attempt", reference.to_string()))?;

        let booking = tables.bookings.get_mut(&booking_id).ok_or_else(|| {
            StoreError::Database(format!("payment {} references missing booking {}", reference, booking_id))
        })?;
        let attempt = tables
            .payments
            .get_mut(&booking_id)
            .ok_or_else(|| StoreError::not_found("payment_attempt", reference.to_string()))?;

        match attempt.confirm(event.clone(), at) {
            PaymentTransition::AlreadyPaid => Ok(ConfirmOutcome::AlreadyPaid(attempt.clone())),
            PaymentTransition::Confirmed => {
                booking.status = BookingStatus::Paid;
                Ok(ConfirmOutcome::Confirmed(attempt.clone()))
            },
        }
    }
}

// =============================================================================
// Idempotency Repository Implementation
// =============================================================================

#[async_trait]
impl IdempotencyRepository for MemoryStore {
    async fn find(&self, key: &str) -> Result<Option<IdempotencyRecord>, StoreError> {
        Ok(self.read()?.idempotency.get(key).cloned())
    }

    async fn insert(&self, record: &IdempotencyRecord) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        if tables.idempotency.contains_key(&record.key) {
            return Err(StoreError::duplicate("idempotency_record", record.key.clone()));
        }
        tables.idempotency.insert(record.key.clone(), record.clone());
        Ok(())
    }
}

// =============================================================================
// Store Implementation
// =============================================================================

impl Store for MemoryStore {
    fn vendors(&self) -> &dyn VendorRepository {
        self
    }

    fn bookings(&self) -> &dyn BookingRepository {
        self
    }

    fn payments(&self) -> &dyn PaymentRepository {
        self
    }

    fn idempotency(&self) -> &dyn IdempotencyRepository {
        self
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;
    use std::sync::Arc;
    use swiftslot_domain::{PaymentStatus, StoredResponse, VendorTimezone};

    fn lagos_vendor(id: VendorId) -> Vendor {
        Vendor::new(id, format!("Vendor {}", id), VendorTimezone::parse("Africa/Lagos").unwrap())
    }

    fn slot(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, hour, minute, 0).unwrap()
    }

    fn create_test_store() -> MemoryStore {
        MemoryStore::with_vendors([lagos_vendor(1), lagos_vendor(2)])
    }

    // Vendor Repository Tests
    #[tokio::test]
    async fn test_vendor_save_and_list() {
        let store = MemoryStore::new();
        VendorRepository::save(&store, &lagos_vendor(2)).await.unwrap();
        VendorRepository::save(&store, &lagos_vendor(1)).await.unwrap();

        let vendors = VendorRepository::list(&store).await.unwrap();
        assert_eq!(vendors.iter().map(|v| v.id).collect::<Vec<_>>(), vec![1, 2]);

        let found = VendorRepository::find_by_id(&store, 2).await.unwrap();
        assert_eq!(found.unwrap().name, "Vendor 2");
        assert!(VendorRepository::find_by_id(&store, 9).await.unwrap().is_none());
    }

    // Booking Repository Tests
    #[tokio::test]
    async fn test_insert_with_claim() {
        let store = create_test_store();
        let booking = Booking::new(1, 1, slot(8, 0));

        store.insert_with_claim(&booking).await.unwrap();

        assert_eq!(store.booking_count(), 1);
        assert_eq!(store.claim_count(), 1);
        let found = BookingRepository::find_by_id(&store, booking.id).await.unwrap();
        assert_eq!(found, Some(booking));
    }

    #[tokio::test]
    async fn test_duplicate_claim_leaves_no_partial_write() {
        let store = create_test_store();
        store.insert_with_claim(&Booking::new(1, 1, slot(8, 0))).await.unwrap();

        let loser = Booking::new(1, 2, slot(8, 0));
        let err = store.insert_with_claim(&loser).await.unwrap_err();

        assert!(err.is_duplicate());
        assert_eq!(store.booking_count(), 1);
        assert_eq!(store.claim_count(), 1);
        assert!(BookingRepository::find_by_id(&store, loser.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_same_instant_different_vendors() {
        let store = create_test_store();
        store.insert_with_claim(&Booking::new(1, 1, slot(8, 0))).await.unwrap();
        store.insert_with_claim(&Booking::new(2, 1, slot(8, 0))).await.unwrap();

        assert_eq!(store.claim_count(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_claims_single_winner() {
        let store = Arc::new(create_test_store());
        let mut handles = Vec::new();

        for buyer in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.insert_with_claim(&Booking::new(1, buyer, slot(10, 0))).await
            }));
        }

        let mut ok = 0;
        let mut dup = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => ok += 1,
                Err(e) if e.is_duplicate() => dup += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(ok, 1);
        assert_eq!(dup, 15);
        assert_eq!(store.booking_count(), 1);
    }

    #[tokio::test]
    async fn test_claimed_slots_range() {
        let store = create_test_store();
        store.insert_with_claim(&Booking::new(1, 1, slot(9, 0))).await.unwrap();
        store.insert_with_claim(&Booking::new(1, 1, slot(8, 0))).await.unwrap();
        store.insert_with_claim(&Booking::new(1, 1, slot(16, 0))).await.unwrap();
        store.insert_with_claim(&Booking::new(2, 1, slot(8, 30))).await.unwrap();

        let claimed = store.claimed_slots(1, slot(8, 0), slot(15, 30)).await.unwrap();
        assert_eq!(claimed, vec![slot(8, 0), slot(9, 0)]);

        let empty = store.claimed_slots(1, slot(15, 30), slot(8, 0)).await.unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let store = create_test_store();
        let mut older = Booking::new(1, 1, slot(8, 0));
        older.created_at = Utc::now() - Duration::minutes(5);
        let newer = Booking::new(1, 1, slot(8, 30));
        store.insert_with_claim(&older).await.unwrap();
        store.insert_with_claim(&newer).await.unwrap();

        let list = BookingRepository::list(&store).await.unwrap();
        assert_eq!(list[0].id, newer.id);
        assert_eq!(list[1].id, older.id);
    }

    // Payment Repository Tests
    #[tokio::test]
    async fn test_payment_insert_requires_booking() {
        let store = create_test_store();
        let err = store
            .insert_if_absent(&PaymentAttempt::new(uuid::Uuid::now_v7()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_payment_insert_is_one_per_booking() {
        let store = create_test_store();
        let booking = Booking::new(1, 1, slot(8, 0));
        store.insert_with_claim(&booking).await.unwrap();

        let first = store.insert_if_absent(&PaymentAttempt::new(booking.id)).await.unwrap();
        let second = store.insert_if_absent(&PaymentAttempt::new(booking.id)).await.unwrap();

        assert_eq!(first.reference, second.reference);
        assert_eq!(store.payment_count(), 1);
        assert_eq!(store.find_by_booking(booking.id).await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn test_confirm_updates_attempt_and_booking_together() {
        let store = create_test_store();
        let booking = Booking::new(1, 1, slot(8, 0));
        store.insert_with_claim(&booking).await.unwrap();
        let attempt = store.insert_if_absent(&PaymentAttempt::new(booking.id)).await.unwrap();

        let outcome = store
            .confirm(&attempt.reference, &json!({"event": "charge.success"}), Utc::now())
            .await
            .unwrap();
        assert!(matches!(outcome, ConfirmOutcome::Confirmed(ref a) if a.status == PaymentStatus::Paid));

        let stored_booking = BookingRepository::find_by_id(&store, booking.id).await.unwrap().unwrap();
        assert_eq!(stored_booking.status, BookingStatus::Paid);

        let again = store
            .confirm(&attempt.reference, &json!({"event": "duplicate"}), Utc::now())
            .await
            .unwrap();
        match again {
            ConfirmOutcome::AlreadyPaid(a) => {
                assert_eq!(a.raw_event, Some(json!({"event": "charge.success"})));
            },
            other => panic!("expected AlreadyPaid, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_confirm_unknown_ref() {
        let store = create_test_store();
        let err = store
            .confirm(&PaymentRef::generate(), &json!({}), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    // Idempotency Repository Tests
    #[tokio::test]
    async fn test_idempotency_insert_once() {
        let store = MemoryStore::new();
        let response = StoredResponse { status: 201, body: "{}".to_string() };
        let record = IdempotencyRecord::new("k1", "create-booking", &response).unwrap();

        store.insert(&record).await.unwrap();
        let err = store.insert(&record).await.unwrap_err();

        assert!(err.is_duplicate());
        assert_eq!(store.idempotency_count(), 1);
        assert_eq!(store.find("k1").await.unwrap(), Some(record));
        assert!(store.find("k2").await.unwrap().is_none());
    }

    // Store Tests
    #[tokio::test]
    async fn test_store_clear_keeps_vendors() {
        let store = create_test_store();
        let booking = Booking::new(1, 1, slot(8, 0));
        store.insert_with_claim(&booking).await.unwrap();
        store.insert_if_absent(&PaymentAttempt::new(booking.id)).await.unwrap();

        store.clear();

        assert_eq!(store.booking_count(), 0);
        assert_eq!(store.claim_count(), 0);
        assert_eq!(store.payment_count(), 0);
        assert_eq!(store.vendors().list().await.unwrap().len(), 2);
    }
}
