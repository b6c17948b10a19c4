//! PostgreSQL store implementation.
//!
//! Every mutating method opens its own transaction and commits before
//! returning. An early return or a dropped future drops the
//! `Transaction`, which rolls it back, so no partial booking, claim or
//! payment row is ever visible.
//!
//! This module uses dynamic queries (sqlx::query) instead of compile-time
//! checked macros (sqlx::query!) to allow compilation without DATABASE_URL.

use crate::error::StoreError;
use crate::repository::{
    BookingRepository, ConfirmOutcome, IdempotencyRepository, PaymentRepository, Store,
    VendorRepository,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use swiftslot_domain::{
    Booking, BookingId, BookingStatus, IdempotencyRecord, PaymentAttempt, PaymentRef,
    PaymentStatus, PaymentTransition, Vendor, VendorId, VendorTimezone,
};
use tracing::debug;

const BOOKING_COLUMNS: &str =
    "id, vendor_id, buyer_id, start_time_utc, end_time_utc, status, created_at";
const PAYMENT_COLUMNS: &str = "id, booking_id, reference, status, raw_event, created_at, paid_at";

/// PostgreSQL-backed store
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `database_url`
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Get a reference to the underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// =============================================================================
// Row mapping
// =============================================================================

fn vendor_from_row(row: &PgRow) -> Result<Vendor, StoreError> {
    let timezone: String = row.try_get("timezone")?;
    let timezone = VendorTimezone::parse(&timezone)
        .map_err(|e| StoreError::Deserialization(format!("vendor timezone: {}", e)))?;
    Ok(Vendor {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        timezone,
    })
}

fn booking_from_row(row: &PgRow) -> Result<Booking, StoreError> {
    let status: String = row.try_get("status")?;
    let status = status
        .parse::<BookingStatus>()
        .map_err(|e| StoreError::Deserialization(format!("booking status: {}", e)))?;
    Ok(Booking {
        id: row.try_get("id")?,
        vendor_id: row.try_get("vendor_id")?,
        buyer_id: row.try_get("buyer_id")?,
        start_time_utc: row.try_get("start_time_utc")?,
        end_time_utc: row.try_get("end_time_utc")?,
        status,
        created_at: row.try_get("created_at")?,
    })
}

fn payment_from_row(row: &PgRow) -> Result<PaymentAttempt, StoreError> {
    let status: String = row.try_get("status")?;
    let status = status
        .parse::<PaymentStatus>()
        .map_err(|e| StoreError::Deserialization(format!("payment status: {}", e)))?;
    let reference: String = row.try_get("reference")?;
    Ok(PaymentAttempt {
        id: row.try_get("id")?,
        booking_id: row.try_get("booking_id")?,
        reference: PaymentRef::new(reference)?,
        status,
        raw_event: row.try_get("raw_event")?,
        created_at: row.try_get("created_at")?,
        paid_at: row.try_get("paid_at")?,
    })
}

fn idempotency_from_row(row: &PgRow) -> Result<IdempotencyRecord, StoreError> {
    Ok(IdempotencyRecord {
        key: row.try_get("key")?,
        scope: row.try_get("scope")?,
        response_payload: row.try_get("response_payload")?,
        created_at: row.try_get("created_at")?,
    })
}

// =============================================================================
// Vendor Repository Implementation
// =============================================================================

#[async_trait]
impl VendorRepository for PgStore {
    async fn save(&self, vendor: &Vendor) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO vendors (id, name, timezone)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(vendor.id)
        .bind(&vendor.name)
        .bind(vendor.timezone.name())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: VendorId) -> Result<Option<Vendor>, StoreError> {
        let row = sqlx::query("SELECT id, name, timezone FROM vendors WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(vendor_from_row).transpose()
    }

    async fn list(&self) -> Result<Vec<Vendor>, StoreError> {
        let rows = sqlx::query("SELECT id, name, timezone FROM vendors ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(vendor_from_row).collect()
    }
}

// =============================================================================
// Booking Repository Implementation
// =============================================================================

#[async_trait]
impl BookingRepository for PgStore {
    async fn insert_with_claim(&self, booking: &Booking) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO bookings (
                id, vendor_id, buyer_id, start_time_utc, end_time_utc, status, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(booking.id)
        .bind(booking.vendor_id)
        .bind(booking.buyer_id)
        .bind(booking.start_time_utc)
        .bind(booking.end_time_utc)
        .bind(booking.status.as_str())
        .bind(booking.created_at)
        .execute(&mut *tx)
        .await?;

        let claim = booking.claim();
        let claimed = sqlx::query(
            "INSERT INTO slot_claims (vendor_id, slot_start_utc, booking_id) VALUES ($1, $2, $3)",
        )
        .bind(claim.vendor_id)
        .bind(claim.slot_start_utc)
        .bind(claim.booking_id)
        .execute(&mut *tx)
        .await;

        if let Err(e) = claimed {
            // tx is dropped here and rolls back the booking row
            return Err(match StoreError::from(e) {
                StoreError::Duplicate { .. } => StoreError::duplicate(
                    "slot_claim",
                    format!("{}@{}", claim.vendor_id, claim.slot_start_utc.to_rfc3339()),
                ),
                other => other,
            });
        }

        tx.commit().await?;

        debug!(
            booking_id = %booking.id,
            vendor_id = booking.vendor_id,
            slot_start = %booking.start_time_utc,
            "Booking and slot claim committed"
        );
        Ok(())
    }

    async fn find_by_id(&self, id: BookingId) -> Result<Option<Booking>, StoreError> {
        let row = sqlx::query(&format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(booking_from_row).transpose()
    }

    async fn list(&self) -> Result<Vec<Booking>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM bookings ORDER BY created_at DESC, id DESC",
            BOOKING_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(booking_from_row).collect()
    }

    async fn claimed_slots(
        &self,
        vendor_id: VendorId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, StoreError> {
        let slots = sqlx::query_scalar(
            r#"
            SELECT slot_start_utc FROM slot_claims
            WHERE vendor_id = $1 AND slot_start_utc BETWEEN $2 AND $3
            ORDER BY slot_start_utc ASC
            "#,
        )
        .bind(vendor_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(slots)
    }
}

// =============================================================================
// Payment Repository Implementation
// =============================================================================

#[async_trait]
impl PaymentRepository for PgStore {
    async fn insert_if_absent(&self, attempt: &PaymentAttempt) -> Result<PaymentAttempt, StoreError> {
        let mut tx = self.pool.begin().await?;

        let booking: Option<BookingId> =
            sqlx::query_scalar("SELECT id FROM bookings WHERE id = $1 FOR SHARE")
                .bind(attempt.booking_id)
                .fetch_optional(&mut *tx)
                .await?;
        if booking.is_none() {
            return Err(StoreError::not_found("booking", attempt.booking_id.to_string()));
        }

        sqlx::query(
            r#"
            INSERT INTO payment_attempts (id, booking_id, reference, status, raw_event, created_at, paid_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (booking_id) DO NOTHING
            "#,
        )
        .bind(attempt.id)
        .bind(attempt.booking_id)
        .bind(attempt.reference.as_str())
        .bind(attempt.status.as_str())
        .bind(&attempt.raw_event)
        .bind(attempt.created_at)
        .bind(attempt.paid_at)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM payment_attempts WHERE booking_id = $1",
            PAYMENT_COLUMNS
        ))
        .bind(attempt.booking_id)
        .fetch_one(&mut *tx)
        .await?;
        let stored = payment_from_row(&row)?;

        tx.commit().await?;
        Ok(stored)
    }

    async fn find_by_booking(&self, booking_id: BookingId) -> Result<Option<PaymentAttempt>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM payment_attempts WHERE booking_id = $1",
            PAYMENT_COLUMNS
        ))
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(payment_from_row).transpose()
    }

    async fn confirm(
        &self,
        reference: &PaymentRef,
        event: &serde_json::Value,
        at: DateTime<Utc>,
    ) -> Result<ConfirmOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Row lock serializes concurrent confirmations of the same ref
        let row = sqlx::query(&format!(
            "SELECT {} FROM payment_attempts WHERE reference = $1 FOR UPDATE",
            PAYMENT_COLUMNS
        ))
        .bind(reference.as_str())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::not_found("payment_attempt", reference.to_string()))?;
        let mut attempt = payment_from_row(&row)?;

        if attempt.confirm(event.clone(), at) == PaymentTransition::AlreadyPaid {
            tx.rollback().await?;
            return Ok(ConfirmOutcome::AlreadyPaid(attempt));
        }

        sqlx::query(
            "UPDATE payment_attempts SET status = $2, raw_event = $3, paid_at = $4 WHERE id = $1",
        )
        .bind(attempt.id)
        .bind(attempt.status.as_str())
        .bind(&attempt.raw_event)
        .bind(attempt.paid_at)
        .execute(&mut *tx)
        .await?;

        let updated = sqlx::query("UPDATE bookings SET status = $2 WHERE id = $1")
            .bind(attempt.booking_id)
            .bind(BookingStatus::Paid.as_str())
            .execute(&mut *tx)
            .await?;
        if updated.rows_affected() != 1 {
            return Err(StoreError::Database(format!(
                "payment {} references missing booking {}",
                reference, attempt.booking_id
            )));
        }

        tx.commit().await?;
        Ok(ConfirmOutcome::Confirmed(attempt))
    }
}

// =============================================================================
// Idempotency Repository Implementation
// =============================================================================

#[async_trait]
impl IdempotencyRepository for PgStore {
    async fn find(&self, key: &str) -> Result<Option<IdempotencyRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT key, scope, response_payload, created_at FROM idempotency_records WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(idempotency_from_row).transpose()
    }

    async fn insert(&self, record: &IdempotencyRecord) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO idempotency_records (key, scope, response_payload, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&record.key)
        .bind(&record.scope)
        .bind(&record.response_payload)
        .bind(record.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => Err(match StoreError::from(e) {
                StoreError::Duplicate { .. } => {
                    StoreError::duplicate("idempotency_record", record.key.clone())
                },
                other => other,
            }),
        }
    }
}

// =============================================================================
// Store Implementation
// =============================================================================

impl Store for PgStore {
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

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::Arc;

    async fn seeded(pool: PgPool) -> PgStore {
        let store = PgStore::new(pool);
        let lagos = VendorTimezone::parse("Africa/Lagos").unwrap();
        store.vendors().save(&Vendor::new(1, "Vendor A", lagos)).await.unwrap();
        store
    }

    fn slot(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, hour, minute, 0).unwrap()
    }

    /// Run with: `cargo test -p swiftslot-store --features postgres`
    #[sqlx::test(migrations = "../migrations")]
    async fn test_duplicate_claim_rolls_back_booking(pool: PgPool) {
        let store = seeded(pool).await;

        store.insert_with_claim(&Booking::new(1, 1, slot(8, 0))).await.unwrap();
        let loser = Booking::new(1, 2, slot(8, 0));
        let err = store.insert_with_claim(&loser).await.unwrap_err();

        assert!(err.is_duplicate());
        assert!(BookingRepository::find_by_id(&store, loser.id).await.unwrap().is_none());
        assert_eq!(BookingRepository::list(&store).await.unwrap().len(), 1);
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn test_concurrent_claims_single_winner(pool: PgPool) {
        let store = Arc::new(seeded(pool).await);
        let mut handles = Vec::new();
        for buyer in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.insert_with_claim(&Booking::new(1, buyer, slot(9, 0))).await
            }));
        }

        let mut ok = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => ok += 1,
                Err(e) => assert!(e.is_duplicate(), "unexpected error: {}", e),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(store.claimed_slots(1, slot(8, 0), slot(15, 30)).await.unwrap(), vec![slot(9, 0)]);
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn test_payment_confirm_is_atomic_and_idempotent(pool: PgPool) {
        let store = seeded(pool).await;
        let booking = Booking::new(1, 1, slot(8, 0));
        store.insert_with_claim(&booking).await.unwrap();

        let attempt = store.insert_if_absent(&PaymentAttempt::new(booking.id)).await.unwrap();
        let again = store.insert_if_absent(&PaymentAttempt::new(booking.id)).await.unwrap();
        assert_eq!(attempt.reference, again.reference);

        let first = store
            .confirm(&attempt.reference, &json!({"n": 1}), Utc::now())
            .await
            .unwrap();
        assert!(matches!(first, ConfirmOutcome::Confirmed(_)));

        let second = store
            .confirm(&attempt.reference, &json!({"n": 2}), Utc::now())
            .await
            .unwrap();
        match second {
            ConfirmOutcome::AlreadyPaid(a) => assert_eq!(a.raw_event, Some(json!({"n": 1}))),
            other => panic!("expected AlreadyPaid, got {:?}", other),
        }

        let stored = BookingRepository::find_by_id(&store, booking.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Paid);
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn test_idempotency_key_is_unique(pool: PgPool) {
        let store = PgStore::new(pool);
        let response = swiftslot_domain::StoredResponse { status: 201, body: "{}".to_string() };
        let record = IdempotencyRecord::new("k1", "create-booking", &response).unwrap();

        store.insert(&record).await.unwrap();
        assert!(store.insert(&record).await.unwrap_err().is_duplicate());
        assert_eq!(store.find("k1").await.unwrap().unwrap().response_payload, record.response_payload);
    }
}
