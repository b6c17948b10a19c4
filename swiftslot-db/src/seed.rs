//! Demo vendor seeding.

use sqlx::PgPool;
use swiftslot_domain::{DomainError, Vendor, VendorTimezone};
use tracing::info;

use super::Result;

const DEMO_TIMEZONE: &str = "Africa/Lagos";
const DEMO_NAMES: [&str; 3] = ["Vendor A", "Vendor B", "Vendor C"];

/// The three demo vendors, ids 1..=3.
pub fn demo_vendors() -> std::result::Result<Vec<Vendor>, DomainError> {
    let timezone = VendorTimezone::parse(DEMO_TIMEZONE)?;
    Ok(DEMO_NAMES
        .iter()
        .zip(1..)
        .map(|(name, id)| Vendor::new(id, *name, timezone))
        .collect())
}

/// Insert the demo vendors if they don't exist.
///
/// Uses INSERT ... ON CONFLICT DO NOTHING for idempotency, then moves the
/// id sequence past the seeded ids. Returns the number of rows inserted.
pub async fn seed_vendors(pool: &PgPool) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let mut inserted = 0;

    for vendor in demo_vendors()? {
        let result = sqlx::query(
            r#"
            INSERT INTO vendors (id, name, timezone)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(vendor.id)
        .bind(&vendor.name)
        .bind(vendor.timezone.name())
        .execute(&mut *tx)
        .await?;
        inserted += result.rows_affected();
    }

    sqlx::query("SELECT setval('vendors_id_seq', (SELECT MAX(id) FROM vendors))")
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    info!(inserted, "Demo vendors seeded");
    Ok(inserted)
}
