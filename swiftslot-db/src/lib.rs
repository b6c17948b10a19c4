//! Database lifecycle management for SwiftSlot.
//!
//! Provides migration running, status checking, and demo vendor seeding.

mod seed;

pub use seed::{demo_vendors, seed_vendors};

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::{info, warn};

/// Result type for DB operations.
pub type Result<T> = std::result::Result<T, anyhow::Error>;

/// Run all pending migrations.
///
/// Uses sqlx migrations from the workspace `migrations` directory.
/// Idempotent: safe to run multiple times.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    info!("Running database migrations...");

    sqlx::migrate!("../migrations").run(pool).await?;

    info!("Migrations completed successfully");
    Ok(())
}

/// Check database connectivity, migration status and row counts.
pub async fn status(pool: &PgPool) -> Result<()> {
    let result: i32 = sqlx::query_scalar("SELECT 1").fetch_one(pool).await?;
    if result != 1 {
        return Err(anyhow::anyhow!("Database connectivity check failed"));
    }
    info!("Database connectivity: OK");

    // Runtime query; the migrations table may not exist yet
    let rows = sqlx::query(
        r#"
        SELECT version, description, installed_on, success
        FROM _sqlx_migrations
        ORDER BY version DESC
        LIMIT 10
        "#,
    )
    .fetch_all(pool)
    .await;

    match rows {
        Ok(migs) if !migs.is_empty() => {
            info!("Latest migrations:");
            for mig in migs {
                let version: i64 = mig.try_get("version")?;
                let description: String = mig.try_get("description")?;
                let installed_on: Option<DateTime<Utc>> = mig.try_get("installed_on")?;
                let success: bool = mig.try_get("success")?;

                info!(
                    "  {} v{}: {} ({})",
                    if success { "✓" } else { "✗" },
                    version,
                    description,
                    installed_on.map(|t| t.to_rfc3339()).unwrap_or_else(|| "N/A".to_string())
                );
            }
        },
        Ok(_) => {
            warn!("No migrations found in database (run `swiftslotd db migrate` first)");
            return Ok(());
        },
        Err(e) => {
            if e.to_string().contains("_sqlx_migrations") {
                warn!("Migration table not found (run `swiftslotd db migrate` first)");
                return Ok(());
            }
            return Err(e.into());
        },
    }

    for table in ["vendors", "bookings", "payment_attempts", "idempotency_records"] {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(pool)
            .await?;
        info!(table, rows = count, "Table status");
    }

    Ok(())
}
