//! Database CLI subcommands for swiftslotd.
//!
//! Provides `db migrate`, `db status`, and `db seed` commands.

use anyhow::{anyhow, Result};
use std::env;
use tracing::info;

use swiftslot_db::{migrate, seed_vendors, status};

/// Run database CLI subcommands.
///
/// Supported commands:
/// - `swiftslotd db migrate` - Run pending migrations
/// - `swiftslotd db status` - Check migration status and row counts
/// - `swiftslotd db seed` - Insert the demo vendors
pub async fn run_db_command(args: &[String]) -> Result<()> {
    let command = args
        .get(2)
        .ok_or_else(|| anyhow!("Usage: swiftslotd db <migrate|status|seed>"))?;

    let _ = dotenvy::dotenv();
    let database_url = env::var("DATABASE_URL")
        .map_err(|_| anyhow!("DATABASE_URL environment variable is required for db commands"))?;

    let pool = sqlx::PgPool::connect(&database_url).await?;

    match command.as_str() {
        "migrate" => migrate(&pool).await?,
        "status" => status(&pool).await?,
        "seed" => {
            let inserted = seed_vendors(&pool).await?;
            info!(inserted, "Seed complete");
        },
        other => {
            return Err(anyhow!("Unknown db command: {}. Use migrate, status, or seed", other));
        },
    }

    Ok(())
}
