//! SwiftSlot Daemon
//!
//! HTTP server for slot reservation and payment confirmation.
//!
//! # Usage
//!
//! ```bash
//! # Start with default configuration (in-memory store)
//! cargo run -p swiftslotd
//!
//! # Start against Postgres
//! DATABASE_URL=postgres://localhost/swiftslot cargo run -p swiftslotd --features postgres
//!
//! # Database maintenance
//! cargo run -p swiftslotd --features postgres -- db migrate
//! ```
//!
//! # Environment Variables
//!
//! - `SWIFTSLOT_ENV`: Environment (test, development, production)
//! - `SWIFTSLOT_API_HOST`: API host (default: 0.0.0.0)
//! - `SWIFTSLOT_API_PORT`: API port (default: 3001)
//! - `SWIFTSLOT_REQUEST_TIMEOUT_SECS`: Per-request timeout (default: 10)
//! - `SWIFTSLOT_REQUIRE_SLOT_ALIGNMENT`: Reject off-calendar starts (default: true)
//! - `SWIFTSLOT_MIN_LEAD_TIME_MINUTES`: Minimum booking notice (default: unset)
//! - `SWIFTSLOT_DEFAULT_BUYER_ID`: Buyer recorded on bookings (default: 1)
//! - `SWIFTSLOT_DB_MAX_CONNECTIONS`: Postgres pool size (default: 10)
//! - `DATABASE_URL`: Postgres URL; in-memory store when unset

use swiftslotd::{Config, Daemon};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("swiftslotd=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(String::as_str) == Some("db") {
        #[cfg(feature = "postgres")]
        return swiftslotd::db::run_db_command(&args).await;

        #[cfg(not(feature = "postgres"))]
        anyhow::bail!("db commands require the `postgres` feature");
    }

    // Load configuration
    let config = Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        api_host = %config.api.host,
        api_port = config.api.port,
        "SwiftSlot Daemon"
    );

    #[cfg(feature = "postgres")]
    if config.database.url.is_some() {
        Daemon::connect_postgres(config).await?.run().await?;
        return Ok(());
    }

    #[cfg(not(feature = "postgres"))]
    if config.database.url.is_some() {
        tracing::warn!("DATABASE_URL is set but the `postgres` feature is disabled, using in-memory store");
    }

    Daemon::new_memory(config)?.run().await?;

    Ok(())
}
