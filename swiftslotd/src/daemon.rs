//! Daemon: server lifecycle.
//!
//! # Lifecycle
//!
//! 1. Load configuration
//! 2. Open the store (in-memory with demo vendors, or Postgres)
//! 3. Start API server
//! 4. Wait for SIGINT
//! 5. Graceful shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use swiftslot_store::{MemoryStore, Store};

use crate::api::{create_router, ApiState};
use crate::config::Config;
use crate::error::{DaemonError, DaemonResult};

// =============================================================================
// Daemon
// =============================================================================

/// The SwiftSlot daemon.
pub struct Daemon<S: Store + 'static> {
    /// Configuration
    config: Config,
    /// Store
    store: Arc<S>,
}

impl Daemon<MemoryStore> {
    /// Create a daemon over an in-memory store seeded with the demo vendors.
    pub fn new_memory(config: Config) -> DaemonResult<Self> {
        let store = MemoryStore::with_vendors(swiftslot_db::demo_vendors()?);
        Ok(Self::new(config, Arc::new(store)))
    }
}

#[cfg(feature = "postgres")]
impl Daemon<swiftslot_store::PgStore> {
    /// Connect to `DATABASE_URL` and apply pending migrations.
    pub async fn connect_postgres(config: Config) -> DaemonResult<Self> {
        let url = config
            .database
            .url
            .clone()
            .ok_or_else(|| DaemonError::Config("DATABASE_URL is not set".to_string()))?;

        let store = swiftslot_store::PgStore::connect(&url, config.database.max_connections).await?;
        swiftslot_db::migrate(store.pool())
            .await
            .map_err(|e| DaemonError::Database(e.to_string()))?;

        info!(max_connections = config.database.max_connections, "Connected to Postgres");
        Ok(Self::new(config, Arc::new(store)))
    }
}

impl<S: Store + 'static> Daemon<S> {
    /// Create a new daemon over `store`.
    pub fn new(config: Config, store: Arc<S>) -> Self {
        Self { config, store }
    }

    /// Run the daemon.
    ///
    /// This method blocks until shutdown is requested (SIGINT).
    pub async fn run(self) -> DaemonResult<()> {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            environment = %self.config.environment,
            "Starting SwiftSlot daemon"
        );

        let api_addr = self.start_api_server().await?;
        info!(%api_addr, "API server started");

        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
        }
        info!("Received shutdown signal");

        self.shutdown().await
    }

    /// Start the API server.
    async fn start_api_server(&self) -> DaemonResult<SocketAddr> {
        let state = Arc::new(ApiState::new(self.store.clone(), &self.config));
        let router = create_router(state);

        let addr = format!("{}:{}", self.config.api.host, self.config.api.port);
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            DaemonError::Config(format!("Failed to bind to {}: {}", addr, e))
        })?;

        let local_addr = listener.local_addr().map_err(|e| {
            DaemonError::Config(format!("Failed to get local address: {}", e))
        })?;

        // Spawn the server task
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                error!(error = %e, "API server error");
            }
        });

        Ok(local_addr)
    }

    /// Graceful shutdown.
    async fn shutdown(&self) -> DaemonResult<()> {
        info!("Initiating graceful shutdown");

        let bookings = self.store.bookings().list().await?;
        let paid = bookings.iter().filter(|b| b.is_paid()).count();
        info!(bookings = bookings.len(), paid, "Shutdown complete");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_daemon_memory_has_demo_vendors() {
        let daemon = Daemon::new_memory(Config::test()).unwrap();

        let vendors = daemon.store.vendors().list().await.unwrap();
        assert_eq!(vendors.len(), 3);
        assert_eq!(vendors[0].name, "Vendor A");
    }

    #[tokio::test]
    async fn test_daemon_api_server_start() {
        let daemon = Daemon::new_memory(Config::test()).unwrap();
        let addr = daemon.start_api_server().await.unwrap();

        // Server should be running on a port
        assert!(addr.port() > 0);

        let client = reqwest::Client::new();
        let response = client.get(format!("http://{}/health", addr)).send().await.unwrap();
        assert!(response.status().is_success());

        let vendors: serde_json::Value = client
            .get(format!("http://{}/vendors", addr))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(vendors.as_array().map(Vec::len), Some(3));
    }

    #[tokio::test]
    async fn test_daemon_shutdown_empty() {
        let daemon = Daemon::new_memory(Config::test()).unwrap();
        daemon.shutdown().await.unwrap();
    }
}
