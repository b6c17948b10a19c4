//! SwiftSlot Daemon Library
//!
//! HTTP service for vendor slot booking.
//!
//! # Architecture
//!
//! ```text
//! Client → API (axum) → IdempotencyGuard → ReservationEngine → Store
//! Provider webhook → API → PaymentMachine → Store
//! ```
//!
//! # Components
//!
//! - **Daemon**: Server lifecycle and store selection
//! - **API**: HTTP endpoints
//! - **Config**: Environment-based configuration
//!
//! # Example
//!
//! ```rust,ignore
//! use swiftslotd::{Config, Daemon};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("Failed to load config");
//!     let daemon = Daemon::new_memory(config).expect("Failed to build daemon");
//!     daemon.run().await.expect("Daemon error");
//! }
//! ```

#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod daemon;
pub mod error;

#[cfg(feature = "postgres")]
pub mod db;

// Re-exports for convenience
pub use api::{create_router, ApiState, ErrorResponse};
pub use config::{ApiConfig, BookingConfig, Config, DatabaseConfig, Environment};
pub use daemon::Daemon;
pub use error::{DaemonError, DaemonResult};
