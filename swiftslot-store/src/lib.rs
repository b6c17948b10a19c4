//! SwiftSlot Storage Layer
//!
//! Provides persistence for vendors, bookings with their slot claims,
//! payment attempts and idempotency records.
//!
//! # Architecture
//!
//! - **Repository traits**: Define the storage interface (ports)
//! - **In-memory store**: Fast implementation for testing and local runs
//! - **PostgreSQL store**: Production implementation (feature `postgres`)
//!
//! Every mutating repository method is one atomic unit: it either commits
//! completely or leaves no trace. Slot exclusivity comes from the storage
//! uniqueness constraint on (vendor, slot start), never from a prior read.
//!
//! # Usage
//!
//! ```rust
//! use swiftslot_store::{MemoryStore, Store};
//! use swiftslot_domain::{Booking, Vendor, VendorTimezone};
//! use chrono::{TimeZone, Utc};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = MemoryStore::new();
//!     let tz = VendorTimezone::parse("Africa/Lagos").unwrap();
//!     store.vendors().save(&Vendor::new(1, "Vendor A", tz)).await.unwrap();
//!
//!     let start = Utc.with_ymd_and_hms(2024, 6, 10, 8, 0, 0).unwrap();
//!     let booking = Booking::new(1, 1, start);
//!     store.bookings().insert_with_claim(&booking).await.unwrap();
//!
//!     // Same slot again violates the claim uniqueness
//!     let again = Booking::new(1, 2, start);
//!     assert!(store.bookings().insert_with_claim(&again).await.is_err());
//! }
//! ```

#![warn(clippy::all)]

// Modules
mod error;
mod memory;
#[cfg(feature = "postgres")]
mod postgres;
mod repository;

// Re-exports
pub use error::StoreError;
pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PgStore;
pub use repository::{
    BookingRepository, ConfirmOutcome, IdempotencyRepository, PaymentRepository, Store,
    VendorRepository,
};
