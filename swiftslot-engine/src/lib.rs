//! SwiftSlot Engine
//!
//! Booking use cases on top of an injected [`Store`](swiftslot_store::Store).
//!
//! # Architecture
//!
//! ```text
//! Request → IdempotencyGuard → ReservationEngine → Store (atomic claim)
//! Webhook → PaymentMachine → Store (attempt + booking paid)
//! ```
//!
//! # Components
//!
//! - **ReservationEngine**: validates a reservation and claims the slot
//! - **IdempotencyGuard**: runs a handler at most once per caller key and
//!   replays its response on retries
//! - **PaymentMachine**: checkout initialization and payment confirmation
//!
//! # Example
//!
//! ```rust,ignore
//! use swiftslot_engine::{ReservationEngine, ReservationPolicy, ReservationRequest};
//! use swiftslot_domain::SlotCalendar;
//! use swiftslot_store::MemoryStore;
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! let engine = ReservationEngine::new(store, SlotCalendar::default(), ReservationPolicy::default());
//! let booking = engine.reserve(&request, buyer_id).await?;
//! ```

#![warn(clippy::all)]

pub mod error;
pub mod idempotency;
pub mod payment;
pub mod reservation;

// Re-exports for convenience
pub use error::{EngineError, EngineResult};
pub use idempotency::{IdempotencyGuard, CREATE_BOOKING_SCOPE};
pub use payment::PaymentMachine;
pub use reservation::{parse_start_time, ReservationEngine, ReservationPolicy, ReservationRequest};
pub use swiftslot_store::ConfirmOutcome;
