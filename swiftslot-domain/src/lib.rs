//! SwiftSlot Domain Layer
//!
//! Pure domain logic with zero I/O dependencies.
//! Contains entities, value objects, the slot calendar and the payment
//! state machine transitions.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod calendar;
pub mod entities;
pub mod value_objects;

// Re-export commonly used types
pub use calendar::{daily_slots, SlotCalendar};
pub use entities::{
    slot_duration, Booking, BookingId, BookingStatus, BuyerId, IdempotencyRecord, PaymentAttempt,
    PaymentAttemptId, PaymentStatus, PaymentTransition, SlotClaim, StoredResponse, Vendor,
    VendorId, SLOT_DURATION_MINUTES,
};
pub use value_objects::{DomainError, IdempotencyKey, PaymentRef, VendorTimezone};
