//! Reservation Engine: validates a reservation request and claims the slot.
//!
//! Whether a slot is free is decided only by the store's uniqueness
//! guarantee on (vendor, slot start). The engine never reads availability
//! before writing.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use swiftslot_domain::{Booking, BookingId, BuyerId, SlotCalendar, Vendor, VendorId, VendorTimezone};
use swiftslot_store::Store;

use crate::error::{EngineError, EngineResult};

/// Naive local formats accepted for `start_time_local`
const LOCAL_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"];

/// Reservation input as received from a client. Presence is checked by
/// [`ReservationEngine::reserve`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReservationRequest {
    /// Vendor to book
    pub vendor_id: Option<VendorId>,
    /// Slot start, RFC 3339 or naive local time in the vendor's timezone
    pub start_time_local: Option<String>,
}

/// Slot admission rules applied before claiming.
#[derive(Debug, Clone)]
pub struct ReservationPolicy {
    /// Reject start instants that are not calendar slot starts
    pub require_alignment: bool,
    /// Reject start instants earlier than now + lead time
    pub min_lead_time: Option<Duration>,
}

impl Default for ReservationPolicy {
    fn default() -> Self {
        Self { require_alignment: true, min_lead_time: None }
    }
}

/// Creates bookings and answers booking/vendor queries.
pub struct ReservationEngine<S: Store> {
    store: Arc<S>,
    calendar: SlotCalendar,
    policy: ReservationPolicy,
}

impl<S: Store> ReservationEngine<S> {
    /// Create a new reservation engine.
    pub fn new(store: Arc<S>, calendar: SlotCalendar, policy: ReservationPolicy) -> Self {
        Self { store, calendar, policy }
    }

    /// Reserve a slot for `buyer_id`.
    ///
    /// # Errors
    /// - `Validation` for missing fields, unparseable start, or a policy violation
    /// - `NotFound` if the vendor does not exist
    /// - `Conflict` (`slot_conflict`) if the slot is already claimed
    pub async fn reserve(&self, request: &ReservationRequest, buyer_id: BuyerId) -> EngineResult<Booking> {
        let start_raw = request.start_time_local.as_deref().map(str::trim).unwrap_or_default();
        let vendor_id = match request.vendor_id {
            Some(id) if !start_raw.is_empty() => id,
            _ => return Err(EngineError::validation("missing_fields", "Missing required fields")),
        };

        let vendor = self.get_vendor(vendor_id).await?;
        let start = parse_start_time(start_raw, &vendor.timezone)?;
        self.admit(&vendor, start, Utc::now())?;

        let booking = Booking::new(vendor.id, buyer_id, start);
        match self.store.bookings().insert_with_claim(&booking).await {
            Ok(()) => {
                info!(
                    booking_id = %booking.id,
                    vendor_id = vendor.id,
                    buyer_id,
                    slot_start = %booking.start_time_utc,
                    "Slot reserved"
                );
                Ok(booking)
            },
            Err(e) if e.is_duplicate() => {
                warn!(vendor_id = vendor.id, slot_start = %start, "Slot already claimed");
                Err(EngineError::conflict("slot_conflict", "Slot already booked"))
            },
            Err(e) => Err(e.into()),
        }
    }

    fn admit(&self, vendor: &Vendor, start: DateTime<Utc>, now: DateTime<Utc>) -> EngineResult<()> {
        if self.policy.require_alignment && !self.calendar.is_slot_boundary(&vendor.timezone, start) {
            return Err(EngineError::validation(
                "slot_not_aligned",
                format!(
                    "{} is not a bookable slot start for vendor {}",
                    start.to_rfc3339(),
                    vendor.id
                ),
            ));
        }

        if let Some(lead) = self.policy.min_lead_time {
            // An earliest start past the representable range admits nothing.
            let too_soon = now.checked_add_signed(lead).map_or(true, |earliest| start < earliest);
            if too_soon {
                return Err(EngineError::validation(
                    "slot_too_soon",
                    format!("Slot must start at least {} minutes from now", lead.num_minutes()),
                ));
            }
        }

        Ok(())
    }

    /// Slot starts of `date` that are not claimed, ascending.
    pub async fn availability(&self, vendor_id: VendorId, date: NaiveDate) -> EngineResult<Vec<DateTime<Utc>>> {
        let vendor = self.get_vendor(vendor_id).await?;
        let slots = self.calendar.slots(&vendor.timezone, date);

        let (Some(first), Some(last)) = (slots.first().copied(), slots.last().copied()) else {
            return Ok(slots);
        };

        let claimed: HashSet<DateTime<Utc>> = self
            .store
            .bookings()
            .claimed_slots(vendor.id, first, last)
            .await?
            .into_iter()
            .collect();

        debug!(vendor_id, %date, total = slots.len(), claimed = claimed.len(), "Availability computed");
        Ok(slots.into_iter().filter(|slot| !claimed.contains(slot)).collect())
    }

    /// Find a vendor
    pub async fn get_vendor(&self, vendor_id: VendorId) -> EngineResult<Vendor> {
        self.store
            .vendors()
            .find_by_id(vendor_id)
            .await?
            .ok_or_else(|| EngineError::not_found("vendor_not_found", "Vendor not found"))
    }

    /// All vendors
    pub async fn list_vendors(&self) -> EngineResult<Vec<Vendor>> {
        Ok(self.store.vendors().list().await?)
    }

    /// Find a booking
    pub async fn get_booking(&self, booking_id: BookingId) -> EngineResult<Booking> {
        self.store
            .bookings()
            .find_by_id(booking_id)
            .await?
            .ok_or_else(|| EngineError::not_found("booking_not_found", "Booking not found"))
    }

    /// All bookings, newest first
    pub async fn list_bookings(&self) -> EngineResult<Vec<Booking>> {
        Ok(self.store.bookings().list().await?)
    }
}

/// Parse a client supplied start time.
///
/// RFC 3339 input carries its own offset. Naive input is read as wall-clock
/// time in `timezone` and must map to exactly one instant there.
pub fn parse_start_time(raw: &str, timezone: &VendorTimezone) -> EngineResult<DateTime<Utc>> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Ok(instant.with_timezone(&Utc));
    }

    let naive = LOCAL_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .ok_or_else(|| {
            EngineError::validation("invalid_start_time", format!("Invalid start time: {}", raw))
        })?;

    match timezone.tz().from_local_datetime(&naive) {
        LocalResult::Single(local) => Ok(local.with_timezone(&Utc)),
        LocalResult::Ambiguous(..) => Err(EngineError::validation(
            "invalid_start_time",
            format!("{} is ambiguous in {}", raw, timezone),
        )),
        LocalResult::None => Err(EngineError::validation(
            "invalid_start_time",
            format!("{} does not exist in {}", raw, timezone),
        )),
    }
}
