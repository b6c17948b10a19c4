//! Slot Calendar
//!
//! Deterministic enumeration of bookable slot start instants for a vendor
//! day. Operating hours are wall-clock times in the vendor's timezone; the
//! resulting instants are UTC.
//!
//! # DST handling
//!
//! The opening and closing wall-clock times are resolved to instants first,
//! then slots step in absolute time. A day with a transition inside the
//! window therefore yields the slots that actually fit between open and
//! close.
//!
//! - Ambiguous local time (clocks fall back): earliest instant
//! - Non-existent local time (clocks spring forward): the instant the gap ends

use crate::entities::slot_duration;
use crate::value_objects::{DomainError, VendorTimezone};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Upper bound on how far back a spring-forward gap is probed
const MAX_GAP_PROBE_STEPS: i64 = 12;

/// Fixed daily operating window split into equal slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotCalendar {
    opens_at: NaiveTime,
    closes_at: NaiveTime,
    slot_length: Duration,
}

impl SlotCalendar {
    /// Create a calendar for a custom window
    ///
    /// # Errors
    /// Returns `DomainError::InvalidCalendar` if the window is empty or the
    /// slot length is not positive
    pub fn new(
        opens_at: NaiveTime,
        closes_at: NaiveTime,
        slot_length: Duration,
    ) -> Result<Self, DomainError> {
        if opens_at >= closes_at {
            return Err(DomainError::InvalidCalendar(format!(
                "Opening time {} must be before closing time {}",
                opens_at, closes_at
            )));
        }
        if slot_length <= Duration::zero() {
            return Err(DomainError::InvalidCalendar("Slot length must be positive".to_string()));
        }
        Ok(Self { opens_at, closes_at, slot_length })
    }

    /// Ordered slot start instants for `date` in `timezone`
    pub fn slots(&self, timezone: &VendorTimezone, date: NaiveDate) -> Vec<DateTime<Utc>> {
        let tz = timezone.tz();
        let (Some(open), Some(close)) = (
            resolve_local(tz, date.and_time(self.opens_at)),
            resolve_local(tz, date.and_time(self.closes_at)),
        ) else {
            return Vec::new();
        };

        let mut slots = Vec::new();
        let mut current = open;
        while current < close {
            slots.push(current);
            current += self.slot_length;
        }
        slots
    }

    /// Check whether `instant` is a slot start produced by [`SlotCalendar::slots`]
    /// for its local date in `timezone`
    pub fn is_slot_boundary(&self, timezone: &VendorTimezone, instant: DateTime<Utc>) -> bool {
        let local_date = instant.with_timezone(&timezone.tz()).date_naive();
        self.slots(timezone, local_date).contains(&instant)
    }
}

impl Default for SlotCalendar {
    /// 09:00–17:00 local, 30-minute slots
    fn default() -> Self {
        Self {
            opens_at: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
            closes_at: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or(NaiveTime::MIN),
            slot_length: slot_duration(),
        }
    }
}

/// Slots for `date` using the default operating hours
pub fn daily_slots(timezone: &VendorTimezone, date: NaiveDate) -> Vec<DateTime<Utc>> {
    SlotCalendar::default().slots(timezone, date)
}

/// Resolve a wall-clock time in `tz` to an instant.
fn resolve_local(tz: Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    if let Some(dt) = tz.from_local_datetime(&local).earliest() {
        return Some(dt.with_timezone(&Utc));
    }

    // Inside a gap: step back until the wall clock exists, then forward the
    // same amount of absolute time.
    (1..=MAX_GAP_PROBE_STEPS).find_map(|step| {
        let back = Duration::minutes(15 * step);
        tz.from_local_datetime(&(local - back))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc) + back)
    })
}
