//! Value Objects for the SwiftSlot Domain
//!
//! Immutable, validated domain primitives.
//! All value objects enforce invariants at construction time.

use chrono_tz::Tz;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum accepted length of a caller-supplied idempotency key (bytes)
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

/// Domain errors for value object validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Timezone must be a known IANA zone name
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    /// Calendar window or slot length is unusable
    #[error("Invalid calendar: {0}")]
    InvalidCalendar(String),

    /// Idempotency key is empty or too long
    #[error("Invalid idempotency key: {0}")]
    InvalidIdempotencyKey(String),

    /// Payment reference is empty
    #[error("Invalid payment reference: {0}")]
    InvalidPaymentRef(String),

    /// Unknown status string
    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    /// Stored response could not be encoded or decoded
    #[error("Invalid stored response: {0}")]
    InvalidStoredResponse(String),
}

// =============================================================================
// VendorTimezone
// =============================================================================

/// IANA timezone a vendor operates in (e.g. `Africa/Lagos`)
///
/// # Invariants
/// - Must name a zone known to the tz database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VendorTimezone(Tz);

impl VendorTimezone {
    /// Parse an IANA zone name
    ///
    /// # Examples
    /// ```
    /// # use swiftslot_domain::value_objects::VendorTimezone;
    /// let tz = VendorTimezone::parse("Africa/Lagos").unwrap();
    /// assert_eq!(tz.name(), "Africa/Lagos");
    /// ```
    ///
    /// # Errors
    /// Returns `DomainError::InvalidTimezone` if the name is unknown
    pub fn parse(name: &str) -> Result<Self, DomainError> {
        name.parse::<Tz>()
            .map(Self)
            .map_err(|_| DomainError::InvalidTimezone(name.to_string()))
    }

    /// Underlying tz database zone
    pub fn tz(&self) -> Tz {
        self.0
    }

    /// IANA zone name
    pub fn name(&self) -> &'static str {
        self.0.name()
    }
}

impl TryFrom<String> for VendorTimezone {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<VendorTimezone> for String {
    fn from(value: VendorTimezone) -> Self {
        value.name().to_string()
    }
}

impl fmt::Display for VendorTimezone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// PaymentRef
// =============================================================================

/// Opaque, caller-unguessable token correlating a confirmation event with
/// its payment attempt
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentRef(String);

impl PaymentRef {
    /// Generate a fresh reference from 128 random bits
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(format!("pay_{}", hex::encode(bytes)))
    }

    /// Wrap an existing reference (e.g. read from a webhook body)
    ///
    /// # Errors
    /// Returns `DomainError::InvalidPaymentRef` if the value is blank
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(DomainError::InvalidPaymentRef("Reference must be non-empty".to_string()));
        }
        Ok(Self(value))
    }

    /// Reference as string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PaymentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// IdempotencyKey
// =============================================================================

/// Caller-supplied token identifying one logical mutating request
///
/// # Invariants
/// - Non-blank
/// - At most `MAX_IDEMPOTENCY_KEY_LEN` bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Validate a raw header value
    ///
    /// # Errors
    /// Returns `DomainError::InvalidIdempotencyKey` if blank or too long
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(DomainError::InvalidIdempotencyKey("Key must be non-empty".to_string()));
        }
        if value.len() > MAX_IDEMPOTENCY_KEY_LEN {
            return Err(DomainError::InvalidIdempotencyKey(format!(
                "Key must be at most {} bytes",
                MAX_IDEMPOTENCY_KEY_LEN
            )));
        }
        Ok(Self(value))
    }

    /// Key as string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
