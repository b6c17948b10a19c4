//! Engine error types.

use swiftslot_domain::DomainError;
use swiftslot_store::StoreError;
use thiserror::Error;

/// Errors that can occur in booking use cases.
///
/// Every variant carries a stable machine-readable code, see [`EngineError::code`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// Missing or malformed input
    #[error("{message}")]
    Validation {
        /// Stable error code
        code: &'static str,
        /// Human readable message
        message: String,
    },

    /// Slot race lost, or an idempotency record cannot be replayed
    #[error("{message}")]
    Conflict {
        /// Stable error code
        code: &'static str,
        /// Human readable message
        message: String,
    },

    /// Referenced vendor, booking or payment does not exist
    #[error("{message}")]
    NotFound {
        /// Stable error code
        code: &'static str,
        /// Human readable message
        message: String,
    },

    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Domain error
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

impl EngineError {
    /// Create a validation error
    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        Self::Validation { code, message: message.into() }
    }

    /// Create a conflict error
    pub fn conflict(code: &'static str, message: impl Into<String>) -> Self {
        Self::Conflict { code, message: message.into() }
    }

    /// Create a not found error
    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::NotFound { code, message: message.into() }
    }

    /// Stable identifier for clients
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Validation { code, .. }
            | EngineError::Conflict { code, .. }
            | EngineError::NotFound { code, .. } => code,
            EngineError::Store(_) | EngineError::Domain(_) => "internal_error",
        }
    }

    /// True for failures the caller did not cause
    pub fn is_internal(&self) -> bool {
        matches!(self, EngineError::Store(_) | EngineError::Domain(_))
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
