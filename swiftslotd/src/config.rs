//! Daemon configuration.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::error::{DaemonError, DaemonResult};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use swiftslot_domain::BuyerId;
use swiftslot_engine::ReservationPolicy;

// =============================================================================
// Configuration
// =============================================================================

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Booking rules
    pub booking: BookingConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Environment (test, development, production)
    pub environment: Environment,
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Per-request timeout
    pub request_timeout: Duration,
}

/// Booking rules.
#[derive(Debug, Clone)]
pub struct BookingConfig {
    /// Only accept start instants produced by the slot calendar
    pub require_slot_alignment: bool,
    /// Minimum minutes between now and a slot start
    pub min_lead_time_minutes: Option<i64>,
    /// Buyer recorded on bookings until an identity provider is wired in
    pub default_buyer_id: BuyerId,
}

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Postgres URL; the in-memory store is used when unset
    pub url: Option<String>,
    /// Pool size
    pub max_connections: u32,
}

/// Environment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Test environment
    Test,
    /// Development environment
    Development,
    /// Production environment
    Production,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> DaemonResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> DaemonResult<Self> {
        let environment = Self::load_environment(&lookup)?;
        let api = Self::load_api_config(&lookup)?;
        let booking = Self::load_booking_config(&lookup)?;
        let database = Self::load_database_config(&lookup)?;

        Ok(Self {
            api,
            booking,
            database,
            environment,
        })
    }

    /// Create test configuration.
    pub fn test() -> Self {
        Self {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
                request_timeout: Duration::from_secs(5),
            },
            booking: BookingConfig::default(),
            database: DatabaseConfig { url: None, max_connections: 2 },
            environment: Environment::Test,
        }
    }

    fn load_environment(lookup: &impl Fn(&str) -> Option<String>) -> DaemonResult<Environment> {
        let env_str = lookup("SWIFTSLOT_ENV").unwrap_or_else(|| "development".to_string());

        match env_str.to_lowercase().as_str() {
            "test" => Ok(Environment::Test),
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(DaemonError::Config(format!(
                "Invalid SWIFTSLOT_ENV: {}. Expected: test, development, production",
                other
            ))),
        }
    }

    fn load_api_config(lookup: &impl Fn(&str) -> Option<String>) -> DaemonResult<ApiConfig> {
        let host = lookup("SWIFTSLOT_API_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = load_parsed(lookup, "SWIFTSLOT_API_PORT", 3001u16)?;
        let timeout_secs = load_parsed(lookup, "SWIFTSLOT_REQUEST_TIMEOUT_SECS", 10u64)?;

        Ok(ApiConfig {
            host,
            port,
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }

    fn load_booking_config(lookup: &impl Fn(&str) -> Option<String>) -> DaemonResult<BookingConfig> {
        let require_slot_alignment = match lookup("SWIFTSLOT_REQUIRE_SLOT_ALIGNMENT") {
            Some(raw) => parse_bool("SWIFTSLOT_REQUIRE_SLOT_ALIGNMENT", &raw)?,
            None => true,
        };

        let min_lead_time_minutes = match lookup("SWIFTSLOT_MIN_LEAD_TIME_MINUTES") {
            Some(raw) if !raw.trim().is_empty() => {
                let minutes = parse_value::<i64>("SWIFTSLOT_MIN_LEAD_TIME_MINUTES", &raw)?;
                if minutes < 0 || chrono::Duration::try_minutes(minutes).is_none() {
                    return Err(DaemonError::Config(format!(
                        "Invalid SWIFTSLOT_MIN_LEAD_TIME_MINUTES value: {}",
                        raw
                    )));
                }
                Some(minutes)
            },
            _ => None,
        };

        let default_buyer_id = load_parsed(lookup, "SWIFTSLOT_DEFAULT_BUYER_ID", 1)?;

        Ok(BookingConfig {
            require_slot_alignment,
            min_lead_time_minutes,
            default_buyer_id,
        })
    }

    fn load_database_config(lookup: &impl Fn(&str) -> Option<String>) -> DaemonResult<DatabaseConfig> {
        let url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        let max_connections = load_parsed(lookup, "SWIFTSLOT_DB_MAX_CONNECTIONS", 10u32)?;

        Ok(DatabaseConfig { url, max_connections })
    }
}

impl BookingConfig {
    /// Reservation policy for the engine
    pub fn policy(&self) -> ReservationPolicy {
        ReservationPolicy {
            require_alignment: self.require_slot_alignment,
            min_lead_time: self.min_lead_time_minutes.and_then(chrono::Duration::try_minutes),
        }
    }
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            require_slot_alignment: true,
            min_lead_time_minutes: None,
            default_buyer_id: 1,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                host: "0.0.0.0".to_string(),
                port: 3001,
                request_timeout: Duration::from_secs(10),
            },
            booking: BookingConfig::default(),
            database: DatabaseConfig { url: None, max_connections: 10 },
            environment: Environment::Development,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Test => write!(f, "test"),
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

fn load_parsed<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> DaemonResult<T> {
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> DaemonResult<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, raw)))
}

fn parse_bool(key: &str, raw: &str) -> DaemonResult<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(DaemonError::Config(format!("Invalid {} value: {}", key, raw))),
    }
}

// =============================================================================
// Tests
// =============================================================================
