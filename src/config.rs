//! Process configuration loaded from environment variables

use std::str::FromStr;
use std::time::Duration;

use crate::domain::order::PagingLimits;
use crate::reporting::{ReportConfig, DEFAULT_DATE_FORMAT};
use crate::utils::RetryConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Storage backend settings. No URL means the in-memory store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub connect_attempts: u32,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub paging: PagingLimits,
    pub report: ReportConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup. Unset and empty
    /// values fall back to defaults; present but malformed values are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = PagingLimits::default();

        Ok(Self {
            database: DatabaseConfig {
                url: get("DATABASE_URL"),
                max_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", 5)?,
                connect_attempts: parse_or(&get, "DB_CONNECT_MAX_ATTEMPTS", 5)?,
            },
            paging: PagingLimits {
                default_page_size: parse_or(
                    &get,
                    "ORDERS_DEFAULT_PAGE_SIZE",
                    defaults.default_page_size,
                )?,
                max_page_size: parse_or(&get, "ORDERS_MAX_PAGE_SIZE", defaults.max_page_size)?,
            },
            report: ReportConfig {
                include_inactive: parse_or(&get, "REPORT_INCLUDE_INACTIVE", true)?,
                date_format: get("REPORT_DATE_FORMAT")
                    .unwrap_or_else(|| DEFAULT_DATE_FORMAT.to_string()),
            },
        })
    }

    /// Backoff used while waiting for the database at startup.
    pub fn connect_retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.database.connect_attempts.max(1),
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}
