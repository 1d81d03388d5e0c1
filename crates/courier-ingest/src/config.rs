//! Configuration management
//!
//! Every section is read from environment variables; `.env` files are
//! honoured through [`load_dotenv`]. The `from_lookup` constructors take the
//! variable source as a function so they can be exercised without touching
//! the process environment.

use chrono::{DateTime, Utc};
use courier_common::{CourierError, Result};
use courier_ledger::db::{self, DbConfig};
use reqwest::header::HeaderMap;
use sqlx::SqlitePool;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::archivematica::parse_stored_date;
use crate::transport::{ReqwestTransport, RetryPolicy, DEFAULT_BACKOFF_FACTOR};

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default Archivematica storage service API prefix.
pub const DEFAULT_ARCHIVEMATICA_API_PREFIX: &str = "/api/v2/";

/// Default largest package selected for ingest (4 GB).
pub const DEFAULT_OBJECT_SIZE_LIMIT: u64 = 4_000_000_000;

/// Default number of records requested per page.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Default APTrust member API prefix.
pub const DEFAULT_APTRUST_API_PREFIX: &str = "/member-api/v3/";

pub const DEFAULT_HTTP_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_HTTP_RETRY_INTERVAL_MS: u64 = 500;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;

/// Load a `.env` file from the working directory, if there is one
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Reads variables, treating blank values as unset
struct Vars<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn optional(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, name: &str) -> Result<String> {
        self.optional(name)
            .ok_or_else(|| CourierError::config(format!("{name} is not set")))
    }

    fn or(&self, name: &str, default: &str) -> String {
        self.optional(name).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T: FromStr>(&self, name: &str, default: T) -> Result<T> {
        match self.optional(name) {
            Some(value) => value.parse().map_err(|_| {
                CourierError::parse(format!("{name} has an invalid value '{value}'"))
            }),
            None => Ok(default),
        }
    }
}

/// Archivematica source settings
#[derive(Clone)]
pub struct ArchivematicaConfig {
    pub base_url: String,
    pub username: String,
    pub api_key: String,
    pub api_prefix: String,
    pub location_uuid: String,
    /// Logical source name recorded as each package's context
    pub name: String,
    /// Only packages stored after this instant are listed
    pub stored_date: Option<DateTime<Utc>>,
    pub object_size_limit: u64,
    pub page_size: u32,
}

impl fmt::Debug for ArchivematicaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchivematicaConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("api_key", &"[redacted]")
            .field("api_prefix", &self.api_prefix)
            .field("location_uuid", &self.location_uuid)
            .field("name", &self.name)
            .field("stored_date", &self.stored_date)
            .field("object_size_limit", &self.object_size_limit)
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl ArchivematicaConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let vars = Vars { lookup };

        let stored_date = match vars.optional("ARCHIVEMATICA_STORED_DATE") {
            Some(value) => Some(parse_stored_date(&value).map_err(|e| {
                CourierError::parse(format!(
                    "ARCHIVEMATICA_STORED_DATE '{value}' is not a timestamp: {e}"
                ))
            })?),
            None => None,
        };

        let config = Self {
            base_url: vars.required("ARCHIVEMATICA_BASE_URL")?,
            username: vars.required("ARCHIVEMATICA_USERNAME")?,
            api_key: vars.required("ARCHIVEMATICA_API_KEY")?,
            api_prefix: vars.or("ARCHIVEMATICA_API_PREFIX", DEFAULT_ARCHIVEMATICA_API_PREFIX),
            location_uuid: vars.required("ARCHIVEMATICA_LOCATION_UUID")?,
            name: vars.required("ARCHIVEMATICA_NAME")?,
            stored_date,
            object_size_limit: vars
                .parsed("ARCHIVEMATICA_OBJECT_SIZE_LIMIT", DEFAULT_OBJECT_SIZE_LIMIT)?,
            page_size: vars.parsed("ARCHIVEMATICA_PAGE_SIZE", DEFAULT_PAGE_SIZE)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(CourierError::config(
                "ARCHIVEMATICA_PAGE_SIZE must be greater than 0",
            ));
        }
        if self.object_size_limit == 0 {
            return Err(CourierError::config(
                "ARCHIVEMATICA_OBJECT_SIZE_LIMIT must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// APTrust member API settings
#[derive(Clone)]
pub struct AptrustConfig {
    pub base_url: String,
    pub username: String,
    pub api_key: String,
    pub api_prefix: String,
    /// Prepended to bag identifiers, e.g. `umich.edu/`
    pub object_id_prefix: String,
}

impl fmt::Debug for AptrustConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AptrustConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("api_key", &"[redacted]")
            .field("api_prefix", &self.api_prefix)
            .field("object_id_prefix", &self.object_id_prefix)
            .finish()
    }
}

impl AptrustConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let vars = Vars { lookup };
        Ok(Self {
            base_url: vars.required("APTRUST_BASE_URL")?,
            username: vars.required("APTRUST_USERNAME")?,
            api_key: vars.required("APTRUST_API_KEY")?,
            api_prefix: vars.or("APTRUST_API_PREFIX", DEFAULT_APTRUST_API_PREFIX),
            object_id_prefix: vars.required("APTRUST_OBJECT_ID_PREFIX")?,
        })
    }
}

/// HTTP retry and timeout settings shared by every remote client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub retry_interval_ms: u64,
    pub timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_HTTP_MAX_ATTEMPTS,
            retry_interval_ms: DEFAULT_HTTP_RETRY_INTERVAL_MS,
            timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

impl RetryConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let vars = Vars { lookup };
        let config = Self {
            max_attempts: vars.parsed("HTTP_MAX_ATTEMPTS", DEFAULT_HTTP_MAX_ATTEMPTS)?,
            retry_interval_ms: vars
                .parsed("HTTP_RETRY_INTERVAL_MS", DEFAULT_HTTP_RETRY_INTERVAL_MS)?,
            timeout_secs: vars.parsed("HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(CourierError::config("HTTP_MAX_ATTEMPTS must be at least 1"));
        }
        if self.timeout_secs == 0 {
            return Err(CourierError::config("HTTP_TIMEOUT_SECS must be greater than 0"));
        }
        Ok(())
    }

    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            interval: Duration::from_millis(self.retry_interval_ms),
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// HTTP transport sending `headers` with every request
    pub fn transport(&self, headers: HeaderMap) -> Result<ReqwestTransport> {
        ReqwestTransport::new(headers, self.timeout())
            .map_err(|e| CourierError::config(format!("Could not build HTTP client: {e}")))
    }
}

/// Ledger database settings.
///
/// Without `DATABASE_URL` the ledger and identifier repositories fall back
/// to their in-memory backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let vars = Vars { lookup };
        let config = Self {
            url: vars.optional("DATABASE_URL"),
            max_connections: vars
                .parsed("DATABASE_MAX_CONNECTIONS", DEFAULT_DATABASE_MAX_CONNECTIONS)?,
        };
        if config.url.is_some() && config.max_connections == 0 {
            return Err(CourierError::config(
                "DATABASE_MAX_CONNECTIONS must be greater than 0",
            ));
        }
        Ok(config)
    }

    pub fn db_config(&self) -> Option<DbConfig> {
        self.url.as_ref().map(|url| DbConfig {
            max_connections: self.max_connections,
            ..DbConfig::new(url)
        })
    }

    /// Open the ledger pool, or `None` when no database is configured
    pub async fn connect(&self) -> courier_ledger::Result<Option<SqlitePool>> {
        match self.db_config() {
            Some(config) => Ok(Some(db::connect(&config).await?)),
            None => Ok(None),
        }
    }
}
