//! SQLite connection pool, migrations and timestamp encoding

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{LedgerError, Result};

const IN_MEMORY_URL: &str = "sqlite::memory:";

/// Stored timestamps keep microseconds; anything finer is truncated.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://courier.db".to_string(),
            max_connections: 5,
            connect_timeout_secs: 30,
        }
    }
}

impl DbConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// A private in-memory database, mostly for tests
    pub fn in_memory() -> Self {
        Self::new(IN_MEMORY_URL)
    }

    fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }
}

/// Open a pool and bring the schema up to date.
pub async fn connect(config: &DbConfig) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let mut pool_options =
        SqlitePoolOptions::new().acquire_timeout(Duration::from_secs(config.connect_timeout_secs));

    // Every connection to an in-memory URL opens its own empty database,
    // so the pool must hold exactly one connection for its whole life.
    pool_options = if config.is_in_memory() {
        pool_options
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        pool_options.max_connections(config.max_connections)
    };

    let pool = pool_options.connect_with(options).await?;
    migrate(&pool).await?;

    tracing::info!(
        url = %config.url,
        max_connections = config.max_connections,
        "Ledger database ready"
    );

    Ok(pool)
}

/// Apply embedded migrations
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn health_check(pool: &SqlitePool) -> Result<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map(|_| ())
        .map_err(LedgerError::from)
}

/// Truncate to the precision the database keeps
pub fn truncate_timestamp(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    timestamp
        .duration_trunc(TimeDelta::microseconds(1))
        .unwrap_or(timestamp)
}

pub(crate) fn encode_timestamp(timestamp: DateTime<Utc>) -> String {
    truncate_timestamp(timestamp)
        .format(TIMESTAMP_FORMAT)
        .to_string()
}

pub(crate) fn decode_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|source| LedgerError::InvalidTimestamp {
            value: value.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn test_default_config() {
        let config = DbConfig::default();
        assert_eq!(config.max_connections, 5);
        assert!(!config.is_in_memory());
        assert!(DbConfig::in_memory().is_in_memory());
    }

    #[test]
    fn encoded_timestamps_are_fixed_width_and_sort_in_time_order() {
        let whole = Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap();
        let fraction = whole.with_nanosecond(500_000_000).unwrap();

        let a = encode_timestamp(whole);
        let b = encode_timestamp(fraction);

        assert_eq!(a, "2024-03-04T12:00:00.000000Z");
        assert_eq!(b, "2024-03-04T12:00:00.500000Z");
        assert_eq!(a.len(), b.len());
        assert!(a < b);
    }

    #[test]
    fn sub_microsecond_precision_is_truncated() {
        let ts = Utc
            .with_ymd_and_hms(2024, 3, 4, 12, 0, 0)
            .unwrap()
            .with_nanosecond(123_456_789)
            .unwrap();

        let decoded = decode_timestamp(&encode_timestamp(ts)).unwrap();
        assert_eq!(decoded.nanosecond(), 123_456_000);
        assert_eq!(decoded, truncate_timestamp(ts));
    }

    #[test]
    fn garbage_timestamp_is_reported() {
        let err = decode_timestamp("yesterday").unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTimestamp { .. }));
    }

    #[tokio::test]
    async fn in_memory_pool_is_migrated() {
        let pool = connect(&DbConfig::in_memory()).await.unwrap();
        health_check(&pool).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM status")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count as usize, crate::Status::ALL.len());
    }

    #[tokio::test]
    async fn file_database_survives_reconnect() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("ledger.db").display());

        let pool = connect(&DbConfig::new(&url)).await.unwrap();
        sqlx::query(
            "INSERT INTO repository_package (identifier, repository_name, updated_at) \
             VALUES ('000001', 'repository-1', '2024-03-04T12:00:00.000000Z')",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool.close().await;

        // Migrations are recorded, so reconnecting must not re-run them.
        let pool = connect(&DbConfig::new(&url)).await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM repository_package")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
