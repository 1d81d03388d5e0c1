use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use super::{StatusEvent, StatusEventRepository};
use crate::db::{decode_timestamp, encode_timestamp};
use crate::error::Result;
use crate::status::Status;
use crate::Backend;

const SELECT_EVENTS: &str = r#"
    SELECT se.id, s.name AS status, b.identifier AS bag_identifier, se.timestamp, se.note
    FROM status_event se
    JOIN status s ON s.id = se.status_id
    JOIN bag b ON b.id = se.bag_id
"#;

#[derive(FromRow)]
struct StatusEventRow {
    id: i64,
    status: String,
    bag_identifier: String,
    timestamp: String,
    note: Option<String>,
}

impl TryFrom<StatusEventRow> for StatusEvent {
    type Error = crate::LedgerError;

    fn try_from(row: StatusEventRow) -> Result<Self> {
        Ok(StatusEvent {
            id: row.id,
            status: row.status.parse()?,
            bag_identifier: row.bag_identifier,
            timestamp: decode_timestamp(&row.timestamp)?,
            note: row.note,
        })
    }
}

fn into_events(rows: Vec<StatusEventRow>) -> Result<Vec<StatusEvent>> {
    rows.into_iter().map(StatusEvent::try_from).collect()
}

/// Ledger persisted in the `status_event` table.
///
/// Timestamps are stored with microsecond precision. The referenced bag
/// must already exist; the schema rejects events for unknown bags.
pub struct DatabaseStatusEventRepository {
    pool: SqlitePool,
}

impl DatabaseStatusEventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StatusEventRepository for DatabaseStatusEventRepository {
    fn backend(&self) -> Backend {
        Backend::Database
    }

    async fn create(
        &self,
        bag_identifier: &str,
        status: &str,
        timestamp: DateTime<Utc>,
        note: Option<&str>,
    ) -> Result<()> {
        let status: Status = status.parse()?;

        let result = sqlx::query(
            r#"
            INSERT INTO status_event (status_id, bag_id, timestamp, note)
            VALUES (
                (SELECT id FROM status WHERE name = ?1),
                (SELECT id FROM bag WHERE identifier = ?2),
                ?3,
                ?4
            )
            "#,
        )
        .bind(status.as_str())
        .bind(bag_identifier)
        .bind(encode_timestamp(timestamp))
        .bind(note)
        .execute(&self.pool)
        .await?;

        debug!(
            id = result.last_insert_rowid(),
            bag_identifier,
            %status,
            "status event recorded in database"
        );
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<StatusEvent>> {
        let rows = sqlx::query_as::<_, StatusEventRow>(&format!("{SELECT_EVENTS} ORDER BY se.id"))
            .fetch_all(&self.pool)
            .await?;
        into_events(rows)
    }

    async fn get_all_for_bag_identifier(&self, bag_identifier: &str) -> Result<Vec<StatusEvent>> {
        let rows = sqlx::query_as::<_, StatusEventRow>(&format!(
            "{SELECT_EVENTS} WHERE b.identifier = ?1 ORDER BY se.id"
        ))
        .bind(bag_identifier)
        .fetch_all(&self.pool)
        .await?;
        into_events(rows)
    }

    async fn get_latest_event_for_bag(
        &self,
        bag_identifier: &str,
    ) -> Result<Option<StatusEvent>> {
        let row = sqlx::query_as::<_, StatusEventRow>(&format!(
            "{SELECT_EVENTS} WHERE b.identifier = ?1 ORDER BY se.timestamp DESC, se.id DESC LIMIT 1"
        ))
        .bind(bag_identifier)
        .fetch_optional(&self.pool)
        .await?;
        row.map(StatusEvent::try_from).transpose()
    }
}
