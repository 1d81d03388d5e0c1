//! Append-only status event ledger
//!
//! Each bag accumulates events as it moves through bagging, copying and
//! deposit. Events are never updated or removed.

mod database;
mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::error::Result;
use crate::status::Status;
use crate::Backend;

pub use database::DatabaseStatusEventRepository;
pub use memory::InMemoryStatusEventRepository;

/// One recorded step in a bag's lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    /// Assigned by the backend; unique and increasing within it
    pub id: i64,
    pub status: Status,
    pub bag_identifier: String,
    pub timestamp: DateTime<Utc>,
    pub note: Option<String>,
}

/// Storage contract shared by both ledger backends
#[async_trait]
pub trait StatusEventRepository: Send + Sync {
    fn backend(&self) -> Backend;

    /// Append an event.
    ///
    /// Fails with [`crate::LedgerError::UnknownStatus`] before anything is
    /// stored when `status` is outside the vocabulary.
    async fn create(
        &self,
        bag_identifier: &str,
        status: &str,
        timestamp: DateTime<Utc>,
        note: Option<&str>,
    ) -> Result<()>;

    /// Every event, in insertion order
    async fn get_all(&self) -> Result<Vec<StatusEvent>>;

    /// Events for one bag, in insertion order
    async fn get_all_for_bag_identifier(&self, bag_identifier: &str) -> Result<Vec<StatusEvent>>;

    /// The bag's event with the greatest timestamp, `None` if it has none
    async fn get_latest_event_for_bag(&self, bag_identifier: &str)
        -> Result<Option<StatusEvent>>;
}

/// Pick the ledger backend: database when a pool is given, memory otherwise.
pub fn status_event_repository(db: Option<&SqlitePool>) -> Arc<dyn StatusEventRepository> {
    match db {
        Some(pool) => Arc::new(DatabaseStatusEventRepository::new(pool.clone())),
        None => Arc::new(InMemoryStatusEventRepository::new()),
    }
}
