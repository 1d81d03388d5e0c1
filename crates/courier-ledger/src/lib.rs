//! Courier Ledger
//!
//! Durable record of every ingest attempt. The [`StatusEventRepository`] is an
//! append-only, per-bag event log; bags and repository packages are kept in
//! small identifier repositories the log references.
//!
//! Every repository has two interchangeable backends:
//!
//! - **memory**: process-local, ids from a counter starting at 0
//! - **database**: SQLite through sqlx, schema from embedded migrations
//!
//! Callers pick a backend through the factory functions, passing the
//! optional database pool:
//!
//! ```no_run
//! use chrono::Utc;
//! use courier_ledger::{db, status_event_repository};
//!
//! # async fn run() -> courier_ledger::Result<()> {
//! let pool = db::connect(&db::DbConfig::in_memory()).await?;
//! let ledger = status_event_repository(Some(&pool));
//! ledger.create("repository.context-001", "bagging", Utc::now(), None).await?;
//! # Ok(())
//! # }
//! ```

pub mod bag;
pub mod db;
pub mod error;
pub mod repository_package;
pub mod status;
pub mod status_event;

pub use bag::{bag_repository, Bag, BagRepository};
pub use error::{LedgerError, Result};
pub use repository_package::{
    repository_package_repository, RepositoryPackageRecord, RepositoryPackageRepository,
};
pub use status::Status;
pub use status_event::{status_event_repository, StatusEvent, StatusEventRepository};

/// Which storage backend a repository instance writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Memory,
    Database,
}
