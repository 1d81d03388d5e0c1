//! Archivematica package discovery and ingest selection
//!
//! [`ArchivematicaApi`] lists stored packages from the storage service.
//! [`ArchivematicaService`] applies the size ceiling and turns what remains
//! into [`courier_common::RepositoryPackage`]s.

mod api;
mod service;
pub mod types;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_common::Package;

use crate::error::Result;

pub use api::{ArchivematicaApi, SYSTEM_NAME};
pub use service::ArchivematicaService;
pub use types::{parse_stored_date, PackageRecord};

/// Somewhere packages can be discovered
#[async_trait]
pub trait PackageSource: Send + Sync {
    /// Packages stored at `location_uuid`, restricted server-side to those
    /// stored after `stored_date` when one is given.
    async fn get_packages(
        &self,
        location_uuid: &str,
        stored_date: Option<DateTime<Utc>>,
    ) -> Result<Vec<Package>>;
}
