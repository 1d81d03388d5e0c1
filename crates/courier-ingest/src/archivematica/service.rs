use chrono::{DateTime, Utc};
use courier_common::{ObjectMetadata, Package, RepositoryPackage, NOT_AVAILABLE};
use std::sync::Arc;
use tracing::{debug, info};

use super::PackageSource;
use crate::config::ArchivematicaConfig;
use crate::error::{IngestError, Result};

/// Selects packages from one Archivematica location for repository ingest.
///
/// Packages larger than the size ceiling are skipped, not failed: very large
/// packages would swamp downstream storage.
pub struct ArchivematicaService {
    name: String,
    source: Arc<dyn PackageSource>,
    location_uuid: String,
    stored_date: Option<DateTime<Utc>>,
    object_size_limit: u64,
}

impl ArchivematicaService {
    pub fn new(
        name: impl Into<String>,
        source: Arc<dyn PackageSource>,
        location_uuid: impl Into<String>,
        stored_date: Option<DateTime<Utc>>,
        object_size_limit: u64,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            location_uuid: location_uuid.into(),
            stored_date,
            object_size_limit,
        }
    }

    pub fn from_config(config: &ArchivematicaConfig, source: Arc<dyn PackageSource>) -> Self {
        Self::new(
            &config.name,
            source,
            &config.location_uuid,
            config.stored_date,
            config.object_size_limit,
        )
    }

    /// Logical source name stamped on every selected package
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Packages ready for ingest, in discovery order
    pub async fn get_repository_packages(&self) -> Result<Vec<RepositoryPackage>> {
        let packages = self
            .source
            .get_packages(&self.location_uuid, self.stored_date)
            .await?;
        let discovered = packages.len();

        let selected = packages
            .into_iter()
            .filter(|package| {
                let fits = package.size <= self.object_size_limit;
                if !fits {
                    debug!(
                        uuid = %package.uuid,
                        size = package.size,
                        limit = self.object_size_limit,
                        "Skipping package over size limit"
                    );
                }
                fits
            })
            .map(|package| self.to_repository_package(package))
            .collect::<Result<Vec<_>>>()?;

        info!(
            source = %self.name,
            discovered,
            selected = selected.len(),
            "Selected packages for ingest"
        );
        Ok(selected)
    }

    fn to_repository_package(&self, package: Package) -> Result<RepositoryPackage> {
        let stored_time = package
            .stored_date
            .ok_or_else(|| IngestError::MissingStoredDate {
                uuid: package.uuid.clone(),
            })?;
        let title = derive_title(&package.uuid, &package.path);

        Ok(RepositoryPackage {
            remote_path: package.path,
            metadata: ObjectMetadata {
                id: package.uuid,
                title,
                creator: NOT_AVAILABLE.to_string(),
                description: NOT_AVAILABLE.to_string(),
            },
            context: self.name.clone(),
            stored_time,
        })
    }
}

/// `"<uuid> / <name>"`, where name is the last path segment without its
/// `-<uuid>` suffix
fn derive_title(uuid: &str, path: &str) -> String {
    let segment = path.trim_end_matches('/').rsplit('/').next().unwrap_or(path);
    let name = segment
        .strip_suffix(uuid)
        .and_then(|rest| rest.strip_suffix('-'))
        .unwrap_or(segment);
    format!("{uuid} / {name}")
}
