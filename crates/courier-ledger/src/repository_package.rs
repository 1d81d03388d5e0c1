//! Identifiers of repository packages handed to the ingest pipeline

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::db::{decode_timestamp, encode_timestamp};
use crate::error::{LedgerError, Result};
use crate::Backend;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryPackageRecord {
    pub identifier: String,
    pub repository_name: String,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait RepositoryPackageRepository: Send + Sync {
    fn backend(&self) -> Backend;

    async fn create(
        &self,
        identifier: &str,
        repository_name: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn get_by_identifier(&self, identifier: &str) -> Result<Option<RepositoryPackageRecord>>;

    async fn get_all(&self) -> Result<Vec<RepositoryPackageRecord>>;
}

pub fn repository_package_repository(
    db: Option<&SqlitePool>,
) -> Arc<dyn RepositoryPackageRepository> {
    match db {
        Some(pool) => Arc::new(DatabaseRepositoryPackageRepository::new(pool.clone())),
        None => Arc::new(InMemoryRepositoryPackageRepository::default()),
    }
}

#[derive(Default)]
pub struct InMemoryRepositoryPackageRepository {
    packages: Mutex<Vec<RepositoryPackageRecord>>,
}

#[async_trait]
impl RepositoryPackageRepository for InMemoryRepositoryPackageRepository {
    fn backend(&self) -> Backend {
        Backend::Memory
    }

    async fn create(
        &self,
        identifier: &str,
        repository_name: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut packages = self.packages.lock().await;
        if packages.iter().any(|p| p.identifier == identifier) {
            return Err(LedgerError::duplicate("Repository package", identifier));
        }
        packages.push(RepositoryPackageRecord {
            identifier: identifier.to_string(),
            repository_name: repository_name.to_string(),
            updated_at,
        });
        Ok(())
    }

    async fn get_by_identifier(&self, identifier: &str) -> Result<Option<RepositoryPackageRecord>> {
        let packages = self.packages.lock().await;
        Ok(packages.iter().find(|p| p.identifier == identifier).cloned())
    }

    async fn get_all(&self) -> Result<Vec<RepositoryPackageRecord>> {
        Ok(self.packages.lock().await.clone())
    }
}

#[derive(FromRow)]
struct PackageRow {
    identifier: String,
    repository_name: String,
    updated_at: String,
}

impl TryFrom<PackageRow> for RepositoryPackageRecord {
    type Error = LedgerError;

    fn try_from(row: PackageRow) -> Result<Self> {
        Ok(RepositoryPackageRecord {
            identifier: row.identifier,
            repository_name: row.repository_name,
            updated_at: decode_timestamp(&row.updated_at)?,
        })
    }
}

pub struct DatabaseRepositoryPackageRepository {
    pool: SqlitePool,
}

impl DatabaseRepositoryPackageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RepositoryPackageRepository for DatabaseRepositoryPackageRepository {
    fn backend(&self) -> Backend {
        Backend::Database
    }

    async fn create(
        &self,
        identifier: &str,
        repository_name: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO repository_package (identifier, repository_name, updated_at) \
             VALUES (?1, ?2, ?3)",
        )
        .bind(identifier)
        .bind(repository_name)
        .bind(encode_timestamp(updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::from_insert(e, "Repository package", identifier))?;
        Ok(())
    }

    async fn get_by_identifier(&self, identifier: &str) -> Result<Option<RepositoryPackageRecord>> {
        sqlx::query_as::<_, PackageRow>(
            "SELECT identifier, repository_name, updated_at FROM repository_package \
             WHERE identifier = ?1",
        )
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?
        .map(RepositoryPackageRecord::try_from)
        .transpose()
    }

    async fn get_all(&self) -> Result<Vec<RepositoryPackageRecord>> {
        sqlx::query_as::<_, PackageRow>(
            "SELECT identifier, repository_name, updated_at FROM repository_package ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(RepositoryPackageRecord::try_from)
        .collect()
    }
}
