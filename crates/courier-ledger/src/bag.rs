//! Bags: the units pushed through bagging and deposit, one or more per
//! repository package

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{LedgerError, Result};
use crate::Backend;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Bag {
    pub identifier: String,
    /// Position of this bag when a package is split across several
    pub group_part: i64,
    pub repository_package_identifier: String,
}

#[async_trait]
pub trait BagRepository: Send + Sync {
    fn backend(&self) -> Backend;

    async fn create(
        &self,
        identifier: &str,
        group_part: i64,
        repository_package_identifier: &str,
    ) -> Result<()>;

    async fn get_by_identifier(&self, identifier: &str) -> Result<Option<Bag>>;

    async fn get_all(&self) -> Result<Vec<Bag>>;
}

pub fn bag_repository(db: Option<&SqlitePool>) -> Arc<dyn BagRepository> {
    match db {
        Some(pool) => Arc::new(DatabaseBagRepository::new(pool.clone())),
        None => Arc::new(InMemoryBagRepository::default()),
    }
}

#[derive(Default)]
pub struct InMemoryBagRepository {
    bags: Mutex<Vec<Bag>>,
}

#[async_trait]
impl BagRepository for InMemoryBagRepository {
    fn backend(&self) -> Backend {
        Backend::Memory
    }

    async fn create(
        &self,
        identifier: &str,
        group_part: i64,
        repository_package_identifier: &str,
    ) -> Result<()> {
        let mut bags = self.bags.lock().await;
        if bags.iter().any(|b| b.identifier == identifier) {
            return Err(LedgerError::duplicate("Bag", identifier));
        }
        bags.push(Bag {
            identifier: identifier.to_string(),
            group_part,
            repository_package_identifier: repository_package_identifier.to_string(),
        });
        Ok(())
    }

    async fn get_by_identifier(&self, identifier: &str) -> Result<Option<Bag>> {
        let bags = self.bags.lock().await;
        Ok(bags.iter().find(|b| b.identifier == identifier).cloned())
    }

    async fn get_all(&self) -> Result<Vec<Bag>> {
        Ok(self.bags.lock().await.clone())
    }
}

const SELECT_BAGS: &str = r#"
    SELECT b.identifier, b.group_part, rp.identifier AS repository_package_identifier
    FROM bag b
    JOIN repository_package rp ON rp.id = b.repository_package_id
"#;

pub struct DatabaseBagRepository {
    pool: SqlitePool,
}

impl DatabaseBagRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BagRepository for DatabaseBagRepository {
    fn backend(&self) -> Backend {
        Backend::Database
    }

    async fn create(
        &self,
        identifier: &str,
        group_part: i64,
        repository_package_identifier: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO bag (identifier, group_part, repository_package_id)
            VALUES (?1, ?2, (SELECT id FROM repository_package WHERE identifier = ?3))
            "#,
        )
        .bind(identifier)
        .bind(group_part)
        .bind(repository_package_identifier)
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::from_insert(e, "Bag", identifier))?;
        Ok(())
    }

    async fn get_by_identifier(&self, identifier: &str) -> Result<Option<Bag>> {
        let bag = sqlx::query_as::<_, Bag>(&format!("{SELECT_BAGS} WHERE b.identifier = ?1"))
            .bind(identifier)
            .fetch_optional(&self.pool)
            .await?;
        Ok(bag)
    }

    async fn get_all(&self) -> Result<Vec<Bag>> {
        let bags = sqlx::query_as::<_, Bag>(&format!("{SELECT_BAGS} ORDER BY b.id"))
            .fetch_all(&self.pool)
            .await?;
        Ok(bags)
    }
}
