use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use super::{StatusEvent, StatusEventRepository};
use crate::error::Result;
use crate::status::Status;
use crate::Backend;

#[derive(Default)]
struct Log {
    next_id: i64,
    events: Vec<StatusEvent>,
}

/// Process-local ledger. Contents are lost when the process exits.
#[derive(Default)]
pub struct InMemoryStatusEventRepository {
    log: Mutex<Log>,
}

impl InMemoryStatusEventRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatusEventRepository for InMemoryStatusEventRepository {
    fn backend(&self) -> Backend {
        Backend::Memory
    }

    async fn create(
        &self,
        bag_identifier: &str,
        status: &str,
        timestamp: DateTime<Utc>,
        note: Option<&str>,
    ) -> Result<()> {
        let status: Status = status.parse()?;

        let mut log = self.log.lock().await;
        let id = log.next_id;
        log.next_id += 1;
        log.events.push(StatusEvent {
            id,
            status,
            bag_identifier: bag_identifier.to_string(),
            timestamp,
            note: note.map(str::to_string),
        });

        debug!(id, bag_identifier, %status, "status event recorded in memory");
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<StatusEvent>> {
        Ok(self.log.lock().await.events.clone())
    }

    async fn get_all_for_bag_identifier(&self, bag_identifier: &str) -> Result<Vec<StatusEvent>> {
        let log = self.log.lock().await;
        Ok(log
            .events
            .iter()
            .filter(|event| event.bag_identifier == bag_identifier)
            .cloned()
            .collect())
    }

    async fn get_latest_event_for_bag(
        &self,
        bag_identifier: &str,
    ) -> Result<Option<StatusEvent>> {
        let log = self.log.lock().await;
        Ok(log
            .events
            .iter()
            .filter(|event| event.bag_identifier == bag_identifier)
            .max_by_key(|event| event.timestamp)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn create_stores_event_with_first_id_zero() {
        let repo = InMemoryStatusEventRepository::new();
        let timestamp = Utc::now();

        repo.create(
            "repository.context-001",
            "bagged",
            timestamp,
            Some("something happening here"),
        )
        .await
        .unwrap();

        let expected = vec![StatusEvent {
            id: 0,
            status: Status::Bagged,
            bag_identifier: "repository.context-001".to_string(),
            timestamp,
            note: Some("something happening here".to_string()),
        }];
        assert_eq!(repo.get_all().await.unwrap(), expected);
    }

    #[tokio::test]
    async fn concurrent_creates_get_distinct_ids() {
        let repo = Arc::new(InMemoryStatusEventRepository::new());

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let repo = Arc::clone(&repo);
                tokio::spawn(async move {
                    repo.create(&format!("bag-{}", i % 3), "copying", Utc::now(), None)
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let mut ids: Vec<i64> = repo.get_all().await.unwrap().iter().map(|e| e.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..20).collect::<Vec<_>>());
    }
}
