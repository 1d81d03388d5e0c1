//! APTrust ingest status lookup

use courier_common::CourierError;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::info;

use crate::client::{api_base, RemoteClient};
use crate::config::{AptrustConfig, RetryConfig};
use crate::error::Result;

pub const SYSTEM_NAME: &str = "APTrust";

const ITEMS_RESOURCE: &str = "items";
const API_USER_HEADER: &str = "x-pharos-api-user";
const API_KEY_HEADER: &str = "x-pharos-api-key";

/// Coarse state of a bag's most recent ingest into APTrust
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    #[serde(rename = "not found")]
    NotFound,
    Failed,
    Cancelled,
    Success,
    Processing,
}

impl IngestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not found",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Success => "success",
            Self::Processing => "processing",
        }
    }

    /// Map the newest work items to a status.
    ///
    /// Only the first item counts. Matching ignores case. A successful item
    /// that has not reached the cleanup stage is still processing, as is any
    /// status not recognised here.
    pub fn from_results(results: &[WorkItem]) -> Self {
        let Some(item) = results.first() else {
            return Self::NotFound;
        };

        let status = item.status.as_deref().unwrap_or_default().to_lowercase();
        let stage = item.stage.as_deref().unwrap_or_default().to_lowercase();

        match (status.as_str(), stage.as_str()) {
            ("failed", _) => Self::Failed,
            ("cancelled", _) => Self::Cancelled,
            ("success", "cleanup") => Self::Success,
            _ => Self::Processing,
        }
    }
}

impl fmt::Display for IngestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fields of an APTrust work item this crate reads
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct WorkItem {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub stage: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ItemsResponse {
    #[serde(default)]
    results: Vec<WorkItem>,
}

/// Client for the APTrust member API
#[derive(Debug)]
pub struct AptrustApi {
    client: RemoteClient,
    object_id_prefix: String,
}

impl AptrustApi {
    pub fn new(client: RemoteClient, object_id_prefix: impl Into<String>) -> Self {
        Self {
            client,
            object_id_prefix: object_id_prefix.into(),
        }
    }

    pub fn from_config(config: &AptrustConfig, retry: &RetryConfig) -> Result<Self> {
        let invalid = |name: &str| {
            CourierError::config(format!("{name} must be plain ASCII without line breaks"))
        };

        let user = HeaderValue::from_str(&config.username).map_err(|_| invalid("APTRUST_USERNAME"))?;
        let mut key = HeaderValue::from_str(&config.api_key).map_err(|_| invalid("APTRUST_API_KEY"))?;
        key.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static(API_USER_HEADER), user);
        headers.insert(HeaderName::from_static(API_KEY_HEADER), key);

        let base_url = api_base(&config.base_url, &config.api_prefix).map_err(|e| {
            CourierError::config(format!("APTRUST_BASE_URL is not a valid URL: {e}"))
        })?;
        let transport = retry.transport(headers)?;

        Ok(Self::new(
            RemoteClient::new(SYSTEM_NAME, base_url, Arc::new(transport), retry.policy()),
            &config.object_id_prefix,
        ))
    }

    /// Status of the most recent ingest of `bag_identifier`
    pub async fn get_ingest_status(&self, bag_identifier: &str) -> Result<IngestStatus> {
        let object_identifier = format!("{}{}", self.object_id_prefix, bag_identifier);
        let query = [
            ("object_identifier", object_identifier.clone()),
            ("action", "Ingest".to_string()),
            ("per_page", "1".to_string()),
            ("sort", "date_processed__desc".to_string()),
        ];

        let response: ItemsResponse = self.client.get(ITEMS_RESOURCE, &query).await?;
        let status = IngestStatus::from_results(&response.results);

        info!(%object_identifier, %status, "Looked up ingest status");
        Ok(status)
    }
}
