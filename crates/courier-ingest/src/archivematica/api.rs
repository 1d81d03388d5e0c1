use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use courier_common::{CourierError, Package};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use std::sync::Arc;
use tracing::info;

use super::types::PackageRecord;
use super::PackageSource;
use crate::client::{api_base, RemoteClient};
use crate::config::{ArchivematicaConfig, RetryConfig};
use crate::error::Result;

pub const SYSTEM_NAME: &str = "Archivematica";

const FILE_RESOURCE: &str = "file/";

/// Client for the Archivematica storage service API
#[derive(Debug)]
pub struct ArchivematicaApi {
    client: RemoteClient,
    page_size: u32,
}

impl ArchivematicaApi {
    pub fn new(client: RemoteClient, page_size: u32) -> Self {
        Self { client, page_size }
    }

    /// Build a client authenticating with `ApiKey <username>:<api_key>`
    pub fn from_config(config: &ArchivematicaConfig, retry: &RetryConfig) -> Result<Self> {
        let mut auth = HeaderValue::from_str(&format!(
            "ApiKey {}:{}",
            config.username, config.api_key
        ))
        .map_err(|_| {
            CourierError::config(
                "ARCHIVEMATICA_USERNAME and ARCHIVEMATICA_API_KEY must be plain ASCII",
            )
        })?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let base_url = api_base(&config.base_url, &config.api_prefix).map_err(|e| {
            CourierError::config(format!("ARCHIVEMATICA_BASE_URL is not a valid URL: {e}"))
        })?;
        let transport = retry.transport(headers)?;

        Ok(Self::new(
            RemoteClient::new(SYSTEM_NAME, base_url, Arc::new(transport), retry.policy()),
            config.page_size,
        ))
    }

    pub fn client(&self) -> &RemoteClient {
        &self.client
    }
}

#[async_trait]
impl PackageSource for ArchivematicaApi {
    async fn get_packages(
        &self,
        location_uuid: &str,
        stored_date: Option<DateTime<Utc>>,
    ) -> Result<Vec<Package>> {
        let mut query = vec![
            ("current_location", location_uuid.to_string()),
            ("limit", self.page_size.to_string()),
        ];
        if let Some(floor) = stored_date {
            query.push((
                "stored_date__gt",
                floor.to_rfc3339_opts(SecondsFormat::Secs, true),
            ));
        }

        let records: Vec<PackageRecord> = self.client.fetch_all(FILE_RESOURCE, &query).await?;
        info!(
            location_uuid,
            stored_date = ?stored_date,
            count = records.len(),
            "Discovered stored packages"
        );

        records.into_iter().map(Package::try_from).collect()
    }
}
