//! Raw records returned by the Archivematica storage service

use chrono::{DateTime, NaiveDateTime, Utc};
use courier_common::Package;
use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result};

/// One entry of the storage service's `file/` listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub uuid: String,
    pub current_full_path: String,
    pub size: u64,
    #[serde(default)]
    pub stored_date: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub current_location: Option<String>,
}

/// Parse a stored date.
///
/// The storage service reports naive timestamps such as
/// `2024-01-17T00:00:00.000000`; those are read as UTC. RFC 3339 values with
/// an offset are accepted too.
pub fn parse_stored_date(value: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").map(|ts| ts.and_utc())
        })
}

impl TryFrom<PackageRecord> for Package {
    type Error = IngestError;

    fn try_from(record: PackageRecord) -> Result<Self> {
        let stored_date = match record.stored_date.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(value) => Some(parse_stored_date(value).map_err(|source| {
                IngestError::InvalidStoredDate {
                    uuid: record.uuid.clone(),
                    value: value.to_string(),
                    source,
                }
            })?),
        };

        Ok(Package {
            uuid: record.uuid,
            path: record.current_full_path,
            size: record.size,
            stored_date,
        })
    }
}
