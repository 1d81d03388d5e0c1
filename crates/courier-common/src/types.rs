//! Package descriptors shared between discovery, ingest and persistence

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder used when the source system offers no richer metadata.
pub const NOT_AVAILABLE: &str = "Not available";

/// A stored package discovered in the preservation-processing system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    /// Opaque package identifier (a UUID string on the remote side)
    pub uuid: String,

    /// Absolute storage path of the package
    pub path: String,

    /// Size in bytes
    pub size: u64,

    /// When the package was stored, if the remote reported it
    pub stored_date: Option<DateTime<Utc>>,
}

/// Descriptive metadata attached to a package handed to the repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub id: String,
    pub title: String,
    pub creator: String,
    pub description: String,
}

/// A package selected for ingest, ready for the bagging pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryPackage {
    /// Path of the package on the remote storage
    pub remote_path: String,

    pub metadata: ObjectMetadata,

    /// Logical name of the source the package came from
    pub context: String,

    pub stored_time: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(context: &str) -> RepositoryPackage {
        RepositoryPackage {
            remote_path: "/storage/0a1b/identifier-one-0a1b".to_string(),
            metadata: ObjectMetadata {
                id: "0a1b".to_string(),
                title: "0a1b / identifier-one".to_string(),
                creator: NOT_AVAILABLE.to_string(),
                description: NOT_AVAILABLE.to_string(),
            },
            context: context.to_string(),
            stored_time: Utc.with_ymd_and_hms(2024, 2, 18, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn repository_packages_compare_by_value() {
        assert_eq!(sample("test"), sample("test"));
        assert_ne!(sample("test"), sample("other"));
    }

    #[test]
    fn repository_package_serializes_stored_time_as_rfc3339() {
        let json = serde_json::to_value(sample("test")).unwrap();
        assert_eq!(json["stored_time"], "2024-02-18T00:00:00Z");
        assert_eq!(json["metadata"]["creator"], NOT_AVAILABLE);
    }
}
