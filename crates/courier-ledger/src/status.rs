//! Status vocabulary for bag lifecycle events

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Lifecycle states a bag can be recorded in.
///
/// The ledger checks membership in this vocabulary only. Any status may
/// follow any other for the same bag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Queued,
    Bagging,
    Bagged,
    Copying,
    Copied,
    Validating,
    Validated,
    ValidationFailed,
    Uploading,
    Uploaded,
    Verifying,
    Verified,
    VerifyFailed,
    Deposited,
    Failed,
    Cancelled,
}

impl Status {
    pub const ALL: [Status; 16] = [
        Status::Queued,
        Status::Bagging,
        Status::Bagged,
        Status::Copying,
        Status::Copied,
        Status::Validating,
        Status::Validated,
        Status::ValidationFailed,
        Status::Uploading,
        Status::Uploaded,
        Status::Verifying,
        Status::Verified,
        Status::VerifyFailed,
        Status::Deposited,
        Status::Failed,
        Status::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Queued => "queued",
            Status::Bagging => "bagging",
            Status::Bagged => "bagged",
            Status::Copying => "copying",
            Status::Copied => "copied",
            Status::Validating => "validating",
            Status::Validated => "validated",
            Status::ValidationFailed => "validation_failed",
            Status::Uploading => "uploading",
            Status::Uploaded => "uploaded",
            Status::Verifying => "verifying",
            Status::Verified => "verified",
            Status::VerifyFailed => "verify_failed",
            Status::Deposited => "deposited",
            Status::Failed => "failed",
            Status::Cancelled => "cancelled",
        }
    }

    /// Comma-separated list of every status name
    pub fn vocabulary() -> String {
        Self::ALL
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl std::str::FromStr for Status {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| LedgerError::UnknownStatus(s.to_string()))
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_status_round_trips_through_its_name() {
        for status in Status::ALL {
            assert_eq!(status.as_str().parse::<Status>().unwrap(), status);
        }
    }

    #[test]
    fn parsing_is_case_sensitive() {
        assert!("Bagging".parse::<Status>().is_err());
    }

    #[test]
    fn unknown_status_error_names_the_value() {
        let err = "turned_inside_out".parse::<Status>().unwrap_err();
        assert!(matches!(err, LedgerError::UnknownStatus(ref s) if s == "turned_inside_out"));
        let message = err.to_string();
        assert!(message.starts_with("Unknown status 'turned_inside_out'"), "got: {message}");
        assert!(message.contains("bagging, bagged"));
    }

    #[test]
    fn display_uses_snake_case_names() {
        assert_eq!(Status::ValidationFailed.to_string(), "validation_failed");
        assert_eq!(Status::Cancelled.to_string(), "cancelled");
    }
}
