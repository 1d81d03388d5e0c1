//! Error types for remote access and ingest selection

use courier_common::CourierError;
use std::fmt;
use thiserror::Error;

/// Result type alias for ingest operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Failure of one HTTP attempt.
///
/// Only the remote client sees these; callers get a [`RemoteApiError`].
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Could not parse response body: {0}")]
    Decode(String),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl TransportError {
    /// Timeouts and dropped connections are worth another attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Connection(_))
    }

    /// Cause name reported in [`RemoteApiError`]
    pub fn cause_name(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "TimeoutError",
            Self::Connection(_) => "ConnectionFailed",
            Self::Status { status, .. } => status_cause_name(*status),
            Self::Request(_) => "RequestError",
            Self::Decode(_) => "ParsingError",
            Self::Url(_) => "InvalidUrl",
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Status { body, .. } => Some(body),
            _ => None,
        }
    }
}

fn status_cause_name(status: u16) -> &'static str {
    match status {
        400 => "BadRequestError",
        401 => "UnauthorizedError",
        403 => "ForbiddenError",
        404 => "ResourceNotFound",
        407 => "ProxyAuthError",
        408 => "RequestTimeoutError",
        409 => "ConflictError",
        422 => "UnprocessableEntityError",
        429 => "TooManyRequestsError",
        400..=499 => "ClientError",
        500..=599 => "ServerError",
        _ => "HttpError",
    }
}

/// Renders `none` for a missing value
struct OrNone<'a, T>(Option<&'a T>);

impl<T: fmt::Display> fmt::Display for OrNone<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(value) => value.fmt(f),
            None => f.write_str("none"),
        }
    }
}

/// The single error a remote API client surfaces.
///
/// Every lower-level failure is folded into this shape once retries are
/// exhausted, so callers never branch on transport details.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "Error occurred while interacting with {system} API. Error type: {cause}; status code: {code}; body: {text}",
    code = OrNone(.status.as_ref()),
    text = OrNone(.body.as_ref())
)]
pub struct RemoteApiError {
    /// Display name of the remote system, e.g. "Archivematica"
    pub system: String,
    pub cause: String,
    pub status: Option<u16>,
    pub body: Option<String>,
}

/// Cause reported when a list endpoint's `next` cursor revisits a page
pub const PAGINATION_LOOP: &str = "PaginationLoop";

impl RemoteApiError {
    /// Failure with no HTTP status or body attached
    pub fn new(system: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            cause: cause.into(),
            status: None,
            body: None,
        }
    }

    pub fn from_transport(system: impl Into<String>, err: &TransportError) -> Self {
        Self {
            system: system.into(),
            cause: err.cause_name().to_string(),
            status: err.status(),
            body: err.body().map(str::to_string),
        }
    }
}

/// Errors from package discovery and ingest selection
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Remote(#[from] RemoteApiError),

    #[error("Package {uuid} has no stored date")]
    MissingStoredDate { uuid: String },

    #[error("Package {uuid} has an unreadable stored date '{value}'")]
    InvalidStoredDate {
        uuid: String,
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error(transparent)]
    Config(#[from] CourierError),
}
