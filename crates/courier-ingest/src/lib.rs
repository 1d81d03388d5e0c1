//! Courier Ingest
//!
//! Finds preserved packages ready for repository ingest and checks how their
//! deposits went.
//!
//! - [`client`]: paginated remote API client with retry and error translation
//! - [`archivematica`]: package discovery and the size-limited ingest filter
//! - [`aptrust`]: ingest status lookup in the destination repository
//! - [`config`]: environment-driven settings

pub mod aptrust;
pub mod archivematica;
pub mod client;
pub mod config;
pub mod error;
pub mod transport;

pub use aptrust::{AptrustApi, IngestStatus};
pub use archivematica::{ArchivematicaApi, ArchivematicaService, PackageSource};
pub use client::{Pages, RemoteClient};
pub use error::{IngestError, RemoteApiError, Result, TransportError};
pub use transport::{ReqwestTransport, RetryPolicy, Transport};
