//! Courier Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging and error handling for the courier workspace.
//!
//! - **Error Handling**: [`CourierError`] and the [`Result`] alias
//! - **Logging**: tracing subscriber setup driven by [`logging::LogConfig`]
//! - **Types**: package descriptors passed from discovery to ingest
//!
//! # Example
//!
//! ```no_run
//! use courier_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     tracing::info!("courier started");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{CourierError, Result};
pub use types::{ObjectMetadata, Package, RepositoryPackage, NOT_AVAILABLE};
