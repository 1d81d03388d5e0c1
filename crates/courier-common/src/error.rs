//! Error types shared across courier crates

use thiserror::Error;

/// Result type alias for courier operations
pub type Result<T> = std::result::Result<T, CourierError>;

/// Error raised while reading configuration
#[derive(Error, Debug)]
pub enum CourierError {
    #[error("Configuration error: {0}. Check your environment variables or .env file.")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl CourierError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_points_at_environment() {
        let err = CourierError::config("ARCHIVEMATICA_BASE_URL not set");
        assert_eq!(
            err.to_string(),
            "Configuration error: ARCHIVEMATICA_BASE_URL not set. Check your environment variables or .env file."
        );
    }
}
