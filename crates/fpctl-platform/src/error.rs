//! Error types for opening backends

use thiserror::Error;

/// Errors raised while selecting and opening a backend
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Malformed `name:key=value,...` string
    #[error("Invalid backend parameter '{0}' (expected key=value)")]
    InvalidParameter(String),

    /// Backend name not compiled in
    #[error("Unknown backend: {0} (available: {1})")]
    UnknownBackend(String, String),

    /// Backend or lifecycle failure
    #[error(transparent)]
    Sensor(#[from] fpctl_core::Error),
}

impl PlatformError {
    /// Underlying lifecycle error, if any
    pub fn sensor_error(&self) -> Option<&fpctl_core::Error> {
        match self {
            Self::Sensor(err) => Some(err),
            _ => None,
        }
    }
}

/// Result type for backend operations
pub type Result<T> = std::result::Result<T, PlatformError>;
