//! Error types for the Linux GPIO platform

use std::path::PathBuf;

use thiserror::Error;

/// Linux GPIO platform specific errors
#[derive(Debug, Error)]
pub enum LinuxGpioError {
    /// GPIO chip device node missing
    #[error("GPIO chip '{0}' does not exist")]
    ChipNotFound(String),

    /// Failed to request a GPIO line
    #[error("Failed to request GPIO line {line}: {source}")]
    LineRequestFailed {
        line: u32,
        #[source]
        source: gpiocdev::Error,
    },

    /// Failed to set GPIO line value
    #[error("Failed to set GPIO line value: {0}")]
    SetValueFailed(#[source] gpiocdev::Error),

    /// Failed to get GPIO line value
    #[error("Failed to get GPIO line value: {0}")]
    GetValueFailed(#[source] gpiocdev::Error),

    /// Failed to reconfigure a GPIO line
    #[error("Failed to reconfigure GPIO line: {0}")]
    ReconfigureFailed(#[source] gpiocdev::Error),

    /// A line was used before being requested
    #[error("GPIO line {0} is not requested")]
    LineNotRequested(u32),

    /// Regulator userspace-consumer attribute could not be accessed
    #[error("Regulator state '{path}': {source}")]
    SupplyAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Wake lock could not be written
    #[error("Wake lock '{path}': {source}")]
    WakeLock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// GPIO chip or device not specified
    #[error("No GPIO chip specified. Use dev=/dev/gpiochipN or gpiochip=N")]
    NoDevice,
}

impl From<LinuxGpioError> for fpctl_core::Error {
    fn from(err: LinuxGpioError) -> Self {
        match err {
            LinuxGpioError::InvalidParameter(msg) => fpctl_core::Error::Config(msg),
            LinuxGpioError::NoDevice | LinuxGpioError::ChipNotFound(_) => {
                fpctl_core::Error::Config(err.to_string())
            }
            other => fpctl_core::Error::backend(other),
        }
    }
}

/// Result type for Linux GPIO platform operations
pub type Result<T> = std::result::Result<T, LinuxGpioError>;
