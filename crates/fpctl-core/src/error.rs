//! Error types for fpctl-core
//!
//! Every failure in the core maps onto one [`ErrorKind`] of the taxonomy
//! below. Only attach-time fatal kinds trigger a teardown; redundant
//! transitions and bad attribute input are reported to the caller and leave
//! device state untouched.

use thiserror::Error;

use crate::hal::LineId;

/// Error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Named resource missing or malformed in configuration
    ConfigurationError,
    /// Underlying line or supply busy, or the claim was rejected
    ResourceUnavailable,
    /// Pin-control capability or a named pin state is missing
    PinControlUnavailable,
    /// Power or pin-state change requested when already in that state
    RedundantStateTransition,
    /// No free identity slot
    IdentityPoolExhausted,
    /// Malformed write to an attribute
    InvalidAttributeInput,
    /// A provider failed while operating an already claimed resource
    HardwareFailure,
    /// Operation not allowed in the device's current power or pin state
    InvalidState,
}

impl ErrorKind {
    /// Whether this kind aborts an attach attempt
    pub fn is_fatal(self) -> bool {
        !matches!(
            self,
            Self::RedundantStateTransition | Self::InvalidAttributeInput | Self::InvalidState
        )
    }
}

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be read or parsed
    #[error("configuration error: {0}")]
    Config(String),

    /// A logical resource name has no entry in the configuration
    #[error("resource '{name}' not found in configuration")]
    NotFound {
        /// Logical resource name
        name: String,
    },

    /// The compatible string does not name a known sensor variant
    #[error("unknown sensor variant '{0}'")]
    UnknownVariant(String),

    /// The platform lacks a capability the variant needs
    #[error("platform does not support {0}")]
    Unsupported(&'static str),

    /// The line or supply is already claimed by another consumer
    #[error("resource '{name}' already in use")]
    AlreadyInUse {
        /// Logical resource name
        name: String,
    },

    /// Claiming a resource failed for another reason
    #[error("failed to claim '{name}': {reason}")]
    ClaimFailed {
        /// Logical resource name
        name: String,
        /// Provider supplied reason
        reason: String,
    },

    /// A line operation failed on a claimed line
    #[error("line {line}: {op} failed: {reason}")]
    LineFailed {
        /// Physical line
        line: LineId,
        /// Operation that failed
        op: &'static str,
        /// Provider supplied reason
        reason: String,
    },

    /// The host has no pin-control handle for this device
    #[error("target does not use pin control")]
    NoPinControl,

    /// A named pin state could not be resolved
    #[error("cannot look up pin state '{0}'")]
    StateLookupFailed(String),

    /// Selecting a state that was never resolved
    #[error("not a valid '{0}' pin state")]
    InvalidPinState(&'static str),

    /// The provider refused to apply a resolved pin state
    #[error("cannot set '{state}' pins: {reason}")]
    PinSelectFailed {
        /// Requested state name
        state: String,
        /// Provider supplied reason
        reason: String,
    },

    /// Power already in the requested state
    #[error("power double {}", enable_word(.0))]
    PowerAlreadyInState(bool),

    /// Pin state already applied
    #[error("pin state '{0}' already selected")]
    PinAlreadyInState(&'static str),

    /// Runtime operation refused in the current device state
    #[error("cannot {op}: {reason}")]
    NotReady {
        /// Refused operation
        op: &'static str,
        /// Missing precondition
        reason: &'static str,
    },

    /// Enabling or disabling the power domain failed
    #[error("power {} failed: {reason}", enable_word(.on))]
    PowerFailed {
        /// Requested power state
        on: bool,
        /// Provider supplied reason
        reason: String,
    },

    /// Identity pool is full
    #[error("no minor number available (pool of {capacity})")]
    IdentityPoolExhausted {
        /// Pool capacity
        capacity: usize,
    },

    /// An attribute write did not match an accepted token
    #[error("invalid input for attribute '{attr}'")]
    InvalidAttributeInput {
        /// Attribute name
        attr: &'static str,
    },

    /// Unknown attribute name or unsupported access mode
    #[error("attribute '{0}' does not support this access")]
    AttributeAccess(String),

    /// Registering the interrupt handler failed
    #[error("could not request irq on line {line}: {reason}")]
    IrqRequestFailed {
        /// Interrupt line
        line: LineId,
        /// Provider supplied reason
        reason: String,
    },

    /// Exposing the device to observers failed
    #[error("could not publish '{device}': {reason}")]
    PublishFailed {
        /// Device name
        device: String,
        /// Provider supplied reason
        reason: String,
    },

    /// Backend specific error
    #[error("backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Map onto the taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) | Self::NotFound { .. } | Self::UnknownVariant(_) => {
                ErrorKind::ConfigurationError
            }
            Self::Unsupported(_) => ErrorKind::ConfigurationError,
            Self::AlreadyInUse { .. } | Self::ClaimFailed { .. } => ErrorKind::ResourceUnavailable,
            Self::NoPinControl | Self::StateLookupFailed(_) | Self::InvalidPinState(_) => {
                ErrorKind::PinControlUnavailable
            }
            Self::PowerAlreadyInState(_) | Self::PinAlreadyInState(_) => {
                ErrorKind::RedundantStateTransition
            }
            Self::NotReady { .. } => ErrorKind::InvalidState,
            Self::IdentityPoolExhausted { .. } => ErrorKind::IdentityPoolExhausted,
            Self::InvalidAttributeInput { .. } | Self::AttributeAccess(_) => {
                ErrorKind::InvalidAttributeInput
            }
            Self::LineFailed { .. }
            | Self::PinSelectFailed { .. }
            | Self::PowerFailed { .. }
            | Self::IrqRequestFailed { .. }
            | Self::PublishFailed { .. }
            | Self::Backend(_) => ErrorKind::HardwareFailure,
        }
    }

    /// Whether this error aborts an attach attempt
    pub fn is_fatal(&self) -> bool {
        self.kind().is_fatal()
    }

    /// Wrap a backend error
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend(Box::new(err))
    }
}

fn enable_word(on: &bool) -> &'static str {
    if *on {
        "enable"
    } else {
        "disable"
    }
}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            Error::NotFound {
                name: "fpc,reset-gpio".into()
            }
            .kind(),
            ErrorKind::ConfigurationError
        );
        assert_eq!(
            Error::PowerAlreadyInState(true).kind(),
            ErrorKind::RedundantStateTransition
        );
        assert_eq!(
            Error::IdentityPoolExhausted { capacity: 32 }.kind(),
            ErrorKind::IdentityPoolExhausted
        );
        assert_eq!(
            Error::StateLookupFailed("pmx_fp_active".into()).kind(),
            ErrorKind::PinControlUnavailable
        );
    }

    #[test]
    fn test_non_fatal_kinds() {
        assert!(!Error::PowerAlreadyInState(false).is_fatal());
        assert!(!Error::InvalidAttributeInput {
            attr: "wakeup_enable"
        }
        .is_fatal());
        assert!(!Error::NotReady {
            op: "reset",
            reason: "power is off"
        }
        .is_fatal());
        assert!(Error::AlreadyInUse { name: "x".into() }.is_fatal());
    }

    #[test]
    fn test_power_messages() {
        assert_eq!(
            Error::PowerAlreadyInState(true).to_string(),
            "power double enable"
        );
        assert_eq!(
            Error::PowerFailed {
                on: false,
                reason: "busy".into()
            }
            .to_string(),
            "power disable failed: busy"
        );
    }
}
