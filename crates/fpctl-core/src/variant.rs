//! Sensor variant profiles
//!
//! The two supported sensor families differ in resource names, how the power
//! domain is switched and in reset timing. Each is described by a static
//! [`VariantProfile`]; a board file may override the timing.

use std::fmt;
use std::time::Duration;

use crate::error::{Error, Result};

/// FPC1020 reset: first high hold
pub const FPC1020_RESET_HIGH1_US: u64 = 100;
/// FPC1020 reset: low hold
pub const FPC1020_RESET_LOW_US: u64 = 1000;
/// FPC1020 reset: settle after release
pub const FPC1020_RESET_HIGH2_US: u64 = 1250;
/// FPC1020 time-to-wake hold
pub const FPC1020_TTW_HOLD_MS: u64 = 1000;

/// gf3266 reset: low hold
pub const GF3266_RESET_LOW_MS: u64 = 3;
/// gf3266 reset: settle used when the caller does not supply one
pub const GF3266_DEFAULT_SETTLE_MS: u64 = 3;
/// gf3266 time-to-wake hold
pub const GF3266_TTW_HOLD_MS: u64 = 500;

/// Default name of the "active" pin state
pub const PIN_STATE_ACTIVE: &str = "pmx_fp_active";
/// Default name of the "suspend" pin state
pub const PIN_STATE_SUSPEND: &str = "pmx_fp_suspend";

/// How long the reset line stays high after release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settle {
    /// Fixed hold, caller input is ignored
    Fixed(Duration),
    /// Caller supplied, with a fallback
    Caller {
        /// Used when the caller passes `None`
        default: Duration,
    },
}

/// Reset pulse timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetTiming {
    /// Hold after the initial high
    pub high1: Duration,
    /// Hold while asserted low
    pub low: Duration,
    /// Hold after release
    pub settle: Settle,
}

impl ResetTiming {
    /// Resolve the final high hold for a caller request
    pub fn settle_for(&self, requested: Option<Duration>) -> Duration {
        match self.settle {
            Settle::Fixed(hold) => hold,
            Settle::Caller { default } => requested.unwrap_or(default),
        }
    }
}

/// How the sensor's power domain is switched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerScheme {
    /// GPIO-driven LDO enables, switched together in order
    EnableLines(&'static [&'static str]),
    /// A regulated supply, by logical name
    Regulator(&'static str),
}

/// Static description of a sensor family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariantProfile {
    /// Base device name used for identity exposure
    pub dev_name: &'static str,
    /// Logical name of the reset line
    pub reset_line: &'static str,
    /// Logical name of the interrupt line
    pub irq_line: &'static str,
    /// Power domain
    pub power: PowerScheme,
    /// Reset pulse timing
    pub timing: ResetTiming,
    /// Wake assertion window after an interrupt
    pub wake_hold: Duration,
}

const FPC1020_ENABLE_LINES: &[&str] = &["fpc,enable-vdd-ldo", "fpc,enable-vddio-ldo"];

/// Supported sensor families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorVariant {
    /// Fingerprint Cards FPC1020
    Fpc1020,
    /// Goodix gf3266
    Gf3266,
}

impl SensorVariant {
    /// All known variants
    pub const ALL: [SensorVariant; 2] = [SensorVariant::Fpc1020, SensorVariant::Gf3266];

    /// Match a configuration `compatible` string
    pub fn from_compatible(compatible: &str) -> Result<Self> {
        match compatible.trim() {
            "fpc,fpc1020" => Ok(Self::Fpc1020),
            "goodix,fingerprint" | "goodix,gf3266" => Ok(Self::Gf3266),
            other => Err(Error::UnknownVariant(other.to_string())),
        }
    }

    /// Primary compatible string
    pub fn compatible(self) -> &'static str {
        match self {
            Self::Fpc1020 => "fpc,fpc1020",
            Self::Gf3266 => "goodix,fingerprint",
        }
    }

    /// Static profile
    pub fn profile(self) -> VariantProfile {
        match self {
            Self::Fpc1020 => VariantProfile {
                dev_name: "fpc1020",
                reset_line: "fpc,reset-gpio",
                irq_line: "fpc,irq-gpio",
                power: PowerScheme::EnableLines(FPC1020_ENABLE_LINES),
                timing: ResetTiming {
                    high1: Duration::from_micros(FPC1020_RESET_HIGH1_US),
                    low: Duration::from_micros(FPC1020_RESET_LOW_US),
                    settle: Settle::Fixed(Duration::from_micros(FPC1020_RESET_HIGH2_US)),
                },
                wake_hold: Duration::from_millis(FPC1020_TTW_HOLD_MS),
            },
            Self::Gf3266 => VariantProfile {
                dev_name: "goodix_fp",
                reset_line: "fp-gpio-reset",
                irq_line: "fp-gpio-irq",
                power: PowerScheme::Regulator("vdd"),
                timing: ResetTiming {
                    high1: Duration::ZERO,
                    low: Duration::from_millis(GF3266_RESET_LOW_MS),
                    settle: Settle::Caller {
                        default: Duration::from_millis(GF3266_DEFAULT_SETTLE_MS),
                    },
                },
                wake_hold: Duration::from_millis(GF3266_TTW_HOLD_MS),
            },
        }
    }
}

impl fmt::Display for SensorVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fpc1020 => write!(f, "fpc1020"),
            Self::Gf3266 => write!(f, "gf3266"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_compatible() {
        assert_eq!(
            SensorVariant::from_compatible("fpc,fpc1020").unwrap(),
            SensorVariant::Fpc1020
        );
        assert_eq!(
            SensorVariant::from_compatible("goodix,fingerprint").unwrap(),
            SensorVariant::Gf3266
        );
        assert!(matches!(
            SensorVariant::from_compatible("acme,fp"),
            Err(Error::UnknownVariant(_))
        ));
    }

    #[test]
    fn test_settle_resolution() {
        let fpc = SensorVariant::Fpc1020.profile().timing;
        assert_eq!(
            fpc.settle_for(Some(Duration::from_millis(50))),
            Duration::from_micros(FPC1020_RESET_HIGH2_US)
        );

        let gf = SensorVariant::Gf3266.profile().timing;
        assert_eq!(
            gf.settle_for(Some(Duration::from_millis(50))),
            Duration::from_millis(50)
        );
        assert_eq!(gf.settle_for(None), Duration::from_millis(3));
    }

    #[test]
    fn test_power_schemes() {
        match SensorVariant::Fpc1020.profile().power {
            PowerScheme::EnableLines(lines) => assert_eq!(lines.len(), 2),
            other => panic!("unexpected scheme {:?}", other),
        }
        assert_eq!(
            SensorVariant::Gf3266.profile().power,
            PowerScheme::Regulator("vdd")
        );
    }
}
