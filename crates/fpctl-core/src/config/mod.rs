//! Board configuration
//!
//! A board configuration plays the role of the platform's static hardware
//! description: it maps the logical resource names a sensor variant asks for
//! onto physical line offsets and supply identifiers. It is usually loaded
//! from a TOML board file, see [`SensorConfig::from_toml_str`].
//!
//! ```ignore
//! let config = SensorConfig::from_toml_file("board.toml")?;
//! let reset = config.line(config.profile().reset_line)?;
//! ```

mod toml;

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::hal::LineId;
use crate::variant::{
    PowerScheme, ResetTiming, SensorVariant, VariantProfile, PIN_STATE_ACTIVE, PIN_STATE_SUSPEND,
};

/// Line bias applied by an emulated pin state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Bias {
    /// Leave the line as is
    #[default]
    AsIs,
    /// No bias
    Disabled,
    /// Pull up
    PullUp,
    /// Pull down
    PullDown,
}

impl Bias {
    /// Parse a bias name as written in the board file
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim() {
            "as-is" => Ok(Self::AsIs),
            "disabled" | "none" => Ok(Self::Disabled),
            "pull-up" => Ok(Self::PullUp),
            "pull-down" => Ok(Self::PullDown),
            other => Err(Error::Config(format!("unknown bias '{}'", other))),
        }
    }
}

impl fmt::Display for Bias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AsIs => "as-is",
            Self::Disabled => "disabled",
            Self::PullUp => "pull-up",
            Self::PullDown => "pull-down",
        };
        write!(f, "{}", s)
    }
}

/// Electrical bundle behind a named pin state
///
/// Only backends that emulate pin control (no pinmux hardware of their own)
/// look at these.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PinBundle {
    /// Lines the state applies to
    pub lines: Vec<LineId>,
    /// Bias to apply
    pub bias: Bias,
}

/// Pin-control section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinctrlConfig {
    /// Name of the "active" state
    pub active: String,
    /// Name of the "suspend" state
    pub suspend: String,
    /// Bundle definitions by state name
    pub states: BTreeMap<String, PinBundle>,
}

impl Default for PinctrlConfig {
    fn default() -> Self {
        Self {
            active: PIN_STATE_ACTIVE.to_string(),
            suspend: PIN_STATE_SUSPEND.to_string(),
            states: BTreeMap::new(),
        }
    }
}

/// Resolved board configuration for one sensor instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorConfig {
    /// Sensor family
    pub variant: SensorVariant,
    /// Logical line name to physical offset
    pub lines: BTreeMap<String, LineId>,
    /// Logical supply name to provider identifier
    pub supplies: BTreeMap<String, String>,
    /// Pin-control state names and bundles
    pub pinctrl: PinctrlConfig,
    /// Reset timing, variant defaults unless overridden
    pub timing: ResetTiming,
    /// Wake assertion window, variant default unless overridden
    pub wake_hold: Duration,
}

impl SensorConfig {
    /// Empty configuration with the variant's default timing
    pub fn new(variant: SensorVariant) -> Self {
        let profile = variant.profile();
        Self {
            variant,
            lines: BTreeMap::new(),
            supplies: BTreeMap::new(),
            pinctrl: PinctrlConfig::default(),
            timing: profile.timing,
            wake_hold: profile.wake_hold,
        }
    }

    /// Add a line mapping
    pub fn with_line(mut self, name: impl Into<String>, line: LineId) -> Self {
        self.lines.insert(name.into(), line);
        self
    }

    /// Add a supply mapping
    pub fn with_supply(mut self, name: impl Into<String>, id: impl Into<String>) -> Self {
        self.supplies.insert(name.into(), id.into());
        self
    }

    /// Define the bundle behind a pin state
    pub fn with_pin_state(mut self, name: impl Into<String>, bundle: PinBundle) -> Self {
        self.pinctrl.states.insert(name.into(), bundle);
        self
    }

    /// Override the reset timing
    pub fn with_timing(mut self, timing: ResetTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Static profile of the configured variant
    pub fn profile(&self) -> VariantProfile {
        self.variant.profile()
    }

    /// Look up a line by logical name
    pub fn line(&self, name: &str) -> Result<LineId> {
        self.lines.get(name).copied().ok_or_else(|| Error::NotFound {
            name: name.to_string(),
        })
    }

    /// Look up a supply identifier by logical name
    pub fn supply(&self, name: &str) -> Result<&str> {
        self.supplies
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| Error::NotFound {
                name: name.to_string(),
            })
    }

    /// Logical line names the variant needs, in acquisition order
    pub fn required_lines(&self) -> Vec<&'static str> {
        let profile = self.profile();
        let mut names = Vec::new();
        if let PowerScheme::EnableLines(enables) = profile.power {
            names.extend_from_slice(enables);
        }
        names.push(profile.reset_line);
        names.push(profile.irq_line);
        names
    }

    /// Logical supply names the variant needs
    pub fn required_supplies(&self) -> Vec<&'static str> {
        match self.profile().power {
            PowerScheme::Regulator(name) => vec![name],
            PowerScheme::EnableLines(_) => Vec::new(),
        }
    }

    /// Check that every required name resolves and no line is mapped twice
    pub fn validate(&self) -> Result<()> {
        let mut seen: BTreeMap<LineId, &str> = BTreeMap::new();
        for name in self.required_lines() {
            let line = self.line(name)?;
            if let Some(other) = seen.insert(line, name) {
                return Err(Error::Config(format!(
                    "line {} mapped to both '{}' and '{}'",
                    line, other, name
                )));
            }
        }
        for name in self.required_supplies() {
            self.supply(name)?;
        }
        if self.pinctrl.active == self.pinctrl.suspend {
            return Err(Error::Config(format!(
                "pin states must differ, both are '{}'",
                self.pinctrl.active
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fpc_config() -> SensorConfig {
        SensorConfig::new(SensorVariant::Fpc1020)
            .with_line("fpc,enable-vdd-ldo", 20)
            .with_line("fpc,enable-vddio-ldo", 21)
            .with_line("fpc,reset-gpio", 12)
            .with_line("fpc,irq-gpio", 13)
    }

    #[test]
    fn test_required_lines_order() {
        assert_eq!(
            fpc_config().required_lines(),
            vec![
                "fpc,enable-vdd-ldo",
                "fpc,enable-vddio-ldo",
                "fpc,reset-gpio",
                "fpc,irq-gpio"
            ]
        );
        assert_eq!(
            SensorConfig::new(SensorVariant::Gf3266).required_lines(),
            vec!["fp-gpio-reset", "fp-gpio-irq"]
        );
    }

    #[test]
    fn test_validate() {
        assert!(fpc_config().validate().is_ok());

        let missing = SensorConfig::new(SensorVariant::Fpc1020).with_line("fpc,reset-gpio", 12);
        assert!(matches!(missing.validate(), Err(Error::NotFound { .. })));

        let duplicate = fpc_config().with_line("fpc,irq-gpio", 12);
        assert!(matches!(duplicate.validate(), Err(Error::Config(_))));

        let no_supply = SensorConfig::new(SensorVariant::Gf3266)
            .with_line("fp-gpio-reset", 1)
            .with_line("fp-gpio-irq", 2);
        assert!(matches!(no_supply.validate(), Err(Error::NotFound { .. })));
        assert!(no_supply.with_supply("vdd", "fp_vdd").validate().is_ok());
    }

    #[test]
    fn test_bias_parse() {
        assert_eq!(Bias::parse("pull-down").unwrap(), Bias::PullDown);
        assert_eq!(Bias::parse("none").unwrap(), Bias::Disabled);
        assert!(Bias::parse("sideways").is_err());
    }
}
