//! TOML board file parsing
//!
//! ```toml
//! compatible = "fpc,fpc1020"
//!
//! [lines]
//! "fpc,enable-vdd-ldo" = 20
//! "fpc,enable-vddio-ldo" = 21
//! "fpc,reset-gpio" = 0x0c
//! "fpc,irq-gpio" = 13
//!
//! [pinctrl.states.pmx_fp_active]
//! lines = [13]
//! bias = "pull-down"
//!
//! [timing]
//! reset_low_us = 1500
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use super::{Bias, PinBundle, SensorConfig};
use crate::error::{Error, Result};
use crate::hal::LineId;
use crate::variant::{Settle, SensorVariant};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlBoardFile {
    compatible: String,
    #[serde(default)]
    lines: BTreeMap<String, HexOrInt>,
    #[serde(default)]
    supplies: BTreeMap<String, String>,
    pinctrl: Option<TomlPinctrl>,
    timing: Option<TomlTiming>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlPinctrl {
    active: Option<String>,
    suspend: Option<String>,
    #[serde(default)]
    states: BTreeMap<String, TomlPinBundle>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlPinBundle {
    #[serde(default)]
    lines: Vec<HexOrInt>,
    bias: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlTiming {
    reset_high1_us: Option<u64>,
    reset_low_us: Option<u64>,
    reset_high2_us: Option<u64>,
    reset_settle_ms: Option<u64>,
    wake_hold_ms: Option<u64>,
}

/// A line offset written either as an integer or as a "0x" string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HexOrInt {
    Int(i64),
    Str(String),
}

impl HexOrInt {
    fn resolve(&self, what: &str) -> Result<LineId> {
        match self {
            Self::Int(n) => LineId::try_from(*n)
                .map_err(|_| Error::Config(format!("{}: line {} out of range", what, n))),
            Self::Str(s) => parse_number(s).map_err(|e| Error::Config(format!("{}: {}", what, e))),
        }
    }
}

/// Parse a number that can be hex (0x...) or decimal
fn parse_number(s: &str) -> core::result::Result<u32, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("invalid hex '{}': {}", s, e))
    } else {
        s.parse()
            .map_err(|e| format!("invalid number '{}': {}", s, e))
    }
}

impl SensorConfig {
    /// Load a board configuration from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Parse a board configuration from a TOML string
    ///
    /// The result is validated against the variant's required names.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: TomlBoardFile =
            ::toml::from_str(content).map_err(|e| Error::Config(e.message().to_string()))?;

        let variant = SensorVariant::from_compatible(&file.compatible)?;
        let mut config = SensorConfig::new(variant);

        for (name, value) in &file.lines {
            config.lines.insert(name.clone(), value.resolve(name)?);
        }
        config.supplies = file.supplies;

        if let Some(pinctrl) = file.pinctrl {
            if let Some(active) = pinctrl.active {
                config.pinctrl.active = active;
            }
            if let Some(suspend) = pinctrl.suspend {
                config.pinctrl.suspend = suspend;
            }
            for (name, bundle) in pinctrl.states {
                let lines = bundle
                    .lines
                    .iter()
                    .map(|l| l.resolve(&name))
                    .collect::<Result<Vec<_>>>()?;
                let bias = match bundle.bias.as_deref() {
                    Some(b) => Bias::parse(b)?,
                    None => Bias::AsIs,
                };
                config.pinctrl.states.insert(name, PinBundle { lines, bias });
            }
        }

        if let Some(timing) = file.timing {
            apply_timing(&mut config, &timing)?;
        }

        config.validate()?;
        Ok(config)
    }
}

fn apply_timing(config: &mut SensorConfig, timing: &TomlTiming) -> Result<()> {
    if let Some(us) = timing.reset_high1_us {
        config.timing.high1 = Duration::from_micros(us);
    }
    if let Some(us) = timing.reset_low_us {
        config.timing.low = Duration::from_micros(us);
    }
    match (timing.reset_high2_us, timing.reset_settle_ms) {
        (Some(_), Some(_)) => {
            return Err(Error::Config(
                "reset_high2_us and reset_settle_ms are mutually exclusive".to_string(),
            ))
        }
        (Some(us), None) => config.timing.settle = Settle::Fixed(Duration::from_micros(us)),
        (None, Some(ms)) => {
            config.timing.settle = Settle::Caller {
                default: Duration::from_millis(ms),
            }
        }
        (None, None) => {}
    }
    if let Some(ms) = timing.wake_hold_ms {
        if ms == 0 {
            return Err(Error::Config("wake_hold_ms must be non-zero".to_string()));
        }
        config.wake_hold = Duration::from_millis(ms);
    }
    Ok(())
}
