//! Resource acquisition
//!
//! Resolves logical resource names through the board configuration and
//! claims the physical line or supply. Handles are not `Clone`: releasing
//! consumes the handle, so a resource can only be released once and only
//! after it was acquired.

use std::fmt;

use crate::config::SensorConfig;
use crate::error::Result;
use crate::hal::{GpioProvider, Level, LineId, SupplyHandle, SupplyProvider};

/// What a line is used for, which decides its initial direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineRole {
    /// LDO enable, output driven low until the power sequencer switches it
    PowerEnable,
    /// Reset, output idling high
    Reset,
    /// Interrupt, input
    Irq,
}

impl fmt::Display for LineRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PowerEnable => write!(f, "power-enable"),
            Self::Reset => write!(f, "reset"),
            Self::Irq => write!(f, "irq"),
        }
    }
}

/// A claimed and configured line
#[derive(Debug, PartialEq, Eq)]
pub struct LineHandle {
    name: String,
    line: LineId,
    role: LineRole,
}

impl LineHandle {
    /// Logical name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Physical line
    pub fn line(&self) -> LineId {
        self.line
    }

    /// Role the line was configured for
    pub fn role(&self) -> LineRole {
        self.role
    }
}

/// Binds configuration names to provider resources
pub struct Acquirer<'a> {
    config: &'a SensorConfig,
    gpio: &'a dyn GpioProvider,
    supplies: &'a dyn SupplyProvider,
}

impl<'a> Acquirer<'a> {
    /// Create an acquirer over the given providers
    pub fn new(
        config: &'a SensorConfig,
        gpio: &'a dyn GpioProvider,
        supplies: &'a dyn SupplyProvider,
    ) -> Self {
        Self {
            config,
            gpio,
            supplies,
        }
    }

    /// Claim the line named `name` and set its direction for `role`
    pub fn acquire_line(&self, name: &str, role: LineRole) -> Result<LineHandle> {
        let line = self.config.line(name)?;
        self.gpio.request(line, name)?;

        let configured = match role {
            LineRole::PowerEnable => self.gpio.direction_output(line, Level::Low),
            LineRole::Reset => self.gpio.direction_output(line, Level::High),
            LineRole::Irq => self.gpio.direction_input(line),
        };
        if let Err(e) = configured {
            log::error!("{}: failed to configure line {} as {}: {}", name, line, role, e);
            self.gpio.free(line);
            return Err(e);
        }

        log::debug!("{}: line {} bound as {}", name, line, role);
        Ok(LineHandle {
            name: name.to_string(),
            line,
            role,
        })
    }

    /// Release a line returned by [`acquire_line`](Self::acquire_line)
    pub fn release_line(&self, handle: LineHandle) {
        log::debug!("{}: releasing line {}", handle.name, handle.line);
        self.gpio.free(handle.line);
    }

    /// Claim the supply named `name`
    pub fn acquire_supply(&self, name: &str) -> Result<SupplyHandle> {
        let id = self.config.supply(name)?;
        let supply = self.supplies.get(name, id)?;
        log::debug!("{}: supply bound to '{}'", name, id);
        Ok(supply)
    }

    /// Release a supply returned by [`acquire_supply`](Self::acquire_supply)
    pub fn release_supply(&self, supply: SupplyHandle) {
        log::debug!("{}: releasing supply '{}'", supply.name(), supply.id());
        self.supplies.put(supply);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::variant::SensorVariant;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Lines {
        claimed: Mutex<BTreeMap<LineId, Option<Level>>>,
        freed: Mutex<Vec<LineId>>,
        fail_direction: Option<LineId>,
    }

    impl GpioProvider for Lines {
        fn request(&self, line: LineId, label: &str) -> Result<()> {
            let mut claimed = self.claimed.lock().unwrap();
            if claimed.contains_key(&line) {
                return Err(Error::AlreadyInUse {
                    name: label.to_string(),
                });
            }
            claimed.insert(line, None);
            Ok(())
        }

        fn free(&self, line: LineId) {
            self.claimed.lock().unwrap().remove(&line);
            self.freed.lock().unwrap().push(line);
        }

        fn direction_output(&self, line: LineId, level: Level) -> Result<()> {
            if self.fail_direction == Some(line) {
                return Err(Error::LineFailed {
                    line,
                    op: "direction",
                    reason: "injected".into(),
                });
            }
            self.claimed.lock().unwrap().insert(line, Some(level));
            Ok(())
        }

        fn direction_input(&self, _line: LineId) -> Result<()> {
            Ok(())
        }

        fn set_level(&self, line: LineId, level: Level) -> Result<()> {
            self.claimed.lock().unwrap().insert(line, Some(level));
            Ok(())
        }

        fn level(&self, line: LineId) -> Result<Level> {
            Ok(self.claimed.lock().unwrap()[&line].unwrap_or(Level::Low))
        }
    }

    struct NoSupplies;

    impl SupplyProvider for NoSupplies {
        fn get(&self, name: &str, _id: &str) -> Result<SupplyHandle> {
            Err(Error::ClaimFailed {
                name: name.to_string(),
                reason: "none".into(),
            })
        }
        fn put(&self, _supply: SupplyHandle) {}
        fn enable(&self, _supply: &SupplyHandle) -> Result<()> {
            Ok(())
        }
        fn disable(&self, _supply: &SupplyHandle) -> Result<()> {
            Ok(())
        }
    }

    fn config() -> SensorConfig {
        SensorConfig::new(SensorVariant::Fpc1020)
            .with_line("fpc,enable-vdd-ldo", 20)
            .with_line("fpc,reset-gpio", 12)
    }

    #[test]
    fn test_initial_directions() {
        let gpio = Lines::default();
        let config = config();
        let acquirer = Acquirer::new(&config, &gpio, &NoSupplies);

        let reset = acquirer.acquire_line("fpc,reset-gpio", LineRole::Reset).unwrap();
        let enable = acquirer
            .acquire_line("fpc,enable-vdd-ldo", LineRole::PowerEnable)
            .unwrap();
        assert_eq!(reset.line(), 12);
        assert_eq!(gpio.level(12).unwrap(), Level::High);
        assert_eq!(gpio.level(20).unwrap(), Level::Low);

        acquirer.release_line(reset);
        acquirer.release_line(enable);
        assert_eq!(*gpio.freed.lock().unwrap(), vec![12, 20]);
    }

    #[test]
    fn test_missing_and_busy() {
        let gpio = Lines::default();
        let config = config();
        let acquirer = Acquirer::new(&config, &gpio, &NoSupplies);

        let err = acquirer.acquire_line("fpc,irq-gpio", LineRole::Irq).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        assert!(gpio.claimed.lock().unwrap().is_empty());

        let _held = acquirer.acquire_line("fpc,reset-gpio", LineRole::Reset).unwrap();
        let err = acquirer
            .acquire_line("fpc,reset-gpio", LineRole::Reset)
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyInUse { .. }));
    }

    #[test]
    fn test_direction_failure_frees_line() {
        let gpio = Lines {
            fail_direction: Some(12),
            ..Default::default()
        };
        let config = config();
        let acquirer = Acquirer::new(&config, &gpio, &NoSupplies);

        assert!(acquirer
            .acquire_line("fpc,reset-gpio", LineRole::Reset)
            .is_err());
        assert!(gpio.claimed.lock().unwrap().is_empty());
        assert_eq!(*gpio.freed.lock().unwrap(), vec![12]);
    }

    #[test]
    fn test_supply_lookup() {
        let gpio = Lines::default();
        let config = SensorConfig::new(SensorVariant::Gf3266);
        let acquirer = Acquirer::new(&config, &gpio, &NoSupplies);
        assert!(matches!(
            acquirer.acquire_supply("vdd"),
            Err(Error::NotFound { .. })
        ));
    }
}
