//! Power sequencer
//!
//! A sensor's power domain is either a set of GPIO-driven LDO enables or a
//! regulated supply. Repeated identical requests are rejected before any
//! hardware is touched, and the recorded state only changes when the whole
//! transition succeeded.

use crate::error::{Error, Result};
use crate::hal::{GpioProvider, Level, LineId, SupplyHandle, SupplyProvider};

/// How the domain is switched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PowerDomain {
    /// Enable lines, driven high in order on power-up and low in reverse
    /// order on power-down
    Lines(Vec<LineId>),
    /// Regulated supply
    Supply(SupplyHandle),
}

/// Power state tracker for one device
#[derive(Debug)]
pub struct PowerSequencer {
    label: String,
    domain: PowerDomain,
    on: bool,
}

impl PowerSequencer {
    /// New sequencer, domain assumed off
    pub fn new(label: impl Into<String>, domain: PowerDomain) -> Self {
        Self {
            label: label.into(),
            domain,
            on: false,
        }
    }

    /// Recorded power state
    pub fn is_on(&self) -> bool {
        self.on
    }

    /// Domain this sequencer switches
    pub fn domain(&self) -> &PowerDomain {
        &self.domain
    }

    /// Switch the domain on or off
    pub fn set_power(
        &mut self,
        gpio: &dyn GpioProvider,
        supplies: &dyn SupplyProvider,
        on: bool,
    ) -> Result<()> {
        if on == self.on {
            log::error!(
                "{}: power double {}",
                self.label,
                if on { "enable" } else { "disable" }
            );
            return Err(Error::PowerAlreadyInState(on));
        }

        let switched = match &self.domain {
            PowerDomain::Lines(lines) => switch_lines(gpio, lines, on),
            PowerDomain::Supply(supply) if on => supplies.enable(supply),
            PowerDomain::Supply(supply) => supplies.disable(supply),
        };
        switched.map_err(|e| {
            log::error!("{}: power {} failed: {}", self.label, on_off(on), e);
            Error::PowerFailed {
                on,
                reason: e.to_string(),
            }
        })?;

        self.on = on;
        log::info!("{}: power {}", self.label, on_off(on));
        Ok(())
    }
}

fn on_off(on: bool) -> &'static str {
    if on {
        "on"
    } else {
        "off"
    }
}

fn switch_lines(gpio: &dyn GpioProvider, lines: &[LineId], on: bool) -> Result<()> {
    let order: Vec<LineId> = if on {
        lines.to_vec()
    } else {
        lines.iter().rev().copied().collect()
    };
    let level = Level::from(on);

    for (i, line) in order.iter().enumerate() {
        if let Err(e) = gpio.set_level(*line, level) {
            for done in order[..i].iter().rev() {
                if let Err(e) = gpio.set_level(*done, Level::from(!on)) {
                    log::warn!("line {}: rollback failed: {}", done, e);
                }
            }
            return Err(e);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Journal {
        writes: Mutex<Vec<(LineId, Level)>>,
        fail_on: Option<LineId>,
        supply_calls: Mutex<Vec<&'static str>>,
    }

    impl GpioProvider for Journal {
        fn request(&self, _line: LineId, _label: &str) -> Result<()> {
            Ok(())
        }
        fn free(&self, _line: LineId) {}
        fn direction_output(&self, _line: LineId, _level: Level) -> Result<()> {
            Ok(())
        }
        fn direction_input(&self, _line: LineId) -> Result<()> {
            Ok(())
        }
        fn set_level(&self, line: LineId, level: Level) -> Result<()> {
            if self.fail_on == Some(line) && level == Level::High {
                return Err(Error::LineFailed {
                    line,
                    op: "set",
                    reason: "injected".into(),
                });
            }
            self.writes.lock().unwrap().push((line, level));
            Ok(())
        }
        fn level(&self, line: LineId) -> Result<Level> {
            let writes = self.writes.lock().unwrap();
            let last: HashMap<LineId, Level> = writes.iter().copied().collect();
            Ok(last.get(&line).copied().unwrap_or(Level::Low))
        }
    }

    impl SupplyProvider for Journal {
        fn get(&self, name: &str, id: &str) -> Result<SupplyHandle> {
            Ok(SupplyHandle::new(name, id))
        }
        fn put(&self, _supply: SupplyHandle) {}
        fn enable(&self, _supply: &SupplyHandle) -> Result<()> {
            self.supply_calls.lock().unwrap().push("enable");
            Ok(())
        }
        fn disable(&self, _supply: &SupplyHandle) -> Result<()> {
            self.supply_calls.lock().unwrap().push("disable");
            Ok(())
        }
    }

    #[test]
    fn test_double_power_rejected() {
        let hw = Journal::default();
        let mut power = PowerSequencer::new("fpc1020", PowerDomain::Lines(vec![20, 21]));

        power.set_power(&hw, &hw, true).unwrap();
        let err = power.set_power(&hw, &hw, true).unwrap_err();
        assert!(matches!(err, Error::PowerAlreadyInState(true)));
        assert!(power.is_on());
        assert_eq!(hw.writes.lock().unwrap().len(), 2);

        power.set_power(&hw, &hw, false).unwrap();
        assert!(power.set_power(&hw, &hw, false).is_err());
        assert!(!power.is_on());
        assert_eq!(
            *hw.writes.lock().unwrap(),
            vec![
                (20, Level::High),
                (21, Level::High),
                (21, Level::Low),
                (20, Level::Low)
            ]
        );
    }

    #[test]
    fn test_partial_failure_rolls_back() {
        let hw = Journal {
            fail_on: Some(21),
            ..Default::default()
        };
        let mut power = PowerSequencer::new("fpc1020", PowerDomain::Lines(vec![20, 21]));

        assert!(matches!(
            power.set_power(&hw, &hw, true),
            Err(Error::PowerFailed { on: true, .. })
        ));
        assert!(!power.is_on());
        assert_eq!(hw.level(20).unwrap(), Level::Low);
    }

    #[test]
    fn test_regulator_domain() {
        let hw = Journal::default();
        let mut power = PowerSequencer::new(
            "goodix_fp",
            PowerDomain::Supply(SupplyHandle::new("vdd", "fp_vdd")),
        );
        power.set_power(&hw, &hw, true).unwrap();
        assert!(power.set_power(&hw, &hw, true).is_err());
        power.set_power(&hw, &hw, false).unwrap();
        assert_eq!(*hw.supply_calls.lock().unwrap(), vec!["enable", "disable"]);
    }
}
