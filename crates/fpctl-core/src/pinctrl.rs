//! Pin-state controller
//!
//! Resolves the "active" and "suspend" states once and switches between
//! them. Resolution is all or nothing: when either lookup fails both cached
//! states are dropped, so a later [`PinStates::select`] fails with
//! [`Error::InvalidPinState`] instead of applying a half-initialized
//! configuration.

use std::fmt;

use crate::config::PinctrlConfig;
use crate::error::{Error, Result};
use crate::hal::{PinControl, PinStateHandle, PinctrlProvider};

/// Pin-control state of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinState {
    /// Operating configuration
    Active,
    /// Low-power configuration
    Suspend,
    /// No state applied yet
    Uninitialized,
}

impl PinState {
    fn label(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspend => "suspend",
            Self::Uninitialized => "uninitialized",
        }
    }
}

impl fmt::Display for PinState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Cached pin-control handle and resolved states
#[derive(Default)]
pub struct PinStates {
    control: Option<Box<dyn PinControl>>,
    active: Option<PinStateHandle>,
    suspend: Option<PinStateHandle>,
    current: Option<PinState>,
}

impl fmt::Debug for PinStates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinStates")
            .field("bound", &self.control.is_some())
            .field("active", &self.active)
            .field("suspend", &self.suspend)
            .field("current", &self.current())
            .finish()
    }
}

impl PinStates {
    /// Unbound controller
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the consumer's pin-control handle and resolve both states
    pub fn init(
        &mut self,
        provider: &dyn PinctrlProvider,
        consumer: &str,
        config: &PinctrlConfig,
    ) -> Result<()> {
        let control = provider.get(consumer).map_err(|e| {
            log::error!("{}: target does not use pinctrl: {}", consumer, e);
            Error::NoPinControl
        })?;

        let resolved = control.lookup_state(&config.active).and_then(|active| {
            control
                .lookup_state(&config.suspend)
                .map(|suspend| (active, suspend))
        });

        match resolved {
            Ok((active, suspend)) => {
                log::debug!(
                    "{}: pin states '{}' / '{}' resolved",
                    consumer,
                    active.name(),
                    suspend.name()
                );
                self.control = Some(control);
                self.active = Some(active);
                self.suspend = Some(suspend);
                Ok(())
            }
            Err(e) => {
                log::error!("{}: cannot find pin states: {}", consumer, e);
                self.active = None;
                self.suspend = None;
                match e {
                    Error::StateLookupFailed(_) => Err(e),
                    other => Err(Error::StateLookupFailed(other.to_string())),
                }
            }
        }
    }

    /// Whether both states are resolved
    pub fn is_ready(&self) -> bool {
        self.control.is_some() && self.active.is_some() && self.suspend.is_some()
    }

    /// State last applied
    pub fn current(&self) -> PinState {
        self.current.unwrap_or(PinState::Uninitialized)
    }

    /// Apply the active or suspend state
    pub fn select(&mut self, target: PinState) -> Result<()> {
        let handle = match target {
            PinState::Active => self.active.as_ref(),
            PinState::Suspend => self.suspend.as_ref(),
            PinState::Uninitialized => return Err(Error::InvalidPinState(target.label())),
        };
        let (control, handle) = match (self.control.as_ref(), handle) {
            (Some(control), Some(handle)) => (control, handle),
            _ => {
                log::error!("not a valid '{}' pin state", target);
                return Err(Error::InvalidPinState(target.label()));
            }
        };
        if self.current == Some(target) {
            log::warn!("pin state '{}' already selected", handle.name());
            return Err(Error::PinAlreadyInState(target.label()));
        }

        control
            .select_state(handle)
            .map_err(|e| Error::PinSelectFailed {
                state: handle.name().to_string(),
                reason: e.to_string(),
            })?;
        log::debug!("pin state '{}' selected", handle.name());
        self.current = Some(target);
        Ok(())
    }

    /// Park the pins in suspend (best effort) and drop the handle
    ///
    /// Pins that never had a state applied are left alone.
    pub fn release(&mut self) {
        if self.control.is_some() && self.current == Some(PinState::Active) {
            if let Err(e) = self.select(PinState::Suspend) {
                log::warn!("could not park pins in suspend: {}", e);
            }
        }
        self.control = None;
        self.active = None;
        self.suspend = None;
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder {
        known: Vec<&'static str>,
        selected: Arc<Mutex<Vec<String>>>,
        fail_select: bool,
    }

    struct Control {
        known: Vec<&'static str>,
        selected: Arc<Mutex<Vec<String>>>,
        fail_select: bool,
    }

    impl PinctrlProvider for Recorder {
        fn get(&self, _consumer: &str) -> Result<Box<dyn PinControl>> {
            if self.known.is_empty() {
                return Err(Error::NoPinControl);
            }
            Ok(Box::new(Control {
                known: self.known.clone(),
                selected: Arc::clone(&self.selected),
                fail_select: self.fail_select,
            }))
        }
    }

    impl PinControl for Control {
        fn lookup_state(&self, name: &str) -> Result<PinStateHandle> {
            self.known
                .iter()
                .position(|k| *k == name)
                .map(|i| PinStateHandle::new(name, i))
                .ok_or_else(|| Error::StateLookupFailed(name.to_string()))
        }

        fn select_state(&self, state: &PinStateHandle) -> Result<()> {
            if self.fail_select {
                return Err(Error::Unsupported("mux"));
            }
            self.selected.lock().unwrap().push(state.name().to_string());
            Ok(())
        }
    }

    fn both() -> Recorder {
        Recorder {
            known: vec!["pmx_fp_active", "pmx_fp_suspend"],
            ..Default::default()
        }
    }

    #[test]
    fn test_select_and_redundant() {
        let provider = both();
        let mut pins = PinStates::new();
        pins.init(&provider, "fpc1020", &PinctrlConfig::default())
            .unwrap();
        assert!(pins.is_ready());
        assert_eq!(pins.current(), PinState::Uninitialized);

        pins.select(PinState::Active).unwrap();
        assert_eq!(pins.current(), PinState::Active);
        let err = pins.select(PinState::Active).unwrap_err();
        assert!(matches!(err, Error::PinAlreadyInState("active")));

        pins.release();
        assert_eq!(
            *provider.selected.lock().unwrap(),
            vec!["pmx_fp_active", "pmx_fp_suspend"]
        );
        assert_eq!(pins.current(), PinState::Uninitialized);
    }

    #[test]
    fn test_partial_lookup_clears_both() {
        let provider = Recorder {
            known: vec!["pmx_fp_active"],
            ..Default::default()
        };
        let mut pins = PinStates::new();
        let err = pins
            .init(&provider, "fpc1020", &PinctrlConfig::default())
            .unwrap_err();
        assert!(matches!(err, Error::StateLookupFailed(_)));
        assert!(!pins.is_ready());
        assert!(matches!(
            pins.select(PinState::Active),
            Err(Error::InvalidPinState("active"))
        ));
        assert!(provider.selected.lock().unwrap().is_empty());
    }

    #[test]
    fn test_no_pin_control() {
        let mut pins = PinStates::new();
        let err = pins
            .init(&Recorder::default(), "goodix_fp", &PinctrlConfig::default())
            .unwrap_err();
        assert!(matches!(err, Error::NoPinControl));
        assert!(pins.select(PinState::Suspend).is_err());
    }

    #[test]
    fn test_select_failure_keeps_state() {
        let provider = Recorder {
            fail_select: true,
            ..both()
        };
        let mut pins = PinStates::new();
        pins.init(&provider, "fpc1020", &PinctrlConfig::default())
            .unwrap();
        assert!(matches!(
            pins.select(PinState::Active),
            Err(Error::PinSelectFailed { .. })
        ));
        assert_eq!(pins.current(), PinState::Uninitialized);

        pins.release();
        assert!(provider.selected.lock().unwrap().is_empty());
    }

    #[test]
    fn test_release_without_select_leaves_pins() {
        let provider = both();
        let mut pins = PinStates::new();
        pins.init(&provider, "fpc1020", &PinctrlConfig::default())
            .unwrap();
        pins.release();
        assert!(!pins.is_ready());
        assert!(provider.selected.lock().unwrap().is_empty());
    }
}
