//! Attribute surface
//!
//! Two attributes are exposed per device:
//!
//! | name | mode | semantics |
//! |------|------|-----------|
//! | `wakeup_enable` | write | `enable` / `disable` the wake-on-interrupt policy |
//! | `irq` | read/write | read: instantaneous IRQ line level; write: latency probe, no effect |
//!
//! Observers wait for change notifications on `irq`, one per hardware edge.
//! [`AttributeBoard`] is the in-process [`AttributeHost`] used by both
//! backends: it keeps a generation counter per attribute and lets observers
//! block until it moves.

use std::collections::HashMap;
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::hal::AttributeHost;

/// Name of the wake policy attribute
pub const ATTR_WAKEUP_ENABLE: &str = "wakeup_enable";
/// Name of the interrupt attribute
pub const ATTR_IRQ: &str = "irq";

/// Access mode of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrMode {
    /// Readable only
    ReadOnly,
    /// Writable only
    WriteOnly,
    /// Readable and writable
    ReadWrite,
}

impl AttrMode {
    /// Reads allowed
    pub fn readable(self) -> bool {
        matches!(self, Self::ReadOnly | Self::ReadWrite)
    }

    /// Writes allowed
    pub fn writable(self) -> bool {
        matches!(self, Self::WriteOnly | Self::ReadWrite)
    }
}

/// Attribute descriptor handed to the [`AttributeHost`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttrSpec {
    /// Attribute name
    pub name: &'static str,
    /// Access mode
    pub mode: AttrMode,
}

/// Attributes of a sensor device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    /// `wakeup_enable`
    WakeupEnable,
    /// `irq`
    Irq,
}

impl Attribute {
    /// All sensor attributes
    pub const ALL: [Attribute; 2] = [Attribute::WakeupEnable, Attribute::Irq];

    /// Resolve by name
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            ATTR_WAKEUP_ENABLE => Ok(Self::WakeupEnable),
            ATTR_IRQ => Ok(Self::Irq),
            other => Err(Error::AttributeAccess(other.to_string())),
        }
    }

    /// Descriptor
    pub fn spec(self) -> AttrSpec {
        match self {
            Self::WakeupEnable => AttrSpec {
                name: ATTR_WAKEUP_ENABLE,
                mode: AttrMode::WriteOnly,
            },
            Self::Irq => AttrSpec {
                name: ATTR_IRQ,
                mode: AttrMode::ReadWrite,
            },
        }
    }

    /// Name
    pub fn name(self) -> &'static str {
        self.spec().name
    }
}

/// Descriptors of every sensor attribute
pub fn sensor_attributes() -> Vec<AttrSpec> {
    Attribute::ALL.iter().map(|a| a.spec()).collect()
}

/// Accepted `wakeup_enable` tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeupCommand {
    /// Allow interrupts to hold the host awake
    Enable,
    /// Do not hold the host awake
    Disable,
}

impl WakeupCommand {
    /// Parse a raw attribute write
    ///
    /// The token must match exactly; trailing whitespace and NULs (as left
    /// by `echo`) are ignored.
    pub fn parse(input: &[u8]) -> Result<Self> {
        let end = input
            .iter()
            .rposition(|b| !b.is_ascii_whitespace() && *b != 0)
            .map_or(0, |i| i + 1);
        match &input[..end] {
            b"enable" => Ok(Self::Enable),
            b"disable" => Ok(Self::Disable),
            _ => Err(Error::InvalidAttributeInput {
                attr: ATTR_WAKEUP_ENABLE,
            }),
        }
    }

    /// Resulting policy value
    pub fn enabled(self) -> bool {
        matches!(self, Self::Enable)
    }
}

#[derive(Debug, Default)]
struct Published {
    specs: Vec<AttrSpec>,
    generations: HashMap<&'static str, u64>,
}

/// In-process attribute host with blocking change notification
#[derive(Debug, Default)]
pub struct AttributeBoard {
    devices: Mutex<HashMap<String, Published>>,
    changed: Condvar,
}

impl AttributeBoard {
    /// Create an empty board
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of published devices
    pub fn devices(&self) -> Vec<String> {
        let devices = self.devices.lock().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = devices.keys().cloned().collect();
        names.sort();
        names
    }

    /// Attributes published for a device
    pub fn attributes(&self, device: &str) -> Option<Vec<AttrSpec>> {
        let devices = self.devices.lock().unwrap_or_else(PoisonError::into_inner);
        devices.get(device).map(|p| p.specs.clone())
    }

    /// Current notification count of an attribute
    pub fn generation(&self, device: &str, attr: &str) -> Option<u64> {
        let devices = self.devices.lock().unwrap_or_else(PoisonError::into_inner);
        devices
            .get(device)
            .and_then(|p| p.generations.get(attr).copied())
    }

    /// Block until the attribute's generation differs from `seen`
    ///
    /// Returns the new generation, or `None` on timeout or when the device
    /// is withdrawn.
    pub fn wait_for_change(
        &self,
        device: &str,
        attr: &str,
        seen: u64,
        timeout: Duration,
    ) -> Option<u64> {
        let deadline = Instant::now() + timeout;
        let mut devices = self.devices.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            let current = devices
                .get(device)
                .and_then(|p| p.generations.get(attr).copied())?;
            if current != seen {
                return Some(current);
            }
            let remaining = deadline.checked_duration_since(Instant::now())?;
            if remaining.is_zero() {
                return None;
            }
            devices = self
                .changed
                .wait_timeout(devices, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

impl AttributeHost for AttributeBoard {
    fn publish(&self, device: &str, attrs: &[AttrSpec]) -> Result<()> {
        let mut devices = self.devices.lock().unwrap_or_else(PoisonError::into_inner);
        if devices.contains_key(device) {
            return Err(Error::PublishFailed {
                device: device.to_string(),
                reason: "already published".to_string(),
            });
        }
        let published = Published {
            specs: attrs.to_vec(),
            generations: attrs.iter().map(|a| (a.name, 0)).collect(),
        };
        devices.insert(device.to_string(), published);
        log::debug!("attrs: published {} ({} attributes)", device, attrs.len());
        Ok(())
    }

    fn withdraw(&self, device: &str) {
        let mut devices = self.devices.lock().unwrap_or_else(PoisonError::into_inner);
        if devices.remove(device).is_some() {
            log::debug!("attrs: withdrew {}", device);
        }
        self.changed.notify_all();
    }

    fn notify(&self, device: &str, attr: &str) {
        let mut devices = self.devices.lock().unwrap_or_else(PoisonError::into_inner);
        match devices
            .get_mut(device)
            .and_then(|p| p.generations.get_mut(attr))
        {
            Some(generation) => {
                *generation += 1;
                self.changed.notify_all();
            }
            None => log::debug!("attrs: notify on unpublished {}/{}", device, attr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_wakeup_command_parse() {
        assert_eq!(
            WakeupCommand::parse(b"enable").unwrap(),
            WakeupCommand::Enable
        );
        assert_eq!(
            WakeupCommand::parse(b"disable\n").unwrap(),
            WakeupCommand::Disable
        );
        assert!(WakeupCommand::parse(b"disabled_xyz").is_err());
        assert!(WakeupCommand::parse(b"en").is_err());
        assert!(WakeupCommand::parse(b"").is_err());
        assert!(WakeupCommand::parse(b"ENABLE").is_err());
    }

    #[test]
    fn test_attribute_modes() {
        let wake = Attribute::WakeupEnable.spec();
        assert!(wake.mode.writable());
        assert!(!wake.mode.readable());
        let irq = Attribute::from_name("irq").unwrap().spec();
        assert!(irq.mode.readable() && irq.mode.writable());
        assert!(Attribute::from_name("power").is_err());
    }

    #[test]
    fn test_board_publish_notify() {
        let board = AttributeBoard::new();
        board.publish("fpc1020.0", &sensor_attributes()).unwrap();
        assert!(board.publish("fpc1020.0", &sensor_attributes()).is_err());
        assert_eq!(board.generation("fpc1020.0", ATTR_IRQ), Some(0));

        board.notify("fpc1020.0", ATTR_IRQ);
        assert_eq!(board.generation("fpc1020.0", ATTR_IRQ), Some(1));

        board.withdraw("fpc1020.0");
        assert_eq!(board.generation("fpc1020.0", ATTR_IRQ), None);
        assert!(board.devices().is_empty());
    }

    #[test]
    fn test_wait_for_change_across_threads() {
        let board = Arc::new(AttributeBoard::new());
        board.publish("goodix_fp.0", &sensor_attributes()).unwrap();

        let notifier = Arc::clone(&board);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            notifier.notify("goodix_fp.0", ATTR_IRQ);
        });

        let seen = board
            .wait_for_change("goodix_fp.0", ATTR_IRQ, 0, Duration::from_secs(5))
            .unwrap();
        assert_eq!(seen, 1);
        handle.join().unwrap();

        assert_eq!(
            board.wait_for_change("goodix_fp.0", ATTR_IRQ, 1, Duration::from_millis(10)),
            None
        );
    }
}
