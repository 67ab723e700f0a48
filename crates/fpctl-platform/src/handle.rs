//! SensorHandle - an attached sensor plus the backend that hosts it
//!
//! The handle owns the [`SensorDevice`] and keeps the backend's attribute
//! board reachable so callers can wait for interrupt notifications without
//! knowing which backend is in use.

use std::fmt;
use std::time::Duration;

use fpctl_core::attr::{AttributeBoard, ATTR_IRQ};
use fpctl_core::hal::Level;
use fpctl_core::{DeviceStatus, Result, SensorDevice};

/// Backend side of a handle: where notifications are observed
pub(crate) trait EventSource: Send + Sync {
    /// Backend name for log messages
    fn backend(&self) -> &'static str;

    /// Attribute board the backend publishes to
    fn board(&self) -> &AttributeBoard;
}

#[cfg(feature = "dummy")]
impl EventSource for fpctl_dummy::DummyPlatform {
    fn backend(&self) -> &'static str {
        "dummy"
    }

    fn board(&self) -> &AttributeBoard {
        fpctl_dummy::DummyPlatform::board(self)
    }
}

#[cfg(feature = "linux-gpio")]
impl EventSource for fpctl_linux_gpio::LinuxGpioPlatform {
    fn backend(&self) -> &'static str {
        "linux_gpio"
    }

    fn board(&self) -> &AttributeBoard {
        fpctl_linux_gpio::LinuxGpioPlatform::board(self)
    }
}

/// An attached sensor
///
/// Dropping the handle detaches the sensor.
pub struct SensorHandle {
    device: SensorDevice,
    events: Box<dyn EventSource>,
    /// Last `irq` notification count handed out by [`wait_irq`](Self::wait_irq)
    seen: u64,
}

impl fmt::Debug for SensorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SensorHandle")
            .field("device", &self.device.name())
            .field("backend", &self.events.backend())
            .field("seen", &self.seen)
            .finish()
    }
}

impl SensorHandle {
    pub(crate) fn new(device: SensorDevice, events: Box<dyn EventSource>) -> Self {
        let seen = events
            .board()
            .generation(device.name(), ATTR_IRQ)
            .unwrap_or(0);
        Self {
            device,
            events,
            seen,
        }
    }

    /// Published device name, `<dev>.<minor>`
    pub fn name(&self) -> &str {
        self.device.name()
    }

    /// Name of the hosting backend
    pub fn backend(&self) -> &'static str {
        self.events.backend()
    }

    /// The attached device
    pub fn device(&self) -> &SensorDevice {
        &self.device
    }

    /// Status snapshot
    pub fn status(&self) -> DeviceStatus {
        self.device.status()
    }

    /// Read an attribute
    pub fn read_attr(&self, name: &str) -> Result<String> {
        self.device.read_attr(name)
    }

    /// Write an attribute
    pub fn write_attr(&self, name: &str, input: &[u8]) -> Result<()> {
        self.device.write_attr(name, input)
    }

    /// Instantaneous interrupt line level
    pub fn irq_level(&self) -> Result<Level> {
        self.device.irq_level()
    }

    /// Wait for `irq` notifications
    ///
    /// Returns how many arrived since the previous call, or `None` if none
    /// arrived within `timeout`.
    pub fn wait_irq(&mut self, timeout: Duration) -> Option<u64> {
        let generation =
            self.events
                .board()
                .wait_for_change(self.device.name(), ATTR_IRQ, self.seen, timeout)?;
        let arrived = generation.saturating_sub(self.seen);
        self.seen = generation;
        Some(arrived)
    }

    /// Detach the sensor and close the backend
    pub fn detach(self) {
        log::debug!("{}: detaching from {}", self.device.name(), self.backend());
        let Self { device, events, .. } = self;
        device.detach();
        drop(events);
    }
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::open_sensor;
    use fpctl_core::attr::ATTR_WAKEUP_ENABLE;
    use fpctl_core::{LifecycleState, Registry, SensorConfig, SensorVariant};
    use std::sync::Arc;

    fn fpc_config() -> SensorConfig {
        SensorConfig::new(SensorVariant::Fpc1020)
            .with_line("fpc,enable-vdd-ldo", 20)
            .with_line("fpc,enable-vddio-ldo", 21)
            .with_line("fpc,reset-gpio", 22)
            .with_line("fpc,irq-gpio", 23)
    }

    #[test]
    fn test_dummy_handle_lifecycle() {
        let registry = Arc::new(Registry::with_capacity(1));
        let handle = open_sensor("dummy", &fpc_config(), Arc::clone(&registry)).unwrap();
        assert_eq!(handle.name(), "fpc1020.0");
        assert_eq!(handle.backend(), "dummy");
        assert_eq!(handle.status().state, LifecycleState::Operational);
        assert!(handle.status().power_on);

        handle.write_attr(ATTR_WAKEUP_ENABLE, b"enable\n").unwrap();
        assert!(handle.status().wakeup_enabled);
        assert_eq!(handle.read_attr(ATTR_IRQ).unwrap(), "0\n");

        // Pool of one: a second sensor cannot get an identity
        let err = open_sensor("dummy", &fpc_config(), Arc::clone(&registry)).unwrap_err();
        assert_eq!(
            err.sensor_error().map(|e| e.kind()),
            Some(fpctl_core::ErrorKind::IdentityPoolExhausted)
        );

        handle.detach();
        assert_eq!(registry.in_use(), 0);

        let again = open_sensor("dummy", &fpc_config(), Arc::clone(&registry)).unwrap();
        assert_eq!(again.name(), "fpc1020.0");
    }

    #[test]
    fn test_wait_irq_counts_notifications() {
        let registry = Arc::new(Registry::new());
        let mut handle = open_sensor("dummy:edge_period_ms=5", &fpc_config(), registry).unwrap();

        let arrived = handle.wait_irq(Duration::from_secs(5)).unwrap();
        assert!(arrived >= 1);
        let more = handle.wait_irq(Duration::from_secs(5)).unwrap();
        assert!(more >= 1);

        // Edges are counted before their notification is queued
        assert!(handle.device().edge_count() >= arrived + more);
    }

    #[test]
    fn test_bad_dummy_option() {
        let err = open_sensor(
            "dummy:edge_period_ms=0",
            &fpc_config(),
            Arc::new(Registry::new()),
        )
        .unwrap_err();
        assert_eq!(
            err.sensor_error().map(|e| e.kind()),
            Some(fpctl_core::ErrorKind::ConfigurationError)
        );
    }
}
