//! fpctl-linux-gpio - Linux host platform for fpctl
//!
//! This crate drives a fingerprint sensor's control lines from Linux
//! userspace using the GPIO character device interface (gpiocdev), the
//! regulator userspace-consumer `state` attribute and timed wake locks.
//!
//! # Overview
//!
//! | Capability | Mechanism |
//! |------------|-----------|
//! | GPIO lines | one `gpiocdev` line request per line, consumer `fpctl` |
//! | Interrupts | rising-edge detection plus a watcher thread |
//! | Pin states | bias bundles from `[pinctrl.states]` in the board file |
//! | Supplies   | `<supply_root>/<id>/state` (`enabled` / `disabled`) |
//! | Wake holds | `<tag> <timeout_ns>` written to the wake lock attribute |
//!
//! # Usage with fpctl CLI
//!
//! ```bash
//! # GPIO chip by device path
//! fpctl attach -b linux_gpio:dev=/dev/gpiochip0 -c board.toml
//!
//! # Using gpiochip number and a custom regulator root
//! fpctl attach -b linux_gpio:gpiochip=1,supply_root=/sys/devices/platform/soc -c board.toml
//! ```
//!
//! # System Requirements
//!
//! - Linux kernel 5.10+ with GPIO character device support
//! - Access to `/dev/gpiochipN` (may require root or udev rules)
//! - `CONFIG_REGULATOR_USERSPACE_CONSUMER` for regulator-powered sensors
//! - `CONFIG_PM_WAKELOCKS` for wake holds

pub mod device;
pub mod error;
pub mod sysfs;

// Re-exports
pub use device::{parse_options, LinuxGpioConfig, LinuxGpioPlatform};
pub use error::{LinuxGpioError, Result};

/// Open the Linux platform for a sensor and return its provider bundle
///
/// # Example Options
///
/// - `dev=/dev/gpiochip0` - GPIO chip device path (or use gpiochip=N)
/// - `gpiochip=0` - GPIO chip number (alternative to dev)
/// - `wake_lock=/sys/power/wake_lock` - wake lock attribute (optional)
/// - `supply_root=/sys/devices/platform` - regulator consumer root (optional)
pub fn open_linux_gpio(
    options: &[(&str, &str)],
    sensor: &fpctl_core::SensorConfig,
) -> Result<LinuxGpioPlatform> {
    let config = parse_options(options)?;
    LinuxGpioPlatform::open(&config, sensor)
}
