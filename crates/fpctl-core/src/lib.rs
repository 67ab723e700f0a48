//! fpctl-core - Electrical lifecycle control for fingerprint sensors
//!
//! This crate sequences the electrical side of an FPC1020 or Goodix gf3266
//! fingerprint sensor: power rails, the reset line, the interrupt line and
//! pin-multiplexing state. It does not speak the sensor's data protocol.
//!
//! Host facilities (GPIO lines, pin control, regulators, interrupt delivery,
//! wake locks, attribute exposure) are reached through the provider traits
//! in [`hal`]; backends implement them.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use fpctl_core::{Controller, Registry, SensorConfig};
//!
//! fn bring_up(platform: fpctl_core::hal::Platform) -> fpctl_core::Result<()> {
//!     let config = SensorConfig::from_toml_file("board.toml")?;
//!     let controller = Controller::new(platform, Arc::new(Registry::new()));
//!     let device = controller.attach(&config)?;
//!     println!("{} is {}", device.name(), device.state());
//!     device.write_attr("wakeup_enable", b"enable\n")?;
//!     device.detach();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod attr;
pub mod config;
pub mod error;
pub mod hal;
pub mod irq;
pub mod lifecycle;
pub mod pinctrl;
pub mod power;
pub mod registry;
pub mod reset;
pub mod resource;
pub mod variant;

pub use attr::{AttributeBoard, WakeupCommand, ATTR_IRQ, ATTR_WAKEUP_ENABLE};
pub use config::{Bias, PinBundle, SensorConfig};
pub use error::{Error, ErrorKind, Result};
pub use lifecycle::{AttributeHandle, Controller, DeviceStatus, LifecycleState, SensorDevice};
pub use pinctrl::PinState;
pub use registry::{Minor, Registry, MINOR_POOL_SIZE};
pub use variant::SensorVariant;
