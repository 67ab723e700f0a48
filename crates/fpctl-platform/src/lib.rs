//! Backend selection for fpctl
//!
//! This crate opens a host platform by name, attaches the sensor described by
//! a board file and hands back a [`SensorHandle`]. The CLI should only
//! interact with types from this crate and the configuration types of
//! `fpctl-core`, never with the provider traits directly.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          CLI (fpctl)                         │
//! │  - Parses board files, picks a backend by string            │
//! │  - Never sees provider traits                                │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  fpctl-platform (this crate)                 │
//! │  - SensorHandle: attached device + its backend               │
//! │  - Backend registry: opens backends by name                  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!              ┌───────────────┴───────────────┐
//!              ▼                               ▼
//! ┌──────────────────────────┐   ┌──────────────────────────┐
//! │    fpctl-core            │   │  Backend crates          │
//! │  - Lifecycle controller  │   │  - dummy, linux_gpio     │
//! │  - Identity registry     │   │  - Implement providers   │
//! │  - Board file parsing    │   │                          │
//! └──────────────────────────┘   └──────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use fpctl_core::{Registry, SensorConfig};
//! use fpctl_platform::open_sensor;
//!
//! let config = SensorConfig::from_toml_file("board.toml")?;
//! let mut handle = open_sensor("linux_gpio:gpiochip=0", &config, Arc::new(Registry::new()))?;
//!
//! handle.write_attr("wakeup_enable", b"enable")?;
//! while let Some(n) = handle.wait_irq(Duration::from_secs(10)) {
//!     println!("{} interrupt(s)", n);
//! }
//! handle.detach();
//! ```

mod error;
mod handle;
mod registry;

pub use error::{PlatformError, Result};
pub use handle::SensorHandle;
pub use registry::{
    available_backends, backend_names_short, open_sensor, parse_backend_params, BackendInfo,
    BackendParams,
};
