//! Backend registry and initialization
//!
//! This module handles opening backends by name and attaching the sensor
//! described by a board file. The CLI only ever sees a [`SensorHandle`].

use std::collections::HashMap;
use std::sync::Arc;

use fpctl_core::hal::Platform;
use fpctl_core::{Controller, Registry, SensorConfig};

use crate::error::{PlatformError, Result};
use crate::handle::{EventSource, SensorHandle};

/// Parsed backend parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendParams {
    /// Backend name as given
    pub name: String,
    /// Key-value parameters
    pub params: HashMap<String, String>,
}

impl BackendParams {
    /// Parameters as borrowed pairs, in key order
    pub fn options(&self) -> Vec<(&str, &str)> {
        let mut options: Vec<(&str, &str)> = self
            .params
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        options.sort();
        options
    }
}

/// Parse a backend string into name and parameters
///
/// Format: "name" or "name:key1=value1,key2=value2"
///
/// # Example
/// ```
/// use fpctl_platform::parse_backend_params;
///
/// let params = parse_backend_params("linux_gpio:gpiochip=1").unwrap();
/// assert_eq!(params.name, "linux_gpio");
/// assert_eq!(params.params.get("gpiochip"), Some(&"1".to_string()));
/// ```
pub fn parse_backend_params(s: &str) -> Result<BackendParams> {
    let (name, rest) = match s.split_once(':') {
        Some((name, rest)) => (name, Some(rest)),
        None => (s, None),
    };

    let mut params = HashMap::new();
    if let Some(rest) = rest {
        for entry in rest.split(',').filter(|e| !e.is_empty()) {
            let (key, value) = entry
                .split_once('=')
                .ok_or_else(|| PlatformError::InvalidParameter(entry.to_string()))?;
            params.insert(key.trim().to_string(), value.trim().to_string());
        }
    }

    Ok(BackendParams {
        name: name.trim().to_string(),
        params,
    })
}

/// Information about a compiled-in backend
#[derive(Debug, Clone, Copy)]
pub struct BackendInfo {
    /// Primary name
    pub name: &'static str,
    /// Alternative names
    pub aliases: &'static [&'static str],
    /// Short description
    pub description: &'static str,
}

/// Backends available in this build
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_backends() -> Vec<BackendInfo> {
    let mut backends = Vec::new();

    #[cfg(feature = "dummy")]
    backends.push(BackendInfo {
        name: "dummy",
        aliases: &[],
        description: "Emulated platform (testing)",
    });

    #[cfg(feature = "linux-gpio")]
    backends.push(BackendInfo {
        name: "linux_gpio",
        aliases: &["linux-gpio", "gpiocdev"],
        description: "Linux GPIO character device with sysfs regulators",
    });

    backends
}

/// Comma separated list of backend names for help text
pub fn backend_names_short() -> String {
    let names: Vec<&str> = available_backends().iter().map(|b| b.name).collect();
    if names.is_empty() {
        "none (recompile with features)".to_string()
    } else {
        names.join(", ")
    }
}

/// Open a backend and attach the sensor described by `config`
///
/// `registry` hands out device identities; share one registry between every
/// sensor of a process so their names never collide.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use fpctl_core::{Registry, SensorConfig};
/// use fpctl_platform::open_sensor;
///
/// let config = SensorConfig::from_toml_file("board.toml").unwrap();
/// let handle = open_sensor("dummy", &config, Arc::new(Registry::new())).unwrap();
/// println!("attached {}", handle.name());
/// ```
pub fn open_sensor(
    backend: &str,
    config: &SensorConfig,
    registry: Arc<Registry>,
) -> Result<SensorHandle> {
    let params = parse_backend_params(backend)?;

    let (platform, events): (Platform, Box<dyn EventSource>) = match params.name.as_str() {
        #[cfg(feature = "dummy")]
        "dummy" => open_dummy(&params)?,

        #[cfg(feature = "linux-gpio")]
        "linux_gpio" | "linux-gpio" | "gpiocdev" => open_linux_gpio(&params, config)?,

        _ => {
            return Err(PlatformError::UnknownBackend(
                params.name.clone(),
                backend_names_short(),
            ))
        }
    };

    log::debug!("{}: features {:?}", params.name, platform.features);

    let controller = Controller::new(platform, registry);
    let device = controller.attach(config)?;
    Ok(SensorHandle::new(device, events))
}

// Backend-specific open functions
// These build the provider bundle and keep the backend reachable for events

#[cfg(feature = "dummy")]
fn open_dummy(params: &BackendParams) -> Result<(Platform, Box<dyn EventSource>)> {
    let config = fpctl_dummy::parse_options(&params.options())?;
    log::info!("Opening emulated platform...");
    let dummy = fpctl_dummy::DummyPlatform::new(config);
    Ok((dummy.platform(), Box::new(dummy)))
}

#[cfg(feature = "linux-gpio")]
fn open_linux_gpio(
    params: &BackendParams,
    config: &SensorConfig,
) -> Result<(Platform, Box<dyn EventSource>)> {
    log::info!("Opening Linux GPIO platform...");
    let host = fpctl_linux_gpio::open_linux_gpio(&params.options(), config)
        .map_err(fpctl_core::Error::from)?;
    Ok((host.platform(), Box::new(host)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backend_params() {
        let params = parse_backend_params("dummy").unwrap();
        assert_eq!(params.name, "dummy");
        assert!(params.params.is_empty());

        let params = parse_backend_params("linux_gpio:dev=/dev/gpiochip0,wake_lock=/tmp/wl").unwrap();
        assert_eq!(params.name, "linux_gpio");
        assert_eq!(params.params.len(), 2);
        assert_eq!(
            params.options(),
            vec![("dev", "/dev/gpiochip0"), ("wake_lock", "/tmp/wl")]
        );

        let params = parse_backend_params("dummy:").unwrap();
        assert!(params.params.is_empty());

        assert!(matches!(
            parse_backend_params("dummy:edge_period_ms"),
            Err(PlatformError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_unknown_backend() {
        let config = fpctl_core::SensorConfig::new(fpctl_core::SensorVariant::Fpc1020);
        let err = open_sensor("ch341a", &config, Arc::new(Registry::new())).unwrap_err();
        assert!(matches!(err, PlatformError::UnknownBackend(ref name, _) if name == "ch341a"));
    }

    #[test]
    fn test_backend_names() {
        let names = backend_names_short();
        #[cfg(feature = "dummy")]
        assert!(names.contains("dummy"));
        #[cfg(feature = "linux-gpio")]
        assert!(names.contains("linux_gpio"));
        assert!(!names.is_empty());
    }
}
