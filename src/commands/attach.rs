//! Attach command implementation

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use fpctl_core::attr::{ATTR_IRQ, ATTR_WAKEUP_ENABLE};
use fpctl_core::{Registry, SensorConfig};
use fpctl_platform::{open_sensor, SensorHandle};

/// Attach a sensor, report `irq` notifications, then detach
///
/// Stops after `events` notifications, or once `timeout` passes without one.
pub fn run_attach(
    backend: &str,
    config_path: &Path,
    wakeup: bool,
    events: Option<u64>,
    timeout: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = SensorConfig::from_toml_file(config_path)?;
    let registry = Arc::new(Registry::new());

    let mut handle = open_sensor(backend, &config, registry)?;
    println!("Attached {} via {}", handle.name(), handle.backend());

    if wakeup {
        handle.write_attr(ATTR_WAKEUP_ENABLE, b"enable")?;
        println!("Wake on interrupt enabled");
    }

    let result = watch_irq(&mut handle, events, timeout);
    print_summary(&handle);
    handle.detach();
    result
}

fn watch_irq(
    handle: &mut SensorHandle,
    events: Option<u64>,
    timeout: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut count = 0u64;
    while events.map_or(true, |limit| count < limit) {
        let Some(arrived) = handle.wait_irq(timeout) else {
            log::info!("{}: no interrupt within {:?}", handle.name(), timeout);
            break;
        };
        let level = handle.read_attr(ATTR_IRQ)?;
        let limit = events.unwrap_or(u64::MAX);
        for _ in 0..arrived {
            if count >= limit {
                break;
            }
            count += 1;
            println!("{}: irq #{} level {}", handle.name(), count, level.trim_end());
        }
    }
    Ok(())
}

fn print_summary(handle: &SensorHandle) {
    let status = handle.status();
    println!();
    println!("Device:        {} ({})", status.name, status.variant);
    println!("State:         {}", status.state);
    println!("Power:         {}", if status.power_on { "on" } else { "off" });
    println!("Pin state:     {}", status.pin_state);
    println!(
        "Wakeup:        {}",
        if status.wakeup_enabled { "enabled" } else { "disabled" }
    );
    println!("Edges:         {}", status.edges);
    println!("Notifications: {}", status.notifications);
    println!("Wake holds:    {}", status.wake_holds);
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn board(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("boards")
            .join(name)
    }

    #[test]
    fn test_attach_dummy_until_event_limit() {
        run_attach(
            "dummy:edge_period_ms=5",
            &board("fpc1020.toml"),
            true,
            Some(3),
            Duration::from_secs(5),
        )
        .unwrap();
    }

    #[test]
    fn test_attach_dummy_times_out_quietly() {
        run_attach(
            "dummy",
            &board("gf3266.toml"),
            false,
            None,
            Duration::from_millis(20),
        )
        .unwrap();
    }

    #[test]
    fn test_attach_unknown_backend() {
        let err = run_attach(
            "nonexistent",
            &board("fpc1020.toml"),
            false,
            Some(1),
            Duration::from_millis(10),
        )
        .unwrap_err();
        assert!(err.to_string().contains("Unknown backend"));
    }
}
