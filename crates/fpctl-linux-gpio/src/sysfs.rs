//! Regulator and wake lock control through sysfs
//!
//! Supplies are driven through the regulator framework's userspace consumer:
//! each supply id names a device directory under the supply root whose
//! `state` attribute accepts `enabled` / `disabled`. Wake assertions are
//! written to the timed wake lock attribute as `<tag> <timeout_ns>`.

use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use fpctl_core::error::{Error as CoreError, Result as CoreResult};
use fpctl_core::hal::{SupplyHandle, SupplyProvider, WakeProvider};

use crate::error::{LinuxGpioError, Result};

/// Write an attribute that must already exist
fn write_existing(path: &Path, contents: &str) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).truncate(true).open(path)?;
    file.write_all(contents.as_bytes())
}

/// Userspace-consumer regulators under one root directory
#[derive(Debug, Clone)]
pub struct RegulatorConsumers {
    root: PathBuf,
    claimed: Arc<Mutex<BTreeSet<String>>>,
}

impl RegulatorConsumers {
    /// Regulators found under `root`
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            claimed: Arc::new(Mutex::new(BTreeSet::new())),
        }
    }

    fn state_path(&self, id: &str) -> PathBuf {
        self.root.join(id).join("state")
    }

    fn write_state(&self, supply: &SupplyHandle, state: &str) -> Result<()> {
        let path = self.state_path(supply.id());
        write_existing(&path, state).map_err(|source| LinuxGpioError::SupplyAccess { path, source })?;
        log::debug!("linux_gpio: supply '{}' {}", supply.id(), state);
        Ok(())
    }

    /// Read back the state attribute
    pub fn is_enabled(&self, id: &str) -> Result<bool> {
        let path = self.state_path(id);
        let state = fs::read_to_string(&path)
            .map_err(|source| LinuxGpioError::SupplyAccess { path, source })?;
        Ok(state.trim() == "enabled")
    }
}

impl SupplyProvider for RegulatorConsumers {
    fn get(&self, name: &str, id: &str) -> CoreResult<SupplyHandle> {
        let path = self.state_path(id);
        if !path.exists() {
            return Err(CoreError::ClaimFailed {
                name: name.to_string(),
                reason: format!("{} does not exist", path.display()),
            });
        }
        let mut claimed = self.claimed.lock().unwrap_or_else(PoisonError::into_inner);
        if !claimed.insert(id.to_string()) {
            return Err(CoreError::AlreadyInUse {
                name: name.to_string(),
            });
        }
        Ok(SupplyHandle::new(name, id))
    }

    fn put(&self, supply: SupplyHandle) {
        self.claimed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(supply.id());
    }

    fn enable(&self, supply: &SupplyHandle) -> CoreResult<()> {
        Ok(self.write_state(supply, "enabled")?)
    }

    fn disable(&self, supply: &SupplyHandle) -> CoreResult<()> {
        Ok(self.write_state(supply, "disabled")?)
    }
}

/// Timed wake lock attribute
#[derive(Debug, Clone)]
pub struct WakeLock {
    path: PathBuf,
}

impl WakeLock {
    /// Wake lock written at `path`
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Whether the attribute exists on this host
    pub fn available(&self) -> bool {
        self.path.exists()
    }
}

impl WakeProvider for WakeLock {
    fn hold(&self, tag: &str, timeout: Duration) -> CoreResult<()> {
        let line = format!("{} {}", tag, timeout.as_nanos());
        write_existing(&self.path, &line).map_err(|source| LinuxGpioError::WakeLock {
            path: self.path.clone(),
            source,
        })?;
        log::trace!("linux_gpio: wake lock '{}' for {:?}", tag, timeout);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::process;

    fn scratch(name: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("fpctl-{}-{}", name, process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_regulator_state_file() {
        let root = scratch("regulators");
        fs::create_dir_all(root.join("fp_vdd")).unwrap();
        fs::write(root.join("fp_vdd").join("state"), "disabled\n").unwrap();

        let regulators = RegulatorConsumers::new(&root);
        let supply = regulators.get("vdd", "fp_vdd").unwrap();
        assert!(matches!(
            regulators.get("vdd", "fp_vdd"),
            Err(CoreError::AlreadyInUse { .. })
        ));
        assert!(matches!(
            regulators.get("vio", "missing"),
            Err(CoreError::ClaimFailed { .. })
        ));

        regulators.enable(&supply).unwrap();
        assert!(regulators.is_enabled("fp_vdd").unwrap());
        regulators.disable(&supply).unwrap();
        assert!(!regulators.is_enabled("fp_vdd").unwrap());

        regulators.put(supply);
        let supply = regulators.get("vdd", "fp_vdd").unwrap();

        // State attribute gone after the claim
        fs::remove_file(root.join("fp_vdd").join("state")).unwrap();
        assert!(regulators.enable(&supply).is_err());
        assert!(!root.join("fp_vdd").join("state").exists());
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn test_wake_lock_format() {
        let dir = scratch("wakelock");
        let path = dir.join("wake_lock");
        let lock = WakeLock::new(&path);
        assert!(!lock.available());
        assert!(lock.hold("fpc1020.0", Duration::from_millis(1000)).is_err());
        assert!(!lock.available());

        fs::write(&path, "").unwrap();
        assert!(lock.available());
        lock.hold("fpc1020.0", Duration::from_millis(1000)).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "fpc1020.0 1000000000");
        let _ = fs::remove_dir_all(dir);
    }
}
