//! GPIO character device providers
//!
//! Each claimed line gets its own kernel line request so lines can be
//! released independently. The kernel request is made with the direction
//! left as is; `direction_output` / `direction_input` then reconfigure it.
//!
//! Interrupts are emulated with edge detection on the line request and a
//! watcher thread per armed interrupt. Pin states are bias bundles taken
//! from the board configuration and applied to lines this platform holds.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use gpiocdev::line::{Bias as LineBias, EdgeDetection, Offset, Value};
use gpiocdev::request::{Config, Request};

use fpctl_core::attr::{AttrSpec, AttributeBoard};
use fpctl_core::config::{Bias, PinBundle, SensorConfig};
use fpctl_core::error::{Error as CoreError, Result as CoreResult};
use fpctl_core::hal::{
    AttributeHost, GpioProvider, IrqHandler, IrqId, IrqProvider, Level, LineId, PinControl,
    PinStateHandle, PinctrlProvider, Platform, PlatformFeatures, Trigger,
};

use crate::error::{LinuxGpioError, Result};
use crate::sysfs::{RegulatorConsumers, WakeLock};

/// Consumer label on every line request
const CONSUMER: &str = "fpctl";

/// How long a watcher blocks before checking for shutdown
const EDGE_POLL: Duration = Duration::from_millis(100);

/// Default root of regulator userspace-consumer devices
pub const DEFAULT_SUPPLY_ROOT: &str = "/sys/devices/platform";

/// Default wake lock attribute
pub const DEFAULT_WAKE_LOCK: &str = "/sys/power/wake_lock";

/// Configuration for opening the Linux GPIO platform
#[derive(Debug, Clone)]
pub struct LinuxGpioConfig {
    /// Device path (e.g., "/dev/gpiochip0")
    pub device: String,
    /// Wake lock attribute
    pub wake_lock: PathBuf,
    /// Directory holding one userspace-consumer device per supply id
    pub supply_root: PathBuf,
}

impl Default for LinuxGpioConfig {
    fn default() -> Self {
        Self {
            device: String::new(),
            wake_lock: PathBuf::from(DEFAULT_WAKE_LOCK),
            supply_root: PathBuf::from(DEFAULT_SUPPLY_ROOT),
        }
    }
}

impl LinuxGpioConfig {
    /// Create a configuration for the given chip with default host paths
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    AsIs,
    Input,
    Output(Value),
}

struct ClaimedLine {
    label: String,
    request: Arc<Request>,
    direction: Direction,
    bias: Option<LineBias>,
    edge: bool,
}

impl ClaimedLine {
    fn config(&self, offset: Offset) -> Config {
        let mut cfg = Config::default();
        cfg.with_line(offset);
        match self.direction {
            Direction::AsIs => {}
            Direction::Input => {
                cfg.as_input();
            }
            Direction::Output(value) => {
                cfg.as_output(value);
            }
        }
        if let Some(bias) = self.bias {
            cfg.with_bias(bias);
        }
        if self.edge {
            cfg.with_edge_detection(EdgeDetection::RisingEdge);
        }
        cfg
    }
}

struct Watcher {
    line: LineId,
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

struct Shared {
    config: LinuxGpioConfig,
    pin_states: BTreeMap<String, PinBundle>,
    lines: Mutex<BTreeMap<LineId, ClaimedLine>>,
    watchers: Mutex<BTreeMap<u32, Watcher>>,
    next_irq: AtomicU32,
    regulators: RegulatorConsumers,
    wake_lock: WakeLock,
    board: AttributeBoard,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn level_of(value: Value) -> Level {
    match value {
        Value::Active => Level::High,
        Value::Inactive => Level::Low,
    }
}

fn value_of(level: Level) -> Value {
    match level {
        Level::High => Value::Active,
        Level::Low => Value::Inactive,
    }
}

fn line_bias(bias: Bias) -> Option<LineBias> {
    match bias {
        Bias::AsIs => None,
        Bias::Disabled => Some(LineBias::Disabled),
        Bias::PullUp => Some(LineBias::PullUp),
        Bias::PullDown => Some(LineBias::PullDown),
    }
}

/// Linux host platform
///
/// Cloning is cheap; clones share line requests and watcher threads.
#[derive(Clone)]
pub struct LinuxGpioPlatform {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for LinuxGpioPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinuxGpioPlatform")
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

impl LinuxGpioPlatform {
    /// Open the platform for a sensor described by `sensor`
    pub fn open(config: &LinuxGpioConfig, sensor: &SensorConfig) -> Result<Self> {
        if config.device.is_empty() {
            return Err(LinuxGpioError::NoDevice);
        }
        if !Path::new(&config.device).exists() {
            return Err(LinuxGpioError::ChipNotFound(config.device.clone()));
        }

        log::info!(
            "linux_gpio: Using {} (supplies under {}, wake lock {})",
            config.device,
            config.supply_root.display(),
            config.wake_lock.display()
        );

        Ok(Self {
            shared: Arc::new(Shared {
                config: config.clone(),
                pin_states: sensor.pinctrl.states.clone(),
                lines: Mutex::new(BTreeMap::new()),
                watchers: Mutex::new(BTreeMap::new()),
                next_irq: AtomicU32::new(1),
                regulators: RegulatorConsumers::new(&config.supply_root),
                wake_lock: WakeLock::new(&config.wake_lock),
                board: AttributeBoard::new(),
            }),
        })
    }

    /// Capabilities of this host
    ///
    /// Wake-capable interrupts need kernel support this interface lacks, so
    /// they are never reported.
    pub fn features(&self) -> PlatformFeatures {
        let mut features = PlatformFeatures::REGULATORS;
        if self.shared.wake_lock.available() {
            features |= PlatformFeatures::WAKE_LOCK;
        }
        if !self.shared.pin_states.is_empty() {
            features |= PlatformFeatures::PIN_CONTROL;
        }
        features
    }

    /// Provider bundle for the lifecycle controller
    pub fn platform(&self) -> Platform {
        Platform {
            features: self.features(),
            gpio: Arc::new(self.clone()),
            pinctrl: Arc::new(self.clone()),
            supplies: Arc::new(self.shared.regulators.clone()),
            irq: Arc::new(self.clone()),
            wake: Arc::new(self.shared.wake_lock.clone()),
            attrs: Arc::new(self.clone()),
        }
    }

    /// Attribute board observers can wait on
    pub fn board(&self) -> &AttributeBoard {
        &self.shared.board
    }

    fn reconfigure(&self, line: LineId, update: impl FnOnce(&mut ClaimedLine)) -> Result<()> {
        let mut lines = lock(&self.shared.lines);
        let claimed = lines
            .get_mut(&line)
            .ok_or(LinuxGpioError::LineNotRequested(line))?;
        let mut next = ClaimedLine {
            label: claimed.label.clone(),
            request: Arc::clone(&claimed.request),
            direction: claimed.direction,
            bias: claimed.bias,
            edge: claimed.edge,
        };
        update(&mut next);
        claimed
            .request
            .reconfigure(&next.config(line))
            .map_err(LinuxGpioError::ReconfigureFailed)?;
        *claimed = next;
        Ok(())
    }

    fn request_of(&self, line: LineId) -> Result<Arc<Request>> {
        lock(&self.shared.lines)
            .get(&line)
            .map(|l| Arc::clone(&l.request))
            .ok_or(LinuxGpioError::LineNotRequested(line))
    }

    fn apply_bundle(&self, name: &str, bundle: &PinBundle) -> Result<()> {
        let bias = line_bias(bundle.bias);
        for line in &bundle.lines {
            let held = lock(&self.shared.lines).contains_key(line);
            if !held {
                log::warn!("linux_gpio: pin state '{}': line {} not held, skipped", name, line);
                continue;
            }
            self.reconfigure(*line, |l| l.bias = bias)?;
        }
        log::debug!("linux_gpio: pin state '{}' applied ({})", name, bundle.bias);
        Ok(())
    }
}

fn line_failed(line: LineId, op: &'static str, err: LinuxGpioError) -> CoreError {
    CoreError::LineFailed {
        line,
        op,
        reason: err.to_string(),
    }
}

impl GpioProvider for LinuxGpioPlatform {
    fn request(&self, line: LineId, label: &str) -> CoreResult<()> {
        let mut lines = lock(&self.shared.lines);
        if lines.contains_key(&line) {
            return Err(CoreError::AlreadyInUse {
                name: label.to_string(),
            });
        }

        let mut cfg = Config::default();
        cfg.with_line(line);
        let request = Request::from_config(cfg)
            .on_chip(&self.shared.config.device)
            .with_consumer(CONSUMER)
            .request()
            .map_err(|source| {
                let err = LinuxGpioError::LineRequestFailed { line, source };
                CoreError::ClaimFailed {
                    name: label.to_string(),
                    reason: err.to_string(),
                }
            })?;

        lines.insert(
            line,
            ClaimedLine {
                label: label.to_string(),
                request: Arc::new(request),
                direction: Direction::AsIs,
                bias: None,
                edge: false,
            },
        );
        log::debug!("linux_gpio: line {} requested for '{}'", line, label);
        Ok(())
    }

    fn free(&self, line: LineId) {
        if let Some(claimed) = lock(&self.shared.lines).remove(&line) {
            log::debug!("linux_gpio: line {} ('{}') released", line, claimed.label);
        }
    }

    fn direction_output(&self, line: LineId, level: Level) -> CoreResult<()> {
        self.reconfigure(line, |l| l.direction = Direction::Output(value_of(level)))
            .map_err(|e| line_failed(line, "direction", e))
    }

    fn direction_input(&self, line: LineId) -> CoreResult<()> {
        self.reconfigure(line, |l| l.direction = Direction::Input)
            .map_err(|e| line_failed(line, "direction", e))
    }

    fn set_level(&self, line: LineId, level: Level) -> CoreResult<()> {
        let value = value_of(level);
        let request = self
            .request_of(line)
            .map_err(|e| line_failed(line, "set", e))?;
        request
            .set_value(line, value)
            .map_err(|e| line_failed(line, "set", LinuxGpioError::SetValueFailed(e)))?;
        if let Some(claimed) = lock(&self.shared.lines).get_mut(&line) {
            claimed.direction = Direction::Output(value);
        }
        Ok(())
    }

    fn level(&self, line: LineId) -> CoreResult<Level> {
        let request = self
            .request_of(line)
            .map_err(|e| line_failed(line, "get", e))?;
        request
            .value(line)
            .map(level_of)
            .map_err(|e| line_failed(line, "get", LinuxGpioError::GetValueFailed(e)))
    }
}

impl IrqProvider for LinuxGpioPlatform {
    fn request_irq(
        &self,
        line: LineId,
        trigger: Trigger,
        name: &str,
        handler: IrqHandler,
    ) -> CoreResult<IrqId> {
        if trigger != Trigger::RisingEdge {
            return Err(CoreError::Unsupported("falling-edge interrupts"));
        }
        let irq_failed = |e: LinuxGpioError| CoreError::IrqRequestFailed {
            line,
            reason: e.to_string(),
        };

        self.reconfigure(line, |l| {
            l.direction = Direction::Input;
            l.edge = true;
        })
        .map_err(irq_failed)?;
        let request = self.request_of(line).map_err(irq_failed)?;

        let id = self.shared.next_irq.fetch_add(1, Ordering::AcqRel);
        let stop = Arc::new(AtomicBool::new(false));
        let handle = {
            let stop = Arc::clone(&stop);
            let name = name.to_string();
            thread::Builder::new()
                .name(format!("gpio{}-edges", line))
                .spawn(move || watch_edges(&name, line, &request, &stop, &handler))
                .map_err(|e| CoreError::IrqRequestFailed {
                    line,
                    reason: e.to_string(),
                })?
        };

        lock(&self.shared.watchers).insert(id, Watcher { line, stop, handle });
        log::debug!("linux_gpio: irq {} watching line {} for '{}'", id, line, name);
        Ok(IrqId(id))
    }

    fn enable_wake(&self, _irq: IrqId) -> CoreResult<()> {
        Err(CoreError::Unsupported("wake-capable interrupts"))
    }

    fn free_irq(&self, irq: IrqId) {
        let Some(watcher) = lock(&self.shared.watchers).remove(&irq.0) else {
            return;
        };
        watcher.stop.store(true, Ordering::Release);
        if watcher.handle.join().is_err() {
            log::error!("linux_gpio: edge watcher for irq {} panicked", irq);
        }
        if let Err(e) = self.reconfigure(watcher.line, |l| l.edge = false) {
            log::warn!("linux_gpio: could not disable edge detection: {}", e);
        }
    }
}

fn watch_edges(name: &str, line: LineId, request: &Request, stop: &AtomicBool, handler: &IrqHandler) {
    while !stop.load(Ordering::Acquire) {
        match request.wait_edge_event(EDGE_POLL) {
            Ok(false) => continue,
            Ok(true) => match request.read_edge_event() {
                Ok(_) => {
                    if !stop.load(Ordering::Acquire) {
                        handler();
                    }
                }
                Err(e) => log::warn!("{}: failed to read edge on line {}: {}", name, line, e),
            },
            Err(e) => {
                log::error!("{}: edge wait on line {} failed: {}", name, line, e);
                break;
            }
        }
    }
}

struct LinuxPinControl {
    platform: LinuxGpioPlatform,
    consumer: String,
}

impl PinctrlProvider for LinuxGpioPlatform {
    fn get(&self, consumer: &str) -> CoreResult<Box<dyn PinControl>> {
        if self.shared.pin_states.is_empty() {
            return Err(CoreError::NoPinControl);
        }
        Ok(Box::new(LinuxPinControl {
            platform: self.clone(),
            consumer: consumer.to_string(),
        }))
    }
}

impl PinControl for LinuxPinControl {
    fn lookup_state(&self, name: &str) -> CoreResult<PinStateHandle> {
        self.platform
            .shared
            .pin_states
            .keys()
            .position(|k| k == name)
            .map(|index| PinStateHandle::new(name, index))
            .ok_or_else(|| CoreError::StateLookupFailed(name.to_string()))
    }

    fn select_state(&self, state: &PinStateHandle) -> CoreResult<()> {
        let bundle = self
            .platform
            .shared
            .pin_states
            .get(state.name())
            .ok_or_else(|| CoreError::StateLookupFailed(state.name().to_string()))?;
        self.platform
            .apply_bundle(state.name(), bundle)
            .map_err(|e| CoreError::PinSelectFailed {
                state: format!("{}/{}", self.consumer, state.name()),
                reason: e.to_string(),
            })
    }
}

impl AttributeHost for LinuxGpioPlatform {
    fn publish(&self, device: &str, attrs: &[AttrSpec]) -> CoreResult<()> {
        self.shared.board.publish(device, attrs)
    }

    fn withdraw(&self, device: &str) {
        self.shared.board.withdraw(device)
    }

    fn notify(&self, device: &str, attr: &str) {
        self.shared.board.notify(device, attr)
    }
}

/// Parse `key=value` backend options into a [`LinuxGpioConfig`]
///
/// Supported options:
/// - `dev=/dev/gpiochipN` or `gpiochip=N`
/// - `wake_lock=PATH`
/// - `supply_root=PATH`
pub fn parse_options(options: &[(&str, &str)]) -> Result<LinuxGpioConfig> {
    let mut config = LinuxGpioConfig::default();
    let mut gpiochip: Option<u32> = None;

    for (key, value) in options {
        match *key {
            "dev" => config.device = value.to_string(),
            "gpiochip" => {
                gpiochip = Some(value.parse().map_err(|_| {
                    LinuxGpioError::InvalidParameter(format!("Invalid gpiochip value: {}", value))
                })?);
            }
            "wake_lock" => config.wake_lock = PathBuf::from(value),
            "supply_root" => config.supply_root = PathBuf::from(value),
            _ => {
                log::warn!("linux_gpio: Unknown option: {}={}", key, value);
            }
        }
    }

    if config.device.is_empty() {
        match gpiochip {
            Some(n) => config.device = format!("/dev/gpiochip{}", n),
            None => return Err(LinuxGpioError::NoDevice),
        }
    }
    Ok(config)
}
