//! fpctl-dummy - Emulated sensor platform for testing
//!
//! This crate provides an in-memory platform implementing every provider
//! trait. Each electrical action is appended to a journal with a timestamp,
//! faults can be injected at any step, and interrupt edges can be raised by
//! hand or by a periodic ticker. It's useful for testing and development
//! without real hardware.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use fpctl_core::attr::{AttrSpec, AttributeBoard};
use fpctl_core::error::{Error, Result};
use fpctl_core::hal::{
    AttributeHost, GpioProvider, IrqHandler, IrqId, IrqProvider, Level, LineId, PinControl,
    PinStateHandle, PinctrlProvider, Platform, PlatformFeatures, SupplyHandle, SupplyProvider,
    Trigger, WakeProvider,
};
use fpctl_core::variant::{PIN_STATE_ACTIVE, PIN_STATE_SUSPEND};


/// Configuration for the emulated platform
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Capabilities reported to the controller
    pub features: PlatformFeatures,
    /// Pin states the emulated pin controller knows
    pub pin_states: Vec<String>,
    /// Initial level of lines nobody drives
    pub idle_level: Level,
    /// Raise a rising edge this often while an interrupt is registered
    pub edge_period: Option<Duration>,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            features: PlatformFeatures::ALL,
            pin_states: vec![PIN_STATE_ACTIVE.to_string(), PIN_STATE_SUSPEND.to_string()],
            idle_level: Level::Low,
            edge_period: None,
        }
    }
}

/// Parse `key=value` backend options
///
/// Supported options:
/// - `edge_period_ms=N`: periodic synthetic edges
/// - `irq_level=0|1`: level of undriven lines
pub fn parse_options(options: &[(&str, &str)]) -> Result<DummyConfig> {
    let mut config = DummyConfig::default();
    for (key, value) in options {
        match *key {
            "edge_period_ms" => {
                let ms: u64 = value
                    .parse()
                    .map_err(|_| Error::Config(format!("invalid edge_period_ms '{}'", value)))?;
                if ms == 0 {
                    return Err(Error::Config("edge_period_ms must be non-zero".into()));
                }
                config.edge_period = Some(Duration::from_millis(ms));
            }
            "irq_level" => {
                config.idle_level = match *value {
                    "0" => Level::Low,
                    "1" => Level::High,
                    other => {
                        return Err(Error::Config(format!("invalid irq_level '{}'", other)))
                    }
                };
            }
            other => {
                return Err(Error::Config(format!("unknown dummy option '{}'", other)));
            }
        }
    }
    Ok(config)
}

/// An injected failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Claiming this line fails
    Request(LineId),
    /// Setting the direction of this line fails
    Direction(LineId),
    /// Driving this line fails
    SetLevel(LineId),
    /// No pin-control handle for any consumer
    PinctrlGet,
    /// This pin state cannot be resolved
    StateLookup(String),
    /// This pin state cannot be applied
    SelectState(String),
    /// Claiming this supply id fails
    SupplyGet(String),
    /// Enabling any supply fails
    SupplyEnable,
    /// Registering an interrupt fails
    RequestIrq,
    /// Publishing attributes fails
    Publish,
    /// Taking a wake assertion fails
    WakeHold,
}

/// An electrical or host-side action recorded by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HwEvent {
    /// Line claimed
    LineRequested(LineId),
    /// Line released
    LineFreed(LineId),
    /// Line configured as output
    LineOutput(LineId, Level),
    /// Line configured as input
    LineInput(LineId),
    /// Output driven
    LineSet(LineId, Level),
    /// Pin-control handle taken
    PinctrlGet(String),
    /// Pin-control handle dropped
    PinctrlPut(String),
    /// Pin state applied
    PinStateSelected(String),
    /// Supply claimed
    SupplyGet(String),
    /// Supply released
    SupplyPut(String),
    /// Supply switched on
    SupplyEnabled(String),
    /// Supply switched off
    SupplyDisabled(String),
    /// Interrupt registered on a line
    IrqRequested(LineId, IrqId),
    /// Interrupt marked as wake source
    IrqWakeEnabled(IrqId),
    /// Interrupt unregistered
    IrqFreed(IrqId),
    /// Wake assertion taken
    WakeHeld(String, Duration),
    /// Attributes published
    AttrsPublished(String),
    /// Attributes withdrawn
    AttrsWithdrawn(String),
}

#[derive(Debug)]
struct LineSim {
    owner: Option<String>,
    output: bool,
    level: Level,
}

#[derive(Debug, Default)]
struct SupplySim {
    claimed: bool,
    enabled: bool,
}

struct IrqSlot {
    line: LineId,
    handler: IrqHandler,
    wake: bool,
    ticker: Option<(Arc<AtomicBool>, JoinHandle<()>)>,
}

struct Shared {
    config: DummyConfig,
    journal: Mutex<Vec<(Instant, HwEvent)>>,
    lines: Mutex<BTreeMap<LineId, LineSim>>,
    supplies: Mutex<BTreeMap<String, SupplySim>>,
    irqs: Mutex<HashMap<u32, IrqSlot>>,
    next_irq: AtomicU32,
    faults: Mutex<Vec<Fault>>,
    board: AttributeBoard,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Emulated platform
///
/// Cloning is cheap; clones share the same emulated hardware.
#[derive(Clone)]
pub struct DummyPlatform {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for DummyPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DummyPlatform")
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

impl Default for DummyPlatform {
    fn default() -> Self {
        Self::new(DummyConfig::default())
    }
}

impl DummyPlatform {
    /// Create an emulated platform
    pub fn new(config: DummyConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                journal: Mutex::new(Vec::new()),
                lines: Mutex::new(BTreeMap::new()),
                supplies: Mutex::new(BTreeMap::new()),
                irqs: Mutex::new(HashMap::new()),
                next_irq: AtomicU32::new(1),
                faults: Mutex::new(Vec::new()),
                board: AttributeBoard::new(),
            }),
        }
    }

    /// Provider bundle for the lifecycle controller
    pub fn platform(&self) -> Platform {
        Platform {
            features: self.shared.config.features,
            gpio: Arc::new(self.clone()),
            pinctrl: Arc::new(self.clone()),
            supplies: Arc::new(self.clone()),
            irq: Arc::new(self.clone()),
            wake: Arc::new(self.clone()),
            attrs: Arc::new(self.clone()),
        }
    }

    /// Attribute board observers can wait on
    pub fn board(&self) -> &AttributeBoard {
        &self.shared.board
    }

    /// Arm a fault
    pub fn inject(&self, fault: Fault) {
        lock(&self.shared.faults).push(fault);
    }

    /// Disarm every fault
    pub fn clear_faults(&self) {
        lock(&self.shared.faults).clear();
    }

    fn faulted(&self, fault: &Fault) -> bool {
        lock(&self.shared.faults).contains(fault)
    }

    fn record(&self, event: HwEvent) {
        log::trace!("dummy: {:?}", event);
        lock(&self.shared.journal).push((Instant::now(), event));
    }

    /// Journal without timestamps
    pub fn events(&self) -> Vec<HwEvent> {
        lock(&self.shared.journal)
            .iter()
            .map(|(_, e)| e.clone())
            .collect()
    }

    /// Journal with timestamps
    pub fn timed_events(&self) -> Vec<(Instant, HwEvent)> {
        lock(&self.shared.journal).clone()
    }

    /// Forget the journal
    pub fn clear_events(&self) {
        lock(&self.shared.journal).clear();
    }

    /// Number of journal entries matching `pred`
    pub fn count(&self, pred: impl Fn(&HwEvent) -> bool) -> usize {
        lock(&self.shared.journal)
            .iter()
            .filter(|(_, e)| pred(e))
            .count()
    }

    /// Lines currently claimed
    pub fn claimed_lines(&self) -> Vec<LineId> {
        lock(&self.shared.lines)
            .iter()
            .filter(|(_, l)| l.owner.is_some())
            .map(|(line, _)| *line)
            .collect()
    }

    /// Supply ids currently claimed
    pub fn claimed_supplies(&self) -> Vec<String> {
        lock(&self.shared.supplies)
            .iter()
            .filter(|(_, s)| s.claimed)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Whether a supply is switched on
    pub fn supply_enabled(&self, id: &str) -> bool {
        lock(&self.shared.supplies)
            .get(id)
            .is_some_and(|s| s.enabled)
    }

    /// Interrupts currently registered
    pub fn registered_irqs(&self) -> usize {
        lock(&self.shared.irqs).len()
    }

    /// Whether a registered interrupt is wake capable
    pub fn irq_wake_enabled(&self, line: LineId) -> bool {
        lock(&self.shared.irqs)
            .values()
            .any(|slot| slot.line == line && slot.wake)
    }

    /// Current level of a line
    pub fn line_level(&self, line: LineId) -> Level {
        lock(&self.shared.lines)
            .get(&line)
            .map_or(self.shared.config.idle_level, |l| l.level)
    }

    /// Drive an input line from the outside
    ///
    /// A low-to-high transition fires rising-edge interrupts on that line.
    pub fn set_input_level(&self, line: LineId, level: Level) {
        let previous = {
            let mut lines = lock(&self.shared.lines);
            let sim = lines.entry(line).or_insert_with(|| LineSim {
                owner: None,
                output: false,
                level: self.shared.config.idle_level,
            });
            std::mem::replace(&mut sim.level, level)
        };
        if previous == Level::Low && level == Level::High {
            self.fire(line);
        }
    }

    /// Raise a rising edge on `line` and return to the previous level
    pub fn trigger_edge(&self, line: LineId) {
        let previous = self.line_level(line);
        self.set_input_level(line, Level::Low);
        self.set_input_level(line, Level::High);
        self.set_input_level(line, previous);
    }

    fn fire(&self, line: LineId) {
        // Handlers run under the lock so free_irq cannot return mid-dispatch
        let irqs = lock(&self.shared.irqs);
        for slot in irqs.values().filter(|s| s.line == line) {
            (slot.handler)();
        }
    }

    fn start_ticker(&self, irq: u32, period: Duration) -> (Arc<AtomicBool>, JoinHandle<()>) {
        let stop = Arc::new(AtomicBool::new(false));
        let handle = {
            let stop = Arc::clone(&stop);
            let shared = Arc::clone(&self.shared);
            thread::spawn(move || loop {
                thread::sleep(period);
                if stop.load(Ordering::Acquire) {
                    break;
                }
                let irqs = lock(&shared.irqs);
                if let Some(slot) = irqs.get(&irq) {
                    (slot.handler)();
                }
            })
        };
        (stop, handle)
    }

    fn with_claimed<R>(
        &self,
        line: LineId,
        op: &'static str,
        f: impl FnOnce(&mut LineSim) -> R,
    ) -> Result<R> {
        let mut lines = lock(&self.shared.lines);
        match lines.get_mut(&line) {
            Some(sim) if sim.owner.is_some() => Ok(f(sim)),
            _ => Err(Error::LineFailed {
                line,
                op,
                reason: "line not requested".into(),
            }),
        }
    }
}

fn injected(line: LineId, op: &'static str) -> Error {
    Error::LineFailed {
        line,
        op,
        reason: "injected fault".into(),
    }
}

impl GpioProvider for DummyPlatform {
    fn request(&self, line: LineId, label: &str) -> Result<()> {
        if self.faulted(&Fault::Request(line)) {
            return Err(Error::ClaimFailed {
                name: label.to_string(),
                reason: "injected fault".into(),
            });
        }
        {
            let mut lines = lock(&self.shared.lines);
            let idle = self.shared.config.idle_level;
            let sim = lines.entry(line).or_insert_with(|| LineSim {
                owner: None,
                output: false,
                level: idle,
            });
            if sim.owner.is_some() {
                return Err(Error::AlreadyInUse {
                    name: label.to_string(),
                });
            }
            sim.owner = Some(label.to_string());
        }
        self.record(HwEvent::LineRequested(line));
        Ok(())
    }

    fn free(&self, line: LineId) {
        if let Some(sim) = lock(&self.shared.lines).get_mut(&line) {
            sim.owner = None;
            sim.output = false;
        }
        self.record(HwEvent::LineFreed(line));
    }

    fn direction_output(&self, line: LineId, level: Level) -> Result<()> {
        if self.faulted(&Fault::Direction(line)) {
            return Err(injected(line, "direction"));
        }
        self.with_claimed(line, "direction", |sim| {
            sim.output = true;
            sim.level = level;
        })?;
        self.record(HwEvent::LineOutput(line, level));
        Ok(())
    }

    fn direction_input(&self, line: LineId) -> Result<()> {
        if self.faulted(&Fault::Direction(line)) {
            return Err(injected(line, "direction"));
        }
        self.with_claimed(line, "direction", |sim| sim.output = false)?;
        self.record(HwEvent::LineInput(line));
        Ok(())
    }

    fn set_level(&self, line: LineId, level: Level) -> Result<()> {
        if self.faulted(&Fault::SetLevel(line)) {
            return Err(injected(line, "set"));
        }
        let output = self.with_claimed(line, "set", |sim| {
            if sim.output {
                sim.level = level;
            }
            sim.output
        })?;
        if !output {
            return Err(Error::LineFailed {
                line,
                op: "set",
                reason: "line is an input".into(),
            });
        }
        self.record(HwEvent::LineSet(line, level));
        Ok(())
    }

    fn level(&self, line: LineId) -> Result<Level> {
        self.with_claimed(line, "get", |sim| sim.level)
    }
}

struct DummyPinControl {
    platform: DummyPlatform,
    consumer: String,
}

impl PinctrlProvider for DummyPlatform {
    fn get(&self, consumer: &str) -> Result<Box<dyn PinControl>> {
        if self.faulted(&Fault::PinctrlGet) {
            return Err(Error::NoPinControl);
        }
        self.record(HwEvent::PinctrlGet(consumer.to_string()));
        Ok(Box::new(DummyPinControl {
            platform: self.clone(),
            consumer: consumer.to_string(),
        }))
    }
}

impl PinControl for DummyPinControl {
    fn lookup_state(&self, name: &str) -> Result<PinStateHandle> {
        if self.platform.faulted(&Fault::StateLookup(name.to_string())) {
            return Err(Error::StateLookupFailed(name.to_string()));
        }
        self.platform
            .shared
            .config
            .pin_states
            .iter()
            .position(|s| s == name)
            .map(|index| PinStateHandle::new(name, index))
            .ok_or_else(|| Error::StateLookupFailed(name.to_string()))
    }

    fn select_state(&self, state: &PinStateHandle) -> Result<()> {
        if self
            .platform
            .faulted(&Fault::SelectState(state.name().to_string()))
        {
            return Err(Error::PinSelectFailed {
                state: state.name().to_string(),
                reason: "injected fault".into(),
            });
        }
        self.platform
            .record(HwEvent::PinStateSelected(state.name().to_string()));
        Ok(())
    }
}

impl Drop for DummyPinControl {
    fn drop(&mut self) {
        self.platform
            .record(HwEvent::PinctrlPut(self.consumer.clone()));
    }
}

impl SupplyProvider for DummyPlatform {
    fn get(&self, name: &str, id: &str) -> Result<SupplyHandle> {
        if self.faulted(&Fault::SupplyGet(id.to_string())) {
            return Err(Error::ClaimFailed {
                name: name.to_string(),
                reason: "injected fault".into(),
            });
        }
        {
            let mut supplies = lock(&self.shared.supplies);
            let sim = supplies.entry(id.to_string()).or_default();
            if sim.claimed {
                return Err(Error::AlreadyInUse {
                    name: name.to_string(),
                });
            }
            sim.claimed = true;
        }
        self.record(HwEvent::SupplyGet(id.to_string()));
        Ok(SupplyHandle::new(name, id))
    }

    fn put(&self, supply: SupplyHandle) {
        if let Some(sim) = lock(&self.shared.supplies).get_mut(supply.id()) {
            sim.claimed = false;
        }
        self.record(HwEvent::SupplyPut(supply.id().to_string()));
    }

    fn enable(&self, supply: &SupplyHandle) -> Result<()> {
        if self.faulted(&Fault::SupplyEnable) {
            return Err(Error::Backend("injected regulator fault".into()));
        }
        if let Some(sim) = lock(&self.shared.supplies).get_mut(supply.id()) {
            sim.enabled = true;
        }
        self.record(HwEvent::SupplyEnabled(supply.id().to_string()));
        Ok(())
    }

    fn disable(&self, supply: &SupplyHandle) -> Result<()> {
        if let Some(sim) = lock(&self.shared.supplies).get_mut(supply.id()) {
            sim.enabled = false;
        }
        self.record(HwEvent::SupplyDisabled(supply.id().to_string()));
        Ok(())
    }
}

impl IrqProvider for DummyPlatform {
    fn request_irq(
        &self,
        line: LineId,
        trigger: Trigger,
        name: &str,
        handler: IrqHandler,
    ) -> Result<IrqId> {
        if self.faulted(&Fault::RequestIrq) {
            return Err(Error::IrqRequestFailed {
                line,
                reason: "injected fault".into(),
            });
        }
        if trigger != Trigger::RisingEdge {
            return Err(Error::Unsupported("falling-edge interrupts"));
        }
        let id = self.shared.next_irq.fetch_add(1, Ordering::AcqRel);
        let ticker = self
            .shared
            .config
            .edge_period
            .map(|period| self.start_ticker(id, period));
        lock(&self.shared.irqs).insert(
            id,
            IrqSlot {
                line,
                handler,
                wake: false,
                ticker,
            },
        );
        log::debug!("dummy: irq {} for '{}' on line {}", id, name, line);
        self.record(HwEvent::IrqRequested(line, IrqId(id)));
        Ok(IrqId(id))
    }

    fn enable_wake(&self, irq: IrqId) -> Result<()> {
        match lock(&self.shared.irqs).get_mut(&irq.0) {
            Some(slot) => slot.wake = true,
            None => return Err(Error::Unsupported("wake on unknown irq")),
        }
        self.record(HwEvent::IrqWakeEnabled(irq));
        Ok(())
    }

    fn free_irq(&self, irq: IrqId) {
        let slot = lock(&self.shared.irqs).remove(&irq.0);
        if let Some((stop, handle)) = slot.and_then(|s| s.ticker) {
            stop.store(true, Ordering::Release);
            let _ = handle.join();
        }
        self.record(HwEvent::IrqFreed(irq));
    }
}

impl WakeProvider for DummyPlatform {
    fn hold(&self, tag: &str, timeout: Duration) -> Result<()> {
        if self.faulted(&Fault::WakeHold) {
            return Err(Error::Backend("injected wake lock fault".into()));
        }
        self.record(HwEvent::WakeHeld(tag.to_string(), timeout));
        Ok(())
    }
}

impl AttributeHost for DummyPlatform {
    fn publish(&self, device: &str, attrs: &[AttrSpec]) -> Result<()> {
        if self.faulted(&Fault::Publish) {
            return Err(Error::PublishFailed {
                device: device.to_string(),
                reason: "injected fault".into(),
            });
        }
        self.shared.board.publish(device, attrs)?;
        self.record(HwEvent::AttrsPublished(device.to_string()));
        Ok(())
    }

    fn withdraw(&self, device: &str) {
        self.shared.board.withdraw(device);
        self.record(HwEvent::AttrsWithdrawn(device.to_string()));
    }

    fn notify(&self, device: &str, attr: &str) {
        self.shared.board.notify(device, attr);
    }
}
