//! Device lifecycle controller
//!
//! Attach walks a sensor through
//!
//! ```text
//! Unattached -> ResourcesBound -> PinControlReady -> Powered
//!            -> Registered -> IrqArmed -> Operational
//! ```
//!
//! Every resource taken on the way is recorded in an ordered ledger. When a
//! step fails, the device enters `TearingDown` and the ledger is unwound in
//! reverse by a single routine, the same one detach uses. There is no retry
//! within one attach.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::attr::{sensor_attributes, Attribute, WakeupCommand};
use crate::config::SensorConfig;
use crate::error::{Error, Result};
use crate::hal::{GpioProvider, Level, LineId, Platform, PlatformFeatures, SupplyHandle};
use crate::irq::{BridgeConfig, IrqBridge, IrqState};
use crate::pinctrl::{PinState, PinStates};
use crate::power::{PowerDomain, PowerSequencer};
use crate::registry::{Minor, Registry};
use crate::reset::pulse_reset;
use crate::resource::{Acquirer, LineHandle, LineRole};
use crate::variant::{PowerScheme, SensorVariant};

/// Lifecycle state of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Nothing held
    Unattached,
    /// Lines and supplies claimed
    ResourcesBound,
    /// Pin states resolved and "active" applied
    PinControlReady,
    /// Power domain on
    Powered,
    /// Identity allocated and attributes published
    Registered,
    /// Interrupt handler registered
    IrqArmed,
    /// Reset released, device in service
    Operational,
    /// Unwinding the ledger
    TearingDown,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unattached => "unattached",
            Self::ResourcesBound => "resources-bound",
            Self::PinControlReady => "pinctrl-ready",
            Self::Powered => "powered",
            Self::Registered => "registered",
            Self::IrqArmed => "irq-armed",
            Self::Operational => "operational",
            Self::TearingDown => "tearing-down",
        };
        f.write_str(s)
    }
}

/// A resource recorded in the teardown ledger
#[derive(Debug)]
enum Acquired {
    Line(LineHandle),
    Supply(SupplyHandle),
    PinControl,
    Power,
    Identity(Minor),
    Attributes(String),
    Irq(IrqBridge),
}

/// Mutable per-device state, serialized by the device lock
#[derive(Debug)]
struct DeviceContext {
    name: String,
    state: LifecycleState,
    ledger: Vec<Acquired>,
    pins: PinStates,
    power: Option<PowerSequencer>,
    enables: Vec<LineId>,
    reset: Option<LineId>,
    irq: Option<LineId>,
    minor: Option<Minor>,
}

impl DeviceContext {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: LifecycleState::Unattached,
            ledger: Vec::new(),
            pins: PinStates::new(),
            power: None,
            enables: Vec::new(),
            reset: None,
            irq: None,
            minor: None,
        }
    }

    fn enter(&mut self, next: LifecycleState) {
        log::debug!("{}: {} -> {}", self.name, self.state, next);
        self.state = next;
    }
}

struct BoundLines {
    minor: Minor,
    reset: LineId,
    irq: LineId,
}

/// Attaches sensors to a platform
#[derive(Debug, Clone)]
pub struct Controller {
    platform: Platform,
    registry: Arc<Registry>,
}

impl Controller {
    /// Create a controller over a platform and a shared registry
    pub fn new(platform: Platform, registry: Arc<Registry>) -> Self {
        Self { platform, registry }
    }

    /// Registry this controller allocates identities from
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Platform providers
    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Bring a sensor up to `Operational`
    ///
    /// On failure everything acquired so far is released in reverse order
    /// before the error is returned.
    pub fn attach(&self, config: &SensorConfig) -> Result<SensorDevice> {
        config.validate()?;
        let profile = config.profile();
        let mut ctx = DeviceContext::new(profile.dev_name);
        let irq_state = Arc::new(IrqState::new(false));

        log::info!("{}: attaching {} sensor", profile.dev_name, config.variant);
        let bound = match self.bring_up(config, &mut ctx, &irq_state) {
            Ok(bound) => bound,
            Err(e) => {
                log::error!("{}: attach failed in {}: {}", ctx.name, ctx.state, e);
                ctx.enter(LifecycleState::TearingDown);
                teardown(&self.platform, &self.registry, config, &mut ctx);
                ctx.enter(LifecycleState::Unattached);
                return Err(e);
            }
        };

        log::info!("{}: operational", ctx.name);
        Ok(SensorDevice {
            name: ctx.name.clone(),
            minor: bound.minor,
            variant: config.variant,
            config: config.clone(),
            reset_line: bound.reset,
            platform: self.platform.clone(),
            registry: Arc::clone(&self.registry),
            attrs: AttributeHandle {
                device: ctx.name.clone(),
                gpio: Arc::clone(&self.platform.gpio),
                irq_line: bound.irq,
                state: irq_state,
            },
            ctx: Mutex::new(ctx),
        })
    }

    fn check_features(&self, config: &SensorConfig) -> Result<()> {
        let features = self.platform.features;
        if let PowerScheme::Regulator(_) = config.profile().power {
            if !features.contains(PlatformFeatures::REGULATORS) {
                return Err(Error::Unsupported("regulated supplies"));
            }
        }
        if !features.contains(PlatformFeatures::PIN_CONTROL) {
            return Err(Error::NoPinControl);
        }
        Ok(())
    }

    fn bring_up(
        &self,
        config: &SensorConfig,
        ctx: &mut DeviceContext,
        irq_state: &Arc<IrqState>,
    ) -> Result<BoundLines> {
        let profile = config.profile();
        let platform = &self.platform;
        self.check_features(config)?;

        // Lines and supplies
        let acquirer = Acquirer::new(config, platform.gpio.as_ref(), platform.supplies.as_ref());
        let domain = match profile.power {
            PowerScheme::EnableLines(names) => {
                for name in names {
                    let handle = acquirer.acquire_line(name, LineRole::PowerEnable)?;
                    ctx.enables.push(handle.line());
                    ctx.ledger.push(Acquired::Line(handle));
                }
                PowerDomain::Lines(ctx.enables.clone())
            }
            PowerScheme::Regulator(name) => {
                let supply = acquirer.acquire_supply(name)?;
                ctx.ledger.push(Acquired::Supply(supply.clone()));
                PowerDomain::Supply(supply)
            }
        };
        let reset = acquirer.acquire_line(profile.reset_line, LineRole::Reset)?;
        let reset_line = reset.line();
        ctx.reset = Some(reset_line);
        ctx.ledger.push(Acquired::Line(reset));
        let irq = acquirer.acquire_line(profile.irq_line, LineRole::Irq)?;
        let irq_line = irq.line();
        ctx.irq = Some(irq_line);
        ctx.ledger.push(Acquired::Line(irq));
        ctx.power = Some(PowerSequencer::new(profile.dev_name, domain));
        ctx.enter(LifecycleState::ResourcesBound);

        // Pin control
        ctx.pins
            .init(platform.pinctrl.as_ref(), profile.dev_name, &config.pinctrl)?;
        ctx.ledger.push(Acquired::PinControl);
        ctx.pins.select(PinState::Active)?;
        ctx.enter(LifecycleState::PinControlReady);

        // Power
        if let Some(power) = ctx.power.as_mut() {
            power.set_power(platform.gpio.as_ref(), platform.supplies.as_ref(), true)?;
            ctx.ledger.push(Acquired::Power);
        }
        ctx.enter(LifecycleState::Powered);

        // Identity and attributes
        let minor = self.registry.allocate(profile.dev_name)?;
        ctx.minor = Some(minor);
        ctx.ledger.push(Acquired::Identity(minor));
        ctx.name = format!("{}.{}", profile.dev_name, minor);
        platform.attrs.publish(&ctx.name, &sensor_attributes())?;
        ctx.ledger.push(Acquired::Attributes(ctx.name.clone()));
        ctx.enter(LifecycleState::Registered);

        // Interrupt
        let bridge = IrqBridge::arm(
            platform,
            BridgeConfig {
                device: ctx.name.clone(),
                line: irq_line,
                wake_hold: config.wake_hold,
            },
            Arc::clone(irq_state),
        )?;
        ctx.ledger.push(Acquired::Irq(bridge));
        ctx.enter(LifecycleState::IrqArmed);

        // Reset
        pulse_reset(platform.gpio.as_ref(), reset_line, &config.timing, None)?;
        ctx.enter(LifecycleState::Operational);
        Ok(BoundLines {
            minor,
            reset: reset_line,
            irq: irq_line,
        })
    }
}

/// Unwind the ledger in reverse acquisition order
fn teardown(
    platform: &Platform,
    registry: &Registry,
    config: &SensorConfig,
    ctx: &mut DeviceContext,
) {
    let gpio = platform.gpio.as_ref();
    let acquirer = Acquirer::new(config, gpio, platform.supplies.as_ref());
    while let Some(entry) = ctx.ledger.pop() {
        match entry {
            Acquired::Irq(mut bridge) => bridge.disarm(),
            Acquired::Attributes(name) => platform.attrs.withdraw(&name),
            Acquired::Identity(minor) => {
                registry.release(minor);
                ctx.minor = None;
            }
            Acquired::Power => {
                if let Some(power) = ctx.power.as_mut().filter(|p| p.is_on()) {
                    if let Err(e) =
                        power.set_power(gpio, platform.supplies.as_ref(), false)
                    {
                        log::warn!("{}: power off during teardown: {}", ctx.name, e);
                    }
                }
            }
            Acquired::PinControl => ctx.pins.release(),
            Acquired::Supply(supply) => acquirer.release_supply(supply),
            Acquired::Line(handle) => acquirer.release_line(handle),
        }
    }
    ctx.power = None;
    ctx.enables.clear();
    ctx.reset = None;
    ctx.irq = None;
}

/// Snapshot of a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceStatus {
    /// Published name
    pub name: String,
    /// Sensor family
    pub variant: SensorVariant,
    /// Lifecycle state
    pub state: LifecycleState,
    /// Power domain on
    pub power_on: bool,
    /// Pin state applied
    pub pin_state: PinState,
    /// Wake-on-interrupt policy
    pub wakeup_enabled: bool,
    /// Edges seen
    pub edges: u64,
    /// Notifications delivered
    pub notifications: u64,
    /// Wake assertions taken
    pub wake_holds: u64,
}

/// Attribute access for a device, cheap to clone across threads
#[derive(Clone)]
pub struct AttributeHandle {
    device: String,
    gpio: Arc<dyn GpioProvider>,
    irq_line: LineId,
    state: Arc<IrqState>,
}

impl fmt::Debug for AttributeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeHandle")
            .field("device", &self.device)
            .field("irq_line", &self.irq_line)
            .finish_non_exhaustive()
    }
}

impl AttributeHandle {
    /// Published device name
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Read an attribute as text
    pub fn read(&self, name: &str) -> Result<String> {
        match Attribute::from_name(name)? {
            Attribute::Irq => Ok(format!("{}\n", self.irq_level()?)),
            Attribute::WakeupEnable => Err(Error::AttributeAccess(name.to_string())),
        }
    }

    /// Write raw bytes to an attribute
    pub fn write(&self, name: &str, input: &[u8]) -> Result<()> {
        match Attribute::from_name(name)? {
            Attribute::WakeupEnable => {
                let command = WakeupCommand::parse(input).map_err(|e| {
                    log::warn!("{}: rejected wakeup_enable write", self.device);
                    e
                })?;
                self.set_wakeup_enabled(command.enabled());
                Ok(())
            }
            Attribute::Irq => {
                log::info!("{}: irq latency probe", self.device);
                Ok(())
            }
        }
    }

    /// Instantaneous level of the interrupt line
    pub fn irq_level(&self) -> Result<Level> {
        self.gpio.level(self.irq_line)
    }

    /// Wake-on-interrupt policy
    pub fn wakeup_enabled(&self) -> bool {
        self.state.wakeup_enabled()
    }

    /// Change the wake-on-interrupt policy
    pub fn set_wakeup_enabled(&self, enabled: bool) {
        self.state.set_wakeup_enabled(enabled);
        log::debug!(
            "{}: wakeup {}",
            self.device,
            if enabled { "enabled" } else { "disabled" }
        );
    }

    /// Interrupt counters
    pub fn irq_state(&self) -> &IrqState {
        &self.state
    }
}

/// An attached sensor
///
/// Dropping the device detaches it.
#[derive(Debug)]
pub struct SensorDevice {
    name: String,
    minor: Minor,
    variant: SensorVariant,
    config: SensorConfig,
    reset_line: LineId,
    platform: Platform,
    registry: Arc<Registry>,
    attrs: AttributeHandle,
    ctx: Mutex<DeviceContext>,
}

impl SensorDevice {
    fn lock(&self) -> MutexGuard<'_, DeviceContext> {
        self.ctx.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Published name, `<dev-name>.<minor>`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Allocated minor
    pub fn minor(&self) -> Minor {
        self.minor
    }

    /// Sensor family
    pub fn variant(&self) -> SensorVariant {
        self.variant
    }

    /// Lifecycle state
    pub fn state(&self) -> LifecycleState {
        self.lock().state
    }

    /// Switch the power domain
    pub fn set_power(&self, on: bool) -> Result<()> {
        let mut ctx = self.lock();
        match ctx.power.as_mut() {
            Some(power) => power.set_power(
                self.platform.gpio.as_ref(),
                self.platform.supplies.as_ref(),
                on,
            ),
            None => Err(Error::PowerFailed {
                on,
                reason: "device detached".to_string(),
            }),
        }
    }

    /// Whether the power domain is on
    pub fn power_on(&self) -> bool {
        self.lock().power.as_ref().is_some_and(|p| p.is_on())
    }

    /// Apply the active or suspend pin state
    pub fn set_pin_state(&self, state: PinState) -> Result<()> {
        self.lock().pins.select(state)
    }

    /// Pin state applied
    pub fn pin_state(&self) -> PinState {
        self.lock().pins.current()
    }

    /// Pulse the reset line
    ///
    /// Power must be on and the active pin state applied. `settle` overrides
    /// the final hold on variants that take one. Returns the final hold used.
    pub fn reset(&self, settle: Option<Duration>) -> Result<Duration> {
        let ctx = self.lock();
        if !ctx.power.as_ref().is_some_and(|p| p.is_on()) {
            log::warn!("{}: reset refused, power is off", self.name);
            return Err(Error::NotReady {
                op: "reset",
                reason: "power is off",
            });
        }
        if ctx.pins.current() != PinState::Active {
            log::warn!("{}: reset refused, pins are {}", self.name, ctx.pins.current());
            return Err(Error::NotReady {
                op: "reset",
                reason: "pins are not active",
            });
        }
        pulse_reset(
            self.platform.gpio.as_ref(),
            self.reset_line,
            &self.config.timing,
            settle,
        )
    }

    /// Wake-on-interrupt policy
    pub fn wakeup_enabled(&self) -> bool {
        self.attrs.wakeup_enabled()
    }

    /// Change the wake-on-interrupt policy
    pub fn set_wakeup_enabled(&self, enabled: bool) {
        self.attrs.set_wakeup_enabled(enabled)
    }

    /// Instantaneous level of the interrupt line
    pub fn irq_level(&self) -> Result<Level> {
        self.attrs.irq_level()
    }

    /// Edges seen since attach
    pub fn edge_count(&self) -> u64 {
        self.attrs.irq_state().edge_count()
    }

    /// Read an attribute
    pub fn read_attr(&self, name: &str) -> Result<String> {
        self.attrs.read(name)
    }

    /// Write an attribute
    pub fn write_attr(&self, name: &str, input: &[u8]) -> Result<()> {
        self.attrs.write(name, input)
    }

    /// Attribute handle for use from other threads
    pub fn attributes(&self) -> AttributeHandle {
        self.attrs.clone()
    }

    /// Snapshot of the device
    pub fn status(&self) -> DeviceStatus {
        let ctx = self.lock();
        let irq = self.attrs.irq_state();
        DeviceStatus {
            name: self.name.clone(),
            variant: self.variant,
            state: ctx.state,
            power_on: ctx.power.as_ref().is_some_and(|p| p.is_on()),
            pin_state: ctx.pins.current(),
            wakeup_enabled: irq.wakeup_enabled(),
            edges: irq.edge_count(),
            notifications: irq.notification_count(),
            wake_holds: irq.wake_hold_count(),
        }
    }

    /// Tear the device down
    pub fn detach(self) {
        self.shutdown();
    }

    fn shutdown(&self) {
        let mut ctx = self.lock();
        if ctx.state == LifecycleState::Unattached {
            return;
        }
        log::info!("{}: detaching", ctx.name);
        ctx.enter(LifecycleState::TearingDown);
        teardown(&self.platform, &self.registry, &self.config, &mut ctx);
        ctx.enter(LifecycleState::Unattached);
    }
}

impl Drop for SensorDevice {
    fn drop(&mut self) {
        self.shutdown();
    }
}
