//! Provider trait definitions
//!
//! All provider methods take `&self`: the same provider is shared between
//! the lifecycle controller, attribute handlers and the interrupt path, so
//! implementations use interior locking where they keep state.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bitflags::bitflags;

use crate::attr::AttrSpec;
use crate::error::Result;

/// Physical line identifier (offset on the GPIO controller)
pub type LineId = u32;

/// Digital line level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    /// Logic low
    Low,
    /// Logic high
    High,
}

impl Level {
    /// Level as `0` / `1`
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::High => 1,
        }
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Self::High
        } else {
            Self::Low
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

bitflags! {
    /// Platform capability flags
    ///
    /// A backend reports what its host can do; the controller checks these
    /// against the sensor variant before acquiring anything.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PlatformFeatures: u32 {
        /// Regulated supplies can be switched
        const REGULATORS  = 1 << 0;
        /// Interrupts can be marked as wake sources
        const WAKE_IRQ    = 1 << 1;
        /// Bounded wake assertions are honoured
        const WAKE_LOCK   = 1 << 2;
        /// Named pin states can be applied
        const PIN_CONTROL = 1 << 3;

        /// Everything
        const ALL = Self::REGULATORS.bits()
            | Self::WAKE_IRQ.bits()
            | Self::WAKE_LOCK.bits()
            | Self::PIN_CONTROL.bits();
    }
}

impl Default for PlatformFeatures {
    fn default() -> Self {
        PlatformFeatures::empty()
    }
}

/// GPIO subsystem
pub trait GpioProvider: Send + Sync {
    /// Claim a line exclusively
    ///
    /// Fails with [`Error::AlreadyInUse`](crate::Error::AlreadyInUse) if
    /// another consumer holds it.
    fn request(&self, line: LineId, label: &str) -> Result<()>;

    /// Release a line previously claimed with [`request`](Self::request)
    fn free(&self, line: LineId);

    /// Configure a claimed line as output with an initial level
    fn direction_output(&self, line: LineId, level: Level) -> Result<()>;

    /// Configure a claimed line as input
    fn direction_input(&self, line: LineId) -> Result<()>;

    /// Drive an output line
    fn set_level(&self, line: LineId, level: Level) -> Result<()>;

    /// Sample the instantaneous level of a line
    fn level(&self, line: LineId) -> Result<Level>;
}

/// Resolved pin state, only valid for the [`PinControl`] that returned it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinStateHandle {
    name: String,
    index: usize,
}

impl PinStateHandle {
    /// Create a handle; `index` is backend private
    pub fn new(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            index,
        }
    }

    /// State name as looked up
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backend private index
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Pin-control subsystem
pub trait PinctrlProvider: Send + Sync {
    /// Get the pin-control handle of a consumer
    ///
    /// Dropping the returned handle releases it.
    fn get(&self, consumer: &str) -> Result<Box<dyn PinControl>>;
}

/// Pin-control handle of one consumer
pub trait PinControl: Send {
    /// Resolve a named state
    fn lookup_state(&self, name: &str) -> Result<PinStateHandle>;

    /// Apply a resolved state to the consumer's pin group
    fn select_state(&self, state: &PinStateHandle) -> Result<()>;
}

/// Claimed regulated supply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupplyHandle {
    name: String,
    id: String,
}

impl SupplyHandle {
    /// Create a handle for logical `name` bound to provider `id`
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
        }
    }

    /// Logical name (e.g. `vdd`)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Provider identifier
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Regulator subsystem
pub trait SupplyProvider: Send + Sync {
    /// Claim the supply named `id` under logical name `name`
    fn get(&self, name: &str, id: &str) -> Result<SupplyHandle>;

    /// Release a claimed supply
    fn put(&self, supply: SupplyHandle);

    /// Switch the supply on
    fn enable(&self, supply: &SupplyHandle) -> Result<()>;

    /// Switch the supply off
    fn disable(&self, supply: &SupplyHandle) -> Result<()>;
}

/// Interrupt trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Low to high transition
    RisingEdge,
    /// High to low transition
    FallingEdge,
}

/// Registered interrupt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IrqId(pub u32);

impl fmt::Display for IrqId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Interrupt handler, invoked from the host's event context
pub type IrqHandler = Arc<dyn Fn() + Send + Sync>;

/// Interrupt delivery
pub trait IrqProvider: Send + Sync {
    /// Register `handler` for `trigger` transitions on `line`
    fn request_irq(
        &self,
        line: LineId,
        trigger: Trigger,
        name: &str,
        handler: IrqHandler,
    ) -> Result<IrqId>;

    /// Allow the interrupt to wake the host from suspend
    fn enable_wake(&self, irq: IrqId) -> Result<()>;

    /// Unregister; the handler is never invoked after this returns
    fn free_irq(&self, irq: IrqId);
}

/// Wake assertions
pub trait WakeProvider: Send + Sync {
    /// Keep the host out of suspend for at most `timeout`
    fn hold(&self, tag: &str, timeout: Duration) -> Result<()>;
}

/// Attribute exposure to external observers
pub trait AttributeHost: Send + Sync {
    /// Expose a device's attributes
    fn publish(&self, device: &str, attrs: &[AttrSpec]) -> Result<()>;

    /// Remove a device's attributes
    fn withdraw(&self, device: &str);

    /// Wake observers waiting on `attr`
    fn notify(&self, device: &str, attr: &str);
}

/// Provider bundle handed to the lifecycle controller
#[derive(Clone)]
pub struct Platform {
    /// Capabilities of this host
    pub features: PlatformFeatures,
    /// GPIO lines
    pub gpio: Arc<dyn GpioProvider>,
    /// Pin control
    pub pinctrl: Arc<dyn PinctrlProvider>,
    /// Regulators
    pub supplies: Arc<dyn SupplyProvider>,
    /// Interrupt delivery
    pub irq: Arc<dyn IrqProvider>,
    /// Wake assertions
    pub wake: Arc<dyn WakeProvider>,
    /// Attribute exposure
    pub attrs: Arc<dyn AttributeHost>,
}

impl fmt::Debug for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Platform")
            .field("features", &self.features)
            .finish_non_exhaustive()
    }
}
