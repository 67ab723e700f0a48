//! Interrupt bridge
//!
//! The handler registered with the [`IrqProvider`] runs in the host's event
//! context and does as little as possible: it bumps the edge counter and
//! queues an [`EdgeEvent`]. A consumer thread per device drains the queue,
//! takes a bounded wake assertion when the wake policy allows it, then
//! notifies observers of the `irq` attribute. One edge, one notification.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::attr::ATTR_IRQ;
use crate::error::{Error, Result};
use crate::hal::{IrqHandler, IrqId, LineId, Platform, PlatformFeatures, Trigger};

/// A rising edge seen by the handler
#[derive(Debug, Clone, Copy)]
pub struct EdgeEvent {
    /// Edge number, starting at 1
    pub seq: u64,
    /// When the handler ran
    pub at: Instant,
    /// Wake policy when the edge happened
    pub wake: bool,
}

enum BridgeMsg {
    Edge(EdgeEvent),
    Shutdown,
}

/// State shared between the handler, the consumer and attribute handlers
#[derive(Debug, Default)]
pub struct IrqState {
    wakeup_enabled: AtomicBool,
    edges: AtomicU64,
    notifications: AtomicU64,
    wake_holds: AtomicU64,
    last_edge: Mutex<Option<Instant>>,
}

impl IrqState {
    /// New state with the given wake policy
    pub fn new(wakeup_enabled: bool) -> Self {
        Self {
            wakeup_enabled: AtomicBool::new(wakeup_enabled),
            ..Default::default()
        }
    }

    /// Wake-on-interrupt policy
    pub fn wakeup_enabled(&self) -> bool {
        self.wakeup_enabled.load(Ordering::Acquire)
    }

    /// Change the wake-on-interrupt policy
    pub fn set_wakeup_enabled(&self, enabled: bool) {
        self.wakeup_enabled.store(enabled, Ordering::Release);
    }

    /// Edges seen by the handler
    pub fn edge_count(&self) -> u64 {
        self.edges.load(Ordering::Acquire)
    }

    /// Notifications delivered to observers
    pub fn notification_count(&self) -> u64 {
        self.notifications.load(Ordering::Acquire)
    }

    /// Wake assertions taken
    pub fn wake_hold_count(&self) -> u64 {
        self.wake_holds.load(Ordering::Acquire)
    }

    /// Count a new edge and capture the wake policy in force for it
    pub fn record_edge(&self) -> EdgeEvent {
        let wake = self.wakeup_enabled();
        let seq = self.edges.fetch_add(1, Ordering::AcqRel) + 1;
        EdgeEvent {
            seq,
            at: Instant::now(),
            wake,
        }
    }

    /// Time of the last edge the consumer processed
    pub fn last_edge(&self) -> Option<Instant> {
        *self.last_edge.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Parameters for arming a bridge
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Published device name, used as IRQ name, wake tag and notify target
    pub device: String,
    /// Interrupt line
    pub line: LineId,
    /// Wake assertion window
    pub wake_hold: Duration,
}

/// An armed interrupt and its consumer thread
#[derive(Debug)]
pub struct IrqBridge {
    device: String,
    irq: Option<IrqId>,
    platform: Platform,
    tx: Sender<BridgeMsg>,
    consumer: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for BridgeMsg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Edge(ev) => write!(f, "Edge({})", ev.seq),
            Self::Shutdown => write!(f, "Shutdown"),
        }
    }
}

impl IrqBridge {
    /// Register the rising-edge handler and start the consumer
    pub fn arm(platform: &Platform, config: BridgeConfig, state: Arc<IrqState>) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<BridgeMsg>();

        let consumer = {
            let platform = platform.clone();
            let worker = config.clone();
            let state = Arc::clone(&state);
            thread::Builder::new()
                .name(format!("{}-irq", config.device))
                .spawn(move || {
                    for msg in rx {
                        match msg {
                            BridgeMsg::Edge(edge) => deliver(&platform, &worker, &state, edge),
                            BridgeMsg::Shutdown => break,
                        }
                    }
                })
                .map_err(|e| Error::IrqRequestFailed {
                    line: config.line,
                    reason: e.to_string(),
                })?
        };

        let handler: IrqHandler = {
            let tx = tx.clone();
            let state = Arc::clone(&state);
            Arc::new(move || {
                let _ = tx.send(BridgeMsg::Edge(state.record_edge()));
            })
        };

        let mut bridge = Self {
            device: config.device.clone(),
            irq: None,
            platform: platform.clone(),
            tx,
            consumer: Some(consumer),
        };

        let irq = platform
            .irq
            .request_irq(config.line, Trigger::RisingEdge, &config.device, handler)
            .map_err(|e| {
                log::error!("{}: could not request irq {}: {}", config.device, config.line, e);
                Error::IrqRequestFailed {
                    line: config.line,
                    reason: e.to_string(),
                }
            })?;
        bridge.irq = Some(irq);

        if platform.features.contains(PlatformFeatures::WAKE_IRQ) {
            if let Err(e) = platform.irq.enable_wake(irq) {
                log::warn!("{}: irq {} not wake capable: {}", config.device, irq, e);
            }
        }

        log::info!(
            "{}: irq {} armed on line {} (rising edge)",
            config.device,
            irq,
            config.line
        );
        Ok(bridge)
    }

    /// Registered interrupt
    pub fn irq(&self) -> Option<IrqId> {
        self.irq
    }

    /// Free the interrupt and stop the consumer
    ///
    /// Edges already queued are still delivered before the consumer exits.
    pub fn disarm(&mut self) {
        if let Some(irq) = self.irq.take() {
            self.platform.irq.free_irq(irq);
            log::debug!("{}: irq {} freed", self.device, irq);
        }
        if let Some(consumer) = self.consumer.take() {
            let _ = self.tx.send(BridgeMsg::Shutdown);
            if consumer.join().is_err() {
                log::error!("{}: irq consumer panicked", self.device);
            }
        }
    }
}

impl Drop for IrqBridge {
    fn drop(&mut self) {
        self.disarm();
    }
}

fn deliver(platform: &Platform, config: &BridgeConfig, state: &IrqState, edge: EdgeEvent) {
    if edge.wake {
        if platform.features.contains(PlatformFeatures::WAKE_LOCK) {
            match platform.wake.hold(&config.device, config.wake_hold) {
                Ok(()) => {
                    state.wake_holds.fetch_add(1, Ordering::AcqRel);
                }
                Err(e) => log::warn!("{}: wake hold failed: {}", config.device, e),
            }
        } else {
            log::debug!("{}: no wake locks on this platform", config.device);
        }
    }

    platform.attrs.notify(&config.device, ATTR_IRQ);
    state.notifications.fetch_add(1, Ordering::AcqRel);
    *state.last_edge.lock().unwrap_or_else(PoisonError::into_inner) = Some(edge.at);
    log::trace!(
        "{}: edge {} delivered after {:?}",
        config.device,
        edge.seq,
        edge.at.elapsed()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_keeps_policy_at_edge_time() {
        let state = IrqState::new(true);
        let first = state.record_edge();
        state.set_wakeup_enabled(false);
        let second = state.record_edge();

        assert!(first.wake);
        assert!(!second.wake);
        assert_eq!((first.seq, second.seq), (1, 2));
        assert_eq!(state.edge_count(), 2);
        assert_eq!(state.notification_count(), 0);
    }
}
