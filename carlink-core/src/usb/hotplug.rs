//! Attach/detach detection by polling the bus.
//!
//! libusb's native hotplug callbacks are platform-sparse, so presence
//! is probed on a 2 s ticker and edges are detected by comparing
//! against the previous poll. Connect/disconnect callbacks run on
//! their own tasks — a slow connection sequence must not stall the
//! next poll.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::LinkError;
use crate::state::{LinkState, StateManager};
use crate::usb::transport;

/// Poll cadence.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// How long `stop` waits for the poller to exit before giving up.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

// ── Probe seam ───────────────────────────────────────────────────

/// How the monitor checks for a dongle on the bus. Production probes
/// the USB enumeration; tests script a fake bus.
pub trait DeviceProbe: Send + Sync + 'static {
    fn device_present(&self) -> bool;
}

/// Probes the real USB bus for known VID/PID pairs.
pub struct UsbProbe;

impl DeviceProbe for UsbProbe {
    fn device_present(&self) -> bool {
        transport::device_present()
    }
}

// ── Callbacks ────────────────────────────────────────────────────

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Invoked on an attach edge; an `Err` puts the state back to
/// `Disconnected`.
pub type ConnectCallback = Arc<dyn Fn() -> BoxFuture<Result<(), LinkError>> + Send + Sync>;

/// Invoked on a detach edge; runs to completion before the state
/// changes.
pub type DisconnectCallback = Arc<dyn Fn() -> BoxFuture<()> + Send + Sync>;

// ── HotplugMonitor ───────────────────────────────────────────────

/// Polling hotplug monitor driving the connection state machine.
pub struct HotplugMonitor {
    probe: Arc<dyn DeviceProbe>,
    state: Arc<StateManager>,
    on_connect: Option<ConnectCallback>,
    on_disconnect: Option<DisconnectCallback>,
    interval: Duration,
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl HotplugMonitor {
    pub fn new(state: Arc<StateManager>) -> Self {
        Self {
            probe: Arc::new(UsbProbe),
            state,
            on_connect: None,
            on_disconnect: None,
            interval: POLL_INTERVAL,
            cancel: CancellationToken::new(),
            handle: Mutex::new(None),
        }
    }

    /// Replace the bus probe (tests).
    pub fn with_probe(mut self, probe: impl DeviceProbe) -> Self {
        self.probe = Arc::new(probe);
        self
    }

    /// Override the poll cadence (tests).
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the attach callback.
    pub fn on_connect<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), LinkError>> + Send + 'static,
    {
        self.on_connect = Some(Arc::new(move || Box::pin(f())));
        self
    }

    /// Set the detach callback.
    pub fn on_disconnect<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_disconnect = Some(Arc::new(move || Box::pin(f())));
        self
    }

    /// Spawn the polling task. Calling `start` twice is a no-op.
    pub fn start(&self) {
        let mut handle = self.handle.lock().unwrap();
        if handle.is_some() {
            return;
        }

        let probe = self.probe.clone();
        let state = self.state.clone();
        let on_connect = self.on_connect.clone();
        let on_disconnect = self.on_disconnect.clone();
        let interval = self.interval;
        let cancel = self.cancel.clone();

        *handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; consume it so edges are
            // observed on the configured cadence.
            ticker.tick().await;

            let mut was_present = false;
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {}
                }

                let present = probe.device_present();
                if present && !was_present {
                    info!("dongle attached");
                    Self::handle_attach(&state, on_connect.as_ref());
                } else if !present && was_present {
                    info!("dongle detached");
                    Self::handle_detach(&state, on_disconnect.as_ref());
                }
                was_present = present;
            }
        }));
        info!("hotplug monitoring started");
    }

    /// One-shot manual probe: synthesize an attach edge if a dongle is
    /// already enumerated. Used at startup, before the first poll.
    pub fn trigger_connection_attempt(&self) {
        if self.probe.device_present() {
            Self::handle_attach(&self.state, self.on_connect.as_ref());
        }
    }

    /// Stop the poller and wait (bounded) for it to exit. Idempotent.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handle = self.handle.lock().unwrap().take();
        if let Some(handle) = handle {
            if tokio::time::timeout(STOP_TIMEOUT, handle).await.is_err() {
                warn!("hotplug poller did not stop within {STOP_TIMEOUT:?}");
            } else {
                info!("hotplug monitoring stopped");
            }
        }
    }

    fn handle_attach(state: &Arc<StateManager>, on_connect: Option<&ConnectCallback>) {
        // A connect already in flight (or established) wins.
        if state.get() != LinkState::Disconnected {
            return;
        }
        state.set(LinkState::Connecting);

        let Some(on_connect) = on_connect.cloned() else {
            state.set(LinkState::Disconnected);
            return;
        };

        // Off the poll task: the connection sequence takes seconds.
        let state = state.clone();
        tokio::spawn(async move {
            match on_connect().await {
                Ok(()) => {
                    info!("dongle connection established");
                    state.set(LinkState::Connected);
                }
                Err(err) => {
                    warn!("connection to attached dongle failed: {err}");
                    state.set(LinkState::Disconnected);
                }
            }
        });
    }

    fn handle_detach(state: &Arc<StateManager>, on_disconnect: Option<&DisconnectCallback>) {
        if state.get() == LinkState::Disconnected {
            return;
        }

        let Some(on_disconnect) = on_disconnect.cloned() else {
            state.set(LinkState::Disconnected);
            return;
        };

        let state = state.clone();
        tokio::spawn(async move {
            on_disconnect().await;
            // Unconditional: cleanup failures cannot keep a ghost link.
            state.set(LinkState::Disconnected);
        });
    }
}

// ── Tests ────────────────────────────────────────────────────────
