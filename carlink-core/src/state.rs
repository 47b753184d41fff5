//! Shared connection state between the hotplug monitor and the session.
//!
//! ```text
//!  Disconnected ──attach──► Connecting ──configured──► Connected
//!       ▲                       │                          │
//!       └──────failure──────────┴────────detach────────────┘
//! ```
//!
//! Observers subscribe to transitions; a notification fires only when
//! the state actually changes, and slow observers are skipped rather
//! than blocked on.

use std::fmt;
use std::sync::Mutex;

use tokio::sync::mpsc;

/// The dongle link's lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    /// No dongle, or the last session was torn down.
    #[default]
    Disconnected,
    /// A connection attempt (open + handshake) is in progress.
    Connecting,
    /// Handshake complete; streaming and heartbeat are running.
    Connected,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Disconnected => write!(f, "disconnected"),
            LinkState::Connecting => write!(f, "connecting"),
            LinkState::Connected => write!(f, "connected"),
        }
    }
}

// ── StateManager ─────────────────────────────────────────────────

/// Buffer depth of each observer channel. Transitions are rare; ten
/// slots outlast any realistic reader stall.
const OBSERVER_BUFFER: usize = 10;

struct Inner {
    state: LinkState,
    observers: Vec<(u64, mpsc::Sender<LinkState>)>,
    next_id: u64,
}

/// Mutex-guarded [`LinkState`] with change observers.
pub struct StateManager {
    inner: Mutex<Inner>,
}

/// A handle to a subscribed observer channel.
///
/// Dropping the handle without [`StateManager::unsubscribe`] leaves a
/// dead sender behind until the next notification sweep.
pub struct StateObserver {
    id: u64,
    rx: mpsc::Receiver<LinkState>,
}

impl StateObserver {
    /// Wait for the next state transition.
    pub async fn changed(&mut self) -> Option<LinkState> {
        self.rx.recv().await
    }

    /// Non-blocking poll for a pending transition.
    pub fn try_changed(&mut self) -> Option<LinkState> {
        self.rx.try_recv().ok()
    }
}

impl StateManager {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: LinkState::Disconnected,
                observers: Vec::new(),
                next_id: 0,
            }),
        }
    }

    /// Current state.
    pub fn get(&self) -> LinkState {
        self.inner.lock().unwrap().state
    }

    /// `true` when the link is fully established.
    pub fn is_connected(&self) -> bool {
        self.get() == LinkState::Connected
    }

    /// Set the state, notifying observers iff it actually changed.
    ///
    /// Notification is non-blocking: an observer whose buffer is full
    /// misses the transition instead of stalling the caller.
    pub fn set(&self, new_state: LinkState) {
        let senders: Vec<mpsc::Sender<LinkState>> = {
            let mut inner = self.inner.lock().unwrap();
            if inner.state == new_state {
                return;
            }
            inner.state = new_state;
            inner.observers.iter().map(|(_, tx)| tx.clone()).collect()
        };

        for tx in senders {
            let _ = tx.try_send(new_state);
        }
    }

    /// Register an observer. Each transition is delivered at most once
    /// per observer.
    pub fn subscribe(&self) -> StateObserver {
        let (tx, rx) = mpsc::channel(OBSERVER_BUFFER);
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.observers.push((id, tx));
        StateObserver { id, rx }
    }

    /// Remove an observer and release its channel.
    pub fn unsubscribe(&self, observer: StateObserver) {
        let mut inner = self.inner.lock().unwrap();
        inner.observers.retain(|(id, _)| *id != observer.id);
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_disconnected() {
        let mgr = StateManager::new();
        assert_eq!(mgr.get(), LinkState::Disconnected);
        assert!(!mgr.is_connected());
    }

    #[test]
    fn happy_path_lifecycle() {
        let mgr = StateManager::new();
        mgr.set(LinkState::Connecting);
        assert_eq!(mgr.get(), LinkState::Connecting);
        mgr.set(LinkState::Connected);
        assert!(mgr.is_connected());
        mgr.set(LinkState::Disconnected);
        assert_eq!(mgr.get(), LinkState::Disconnected);
    }

    #[tokio::test]
    async fn observer_sees_each_transition_once() {
        let mgr = StateManager::new();
        let mut obs = mgr.subscribe();

        mgr.set(LinkState::Connecting);
        mgr.set(LinkState::Connected);

        assert_eq!(obs.changed().await, Some(LinkState::Connecting));
        assert_eq!(obs.changed().await, Some(LinkState::Connected));
        assert_eq!(obs.try_changed(), None);
    }

    #[tokio::test]
    async fn no_notification_without_change() {
        let mgr = StateManager::new();
        let mut obs = mgr.subscribe();

        mgr.set(LinkState::Disconnected); // already there
        mgr.set(LinkState::Connecting);
        mgr.set(LinkState::Connecting); // repeat

        assert_eq!(obs.changed().await, Some(LinkState::Connecting));
        assert_eq!(obs.try_changed(), None);
    }

    #[tokio::test]
    async fn full_observer_is_skipped_not_blocked() {
        let mgr = StateManager::new();
        let mut obs = mgr.subscribe();

        // Overflow the buffer; set() must never block.
        for _ in 0..OBSERVER_BUFFER + 5 {
            mgr.set(LinkState::Connecting);
            mgr.set(LinkState::Disconnected);
        }

        let mut received = 0;
        while obs.try_changed().is_some() {
            received += 1;
        }
        assert_eq!(received, OBSERVER_BUFFER);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let mgr = StateManager::new();
        let obs = mgr.subscribe();
        let mut obs2 = mgr.subscribe();

        mgr.unsubscribe(obs);
        mgr.set(LinkState::Connecting);

        assert_eq!(obs2.changed().await, Some(LinkState::Connecting));
    }
}
