//! Network connectivity.

use tokio::sync::watch;
use tracing::debug;

/// The device's view of the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetworkState {
    /// A network interface is up.
    pub connected: bool,
    /// The internet is reachable through it.
    pub reachable: bool,
}

impl NetworkState {
    /// Connected and reachable.
    pub const ONLINE: Self = Self {
        connected: true,
        reachable: true,
    };

    /// No network at all.
    pub const OFFLINE: Self = Self {
        connected: false,
        reachable: false,
    };

    /// Creates a network state.
    pub fn new(connected: bool, reachable: bool) -> Self {
        Self {
            connected,
            reachable,
        }
    }

    /// Returns true if remote calls can be attempted.
    pub fn is_online(&self) -> bool {
        self.connected && self.reachable
    }
}

/// Source of network state and its transitions.
pub trait ConnectivityMonitor: Send + Sync {
    /// Returns the current state.
    fn current(&self) -> NetworkState;

    /// Returns a receiver observing every state change.
    fn subscribe(&self) -> watch::Receiver<NetworkState>;

    /// Returns true if the current state is online.
    fn is_online(&self) -> bool {
        self.current().is_online()
    }
}

/// A connectivity monitor driven by explicit calls.
///
/// Hosts forward their platform's network notifications to it; tests use
/// it to script online/offline transitions.
#[derive(Debug)]
pub struct ManualConnectivity {
    state: watch::Sender<NetworkState>,
}

impl ManualConnectivity {
    /// Creates a monitor in the given state.
    pub fn new(initial: NetworkState) -> Self {
        let (state, _) = watch::channel(initial);
        Self { state }
    }

    /// Creates a monitor that starts online.
    pub fn online() -> Self {
        Self::new(NetworkState::ONLINE)
    }

    /// Creates a monitor that starts offline.
    pub fn offline() -> Self {
        Self::new(NetworkState::OFFLINE)
    }

    /// Replaces the state, notifying subscribers if it changed.
    pub fn set(&self, next: NetworkState) {
        let changed = self.state.send_if_modified(|state| {
            let changed = *state != next;
            *state = next;
            changed
        });
        if changed {
            debug!(connected = next.connected, reachable = next.reachable, "network state changed");
        }
    }

    /// Shorthand for going fully online or offline.
    pub fn set_online(&self, online: bool) {
        self.set(NetworkState::new(online, online));
    }
}

impl ConnectivityMonitor for ManualConnectivity {
    fn current(&self) -> NetworkState {
        *self.state.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<NetworkState> {
        self.state.subscribe()
    }
}
