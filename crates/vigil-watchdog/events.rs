//! Typed observer lists for watchdog events
//!
//! Each event name gets its own [`ObserverList`] generic over that event's
//! payload shape, instead of a stringly-typed `on`/`off` bus. Listeners are
//! registered with a [`ListenerId`] token and removed with the same token.
//! Emission snapshots the listener list first, so a callback may add or
//! remove listeners (or query the watchdog) without deadlocking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use vigil_core::Fault;

use crate::state::WatchdogState;

/// Token identifying a registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Observer list for a single event name
pub struct ObserverList<T> {
    observers: Mutex<Vec<(ListenerId, Observer<T>)>>,
    next_id: AtomicU64,
}

impl<T> Default for ObserverList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ObserverList<T> {
    /// Create an empty observer list
    #[must_use]
    pub fn new() -> Self {
        Self {
            observers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Register a listener and return its removal token
    pub fn add(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.lock().push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener; returns whether it was registered
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut observers = self.observers.lock();
        let before = observers.len();
        observers.retain(|(listener_id, _)| *listener_id != id);
        observers.len() != before
    }

    /// Invoke every listener with the payload
    pub fn emit(&self, payload: &T) {
        let observers: Vec<Observer<T>> = self
            .observers
            .lock()
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();
        for observer in observers {
            observer(payload);
        }
    }

    /// Drop all listeners
    pub fn clear(&self) {
        self.observers.lock().clear();
    }

    /// Number of registered listeners
    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.lock().len()
    }

    /// Whether no listeners are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.lock().is_empty()
    }
}

impl<T> core::fmt::Debug for ObserverList<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ObserverList")
            .field("observers", &self.len())
            .finish()
    }
}

/// Payload of the state-change event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    /// The state just entered
    pub state: WatchdogState,
}

/// Payload of the error event
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    /// The fault that was attributed to the supervised instance
    pub error: Fault,
    /// Whether this crash triggers a restart attempt
    pub causes_restart: bool,
}

/// Payload of the restart event
#[derive(Debug, Clone, Copy, Default)]
pub struct RestartEvent;

/// Group-level payload re-fired when a member crashes
#[derive(Debug, Clone)]
pub struct ItemError {
    /// ID of the member the fault was attributed to
    pub item_id: String,
    /// The fault itself
    pub error: Fault,
}

/// Group-level payload re-fired when a member finishes restarting
#[derive(Debug, Clone)]
pub struct ItemRestart {
    /// ID of the member that restarted
    pub item_id: String,
}

/// Observer lists shared by every watchdog kind
#[derive(Debug, Default)]
pub struct SupervisorEvents {
    /// Fired on every state transition
    pub state_change: ObserverList<StateChange>,
    /// Fired when a fault is attributed to the supervised instance
    pub error: ObserverList<ErrorEvent>,
    /// Fired after a successful restart
    pub restart: ObserverList<RestartEvent>,
}

impl SupervisorEvents {
    pub(crate) fn clear(&self) {
        self.state_change.clear();
        self.error.clear();
        self.restart.clear();
    }
}

/// Observer lists specific to the group watchdog
#[derive(Debug, Default)]
pub struct GroupEvents {
    /// Fired when any member's fault is accepted
    pub item_error: ObserverList<ItemError>,
    /// Fired when a member finishes a crash-triggered restart
    pub item_restart: ObserverList<ItemRestart>,
}

impl GroupEvents {
    pub(crate) fn clear(&self) {
        self.item_error.clear();
        self.item_restart.clear();
    }
}
