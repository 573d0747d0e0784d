//! # Vigil Watchdog
//!
//! Crash supervision and automatic state-preserving recovery for embedded
//! editor instances. A watchdog watches the process-wide
//! [`FaultHub`](vigil_core::FaultHub) for structured faults, uses
//! object-graph reachability to decide whether a fault belongs to its
//! instance, and when it does destroys and re-creates the instance while
//! replaying a throttled snapshot of its document state.
//!
//! ## Features
//!
//! - **Crash accounting**: append-only crash log with a configurable
//!   restart-versus-give-up policy based on the inter-crash rate
//! - **State-preserving restarts**: throttled snapshots are replayed into
//!   the fresh instance through a recovery plugin, so saved content
//!   survives the crash
//! - **Group supervision**: [`ContextWatchdog`] coordinates a shared
//!   context plus named members through per-key action queues, with
//!   member-first fault attribution
//! - **Typed events**: per-event observer lists for state changes, errors
//!   and restarts, no stringly-typed event bus
//!
//! ## Quick Start
//!
//! ```rust
//! use vigil_watchdog::{EditorWatchdog, WatchdogConfig, WatchdogState};
//!
//! let watchdog = EditorWatchdog::new(WatchdogConfig::default());
//! assert_eq!(watchdog.state(), WatchdogState::Initializing);
//!
//! // Inject a creator with `set_creator`, then `create(source, config)`
//! // inside a tokio runtime to start supervising an instance.
//! ```

#![deny(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod context;
pub mod crash;
pub mod editor;
pub mod errors;
pub mod events;
pub mod queue;
pub mod state;
pub mod throttle;

mod supervisor;

pub use config::WatchdogConfig;
pub use context::{
    ContextConfig, ContextCreator, ContextDestructor, ContextWatchdog, ItemDescriptor,
};
pub use crash::CrashRecord;
pub use editor::EditorWatchdog;
pub use errors::{Result, WatchdogError};
pub use events::{
    ErrorEvent, GroupEvents, ItemError, ItemRestart, ListenerId, ObserverList, RestartEvent,
    StateChange, SupervisorEvents,
};
pub use queue::{ActionQueues, QueueKey};
pub use state::WatchdogState;
pub use throttle::Throttle;
