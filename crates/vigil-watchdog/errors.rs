//! Error types for the vigil-watchdog crate
//!
//! Provides the main `WatchdogError` enum that wraps `CoreError` from
//! vigil-core and adds supervisor-specific error cases. Follows the same
//! philosophy as core:
//! - Use thiserror for structured error handling (no anyhow)
//! - Provide detailed context for debugging
//! - Support error chains with source information

use core::fmt;
use thiserror::Error;

use vigil_core::CoreError;

/// Main error type for watchdog operations
///
/// Wraps `CoreError` from vigil-core and adds error cases for lifecycle
/// management, group membership and action-queue execution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WatchdogError {
    /// Errors from vigil-core
    #[error(transparent)]
    Core(#[from] CoreError),

    /// An item with this ID is already registered in the group
    #[error("item already exists: {id}")]
    ItemAlreadyExists { id: String },

    /// No item with this ID is registered in the group
    #[error("item not found: {id}")]
    ItemNotFound { id: String },

    /// The watchdog has been destroyed and accepts no further operations
    #[error("watchdog has been destroyed")]
    Destroyed,

    /// The shared context has not been created yet
    #[error("context has not been created")]
    ContextNotCreated,

    /// A lifecycle operation was requested before a creator was injected
    #[error("no creator configured")]
    MissingCreator,

    /// A queued action was dropped before it could report a result
    #[error("queued action dropped before completion on key '{key}'")]
    ActionDropped { key: String },
}

impl WatchdogError {
    /// Create an item-already-exists error
    pub fn item_exists<T: fmt::Display>(id: T) -> Self {
        Self::ItemAlreadyExists { id: id.to_string() }
    }

    /// Create an item-not-found error
    pub fn item_not_found<T: fmt::Display>(id: T) -> Self {
        Self::ItemNotFound { id: id.to_string() }
    }

    /// Create an action-dropped error
    pub fn action_dropped<T: fmt::Display>(key: T) -> Self {
        Self::ActionDropped {
            key: key.to_string(),
        }
    }

    /// Get the underlying core error if this wraps one
    #[must_use]
    pub const fn as_core_error(&self) -> Option<&CoreError> {
        match self {
            Self::Core(core_err) => Some(core_err),
            _ => None,
        }
    }
}

/// Result type alias for watchdog operations
pub type Result<T> = core::result::Result<T, WatchdogError>;
