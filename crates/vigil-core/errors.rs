//! Error types for vigil-core
//!
//! Provides the `CoreError` enum used by instance contracts, snapshot
//! capture and graph traversal. Follows the same philosophy across the
//! workspace:
//! - Use thiserror for structured error handling (no anyhow)
//! - Provide detailed context for debugging
//! - Keep fallible paths cheap: variants carry only what callers need

use core::fmt;
use thiserror::Error;

/// Main error type for vigil-core operations
///
/// Raised by supervised-instance accessors, snapshot capture and graph
/// traversal. The watchdog layer wraps this in its own error enum.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A named content root does not exist on the instance
    #[error("root not found: {root}")]
    MissingRoot { root: String },

    /// Snapshot capture failed
    #[error("snapshot capture failed: {0}")]
    Snapshot(String),

    /// Serialization or deserialization of instance state failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The injected instance creator failed
    #[error("instance creation failed: {0}")]
    Creation(String),

    /// The injected instance destructor failed
    #[error("instance destruction failed: {0}")]
    Destruction(String),

    /// An object-graph node failed to enumerate its children
    #[error("graph traversal failed: {0}")]
    Traversal(String),

    /// Any other instance-side failure
    #[error("instance error: {0}")]
    Instance(String),
}

impl CoreError {
    /// Create a missing-root error
    pub fn missing_root<T: fmt::Display>(root: T) -> Self {
        Self::MissingRoot {
            root: root.to_string(),
        }
    }

    /// Create a snapshot-capture error
    pub fn snapshot<T: fmt::Display>(message: T) -> Self {
        Self::Snapshot(message.to_string())
    }

    /// Create a serialization error
    pub fn serialization<T: fmt::Display>(message: T) -> Self {
        Self::Serialization(message.to_string())
    }

    /// Create an instance-creation error
    pub fn creation<T: fmt::Display>(message: T) -> Self {
        Self::Creation(message.to_string())
    }

    /// Create an instance-destruction error
    pub fn destruction<T: fmt::Display>(message: T) -> Self {
        Self::Destruction(message.to_string())
    }

    /// Create a graph-traversal error
    pub fn traversal<T: fmt::Display>(message: T) -> Self {
        Self::Traversal(message.to_string())
    }

    /// Create a generic instance error
    pub fn instance<T: fmt::Display>(message: T) -> Self {
        Self::Instance(message.to_string())
    }

    /// Check whether the supervisors may swallow this error and continue
    ///
    /// Snapshot, serialization and traversal failures are logged and
    /// tolerated (a stale snapshot beats a dead watchdog). Lifecycle
    /// failures must surface to the caller.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::MissingRoot { .. }
                | Self::Snapshot(..)
                | Self::Serialization(..)
                | Self::Traversal(..)
        )
    }
}

/// Result type alias for vigil-core operations
pub type Result<T> = core::result::Result<T, CoreError>;
