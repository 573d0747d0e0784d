//! Contracts between supervisors and supervised editor instances
//!
//! A supervised instance is anything that can report a document version,
//! notify on document changes, enumerate its content roots and markers in a
//! serializable form, and expose a handle into its object graph for fault
//! attribution. The watchdog never constructs instances itself: hosts
//! inject async [`EditorCreator`]/[`EditorDestructor`] callbacks and the
//! watchdog drives them.
//!
//! On a post-crash re-creation the rebuilt [`EditorConfig`] carries the
//! last [`EditorSnapshot`](crate::snapshot::EditorSnapshot) in `recovery`
//! and lists [`RECOVERY_PLUGIN`] in `extra_plugins`. A conforming creator
//! must let that plugin replace the normal initial-data load with a replay
//! of the snapshot's roots, attributes, markers and collaboration payloads.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{Map, Value};

use crate::errors::Result;
use crate::graph::GraphHandle;
use crate::snapshot::{EditorSnapshot, MarkerSnapshot};

/// Name of the data-recovery plugin appended to `extra_plugins` when an
/// instance is rebuilt from a snapshot
pub const RECOVERY_PLUGIN: &str = "DataRecovery";

/// Callback invoked on every document change notification
pub type ChangeListener = Arc<dyn Fn() + Send + Sync>;

/// Token identifying a registered change listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(pub u64);

/// Capability trait a supervised editor instance must implement
pub trait SupervisedEditor: Send + Sync {
    /// Monotonic counter bumped on every document change
    fn document_version(&self) -> u64;

    /// Register a document-change listener
    fn add_change_listener(&self, listener: ChangeListener) -> ListenerHandle;

    /// Remove a previously registered change listener
    fn remove_change_listener(&self, handle: ListenerHandle);

    /// Names of all attached content roots
    fn root_names(&self) -> Vec<String>;

    /// Serialized content tree of a root
    fn root_content(&self, root: &str) -> Result<Value>;

    /// Serialized attributes of a root
    fn root_attributes(&self, root: &str) -> Result<Value>;

    /// Whether a root's content has actually been loaded
    ///
    /// Lazily loaded roots that were never attached report `false` and are
    /// deferred on re-creation instead of being spuriously created.
    fn root_is_loaded(&self, root: &str) -> bool;

    /// Serialized marker ranges keyed by marker name
    fn markers(&self) -> Result<Vec<(String, MarkerSnapshot)>>;

    /// Opaque comment-thread payload from a collaboration add-on, if any
    fn comment_threads(&self) -> Option<Value> {
        None
    }

    /// Opaque suggestion payload from a collaboration add-on, if any
    fn suggestions(&self) -> Option<Value> {
        None
    }

    /// Entry handle into this instance's object graph
    fn graph_root(&self) -> GraphHandle;
}

/// Shared handle to a supervised instance
pub type EditorHandle = Arc<dyn SupervisedEditor>;

/// Marker trait for opaque host UI elements an instance is attached to
///
/// The watchdog never looks inside the element; it only preserves the
/// handle by identity across restarts.
pub trait HostElement: Send + Sync {}

/// Shared handle to a host element
pub type ElementHandle = Arc<dyn HostElement>;

/// What an instance is created from
#[derive(Clone)]
pub enum EditorSource {
    /// A host UI element the instance attaches to
    Element(ElementHandle),
    /// Initial data per root name
    Data(HashMap<String, String>),
}

impl EditorSource {
    /// Whether this source is a host element
    #[must_use]
    pub fn is_element(&self) -> bool {
        matches!(self, Self::Element(..))
    }
}

impl fmt::Debug for EditorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Element(..) => f.write_str("EditorSource::Element(..)"),
            Self::Data(data) => f
                .debug_tuple("EditorSource::Data")
                .field(&data.keys().collect::<Vec<_>>())
                .finish(),
        }
    }
}

/// Configuration passed to the instance creator
///
/// `Clone` copies every field deeply except the `context` handle, which is
/// an `Arc` and therefore preserved by identity. That is exactly the
/// cloning rule restarts rely on: configuration data must not be shared
/// between the old and new instance, shared handles must.
#[derive(Clone, Default)]
pub struct EditorConfig {
    /// Plugins the instance loads
    pub plugins: Vec<String>,
    /// Plugins appended by the host or by the watchdog (recovery)
    pub extra_plugins: Vec<String>,
    /// Roots that must not be created eagerly on this boot
    pub lazy_roots: Vec<String>,
    /// Shared context the instance participates in, if any
    pub context: Option<GraphHandle>,
    /// Snapshot to replay instead of the normal initial-data load
    pub recovery: Option<EditorSnapshot>,
    /// Opaque host configuration passed through to the creator
    pub extra: Map<String, Value>,
}

impl fmt::Debug for EditorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditorConfig")
            .field("plugins", &self.plugins)
            .field("extra_plugins", &self.extra_plugins)
            .field("lazy_roots", &self.lazy_roots)
            .field("context", &self.context.as_ref().map(|_| "<graph handle>"))
            .field("recovery", &self.recovery.is_some())
            .field("extra", &self.extra)
            .finish()
    }
}

impl EditorConfig {
    /// Whether this configuration describes a post-crash re-creation
    #[must_use]
    pub fn is_recovery(&self) -> bool {
        self.recovery.is_some() || self.extra_plugins.iter().any(|p| p == RECOVERY_PLUGIN)
    }
}

/// Injectable async constructor for supervised instances
pub type EditorCreator =
    Arc<dyn Fn(EditorSource, EditorConfig) -> BoxFuture<'static, Result<EditorHandle>> + Send + Sync>;

/// Injectable async destructor for supervised instances
pub type EditorDestructor =
    Arc<dyn Fn(EditorHandle) -> BoxFuture<'static, Result<()>> + Send + Sync>;
