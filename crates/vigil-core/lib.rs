//! # Vigil Core
//!
//! Contracts and data model shared by the vigil watchdog suite: the
//! structured [`Fault`](fault::Fault) type raised by supervised editor
//! runtimes, the process-wide [`FaultHub`](fault::FaultHub) multiplexer,
//! object-graph reachability used to attribute faults to instances, the
//! [`SupervisedEditor`](instance::SupervisedEditor) capability trait, and the
//! serializable [`EditorSnapshot`](snapshot::EditorSnapshot) document-state
//! capture.
//!
//! ## Features
//!
//! - **Explicit traversal**: reachability works over an opt-in
//!   [`Traversable`](graph::Traversable) capability trait, no reflection
//! - **Fault attribution**: `are_connected` decides whether a fault's
//!   context belongs to a given instance's object graph
//! - **Opaque snapshots**: root content, attributes and marker ranges are
//!   `serde_json::Value` trees owned by the instance's own format
//! - **Thread-safe**: every contract is `Send + Sync`; handles are `Arc`s
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use vigil_core::graph::{are_connected, ExcludedSet, GraphHandle, Traversable};
//!
//! struct Node(Vec<GraphHandle>);
//!
//! impl Traversable for Node {
//!     fn children(&self) -> vigil_core::Result<Vec<GraphHandle>> {
//!         Ok(self.0.clone())
//!     }
//! }
//!
//! let leaf: GraphHandle = Arc::new(Node(vec![]));
//! let root: GraphHandle = Arc::new(Node(vec![leaf.clone()]));
//! let stranger: GraphHandle = Arc::new(Node(vec![]));
//!
//! assert!(are_connected(&root, &leaf, &ExcludedSet::default()));
//! assert!(!are_connected(&root, &stranger, &ExcludedSet::default()));
//! ```

#![deny(clippy::all)]
#![deny(unsafe_code)]

pub mod errors;
pub mod fault;
pub mod graph;
pub mod instance;
pub mod snapshot;

pub use errors::{CoreError, Result};
pub use fault::{Fault, FaultHandler, FaultHub, HubGuard, ReportedError, SourceLocation};
pub use graph::{
    are_connected, node_id, reachable_set, ExcludedSet, GraphHandle, NodeId, Traversable,
};
pub use instance::{
    ChangeListener, EditorConfig, EditorCreator, EditorDestructor, EditorHandle, EditorSource,
    ElementHandle, HostElement, ListenerHandle, SupervisedEditor, RECOVERY_PLUGIN,
};
pub use snapshot::{capture, EditorSnapshot, MarkerSnapshot, RootSnapshot};
