//! Object-graph reachability for fault attribution
//!
//! Decides whether a fault's attached context object originates from within
//! a supervised instance's object graph. Traversal is a breadth-first walk
//! over an explicit [`Traversable`] capability trait: nodes opt in by
//! enumerating their child handles, everything else (primitives, platform
//! handles, host singletons) is simply not part of the graph.
//!
//! The walk runs during error handling and must never fail itself: child
//! enumeration errors are swallowed, cycles are guarded by a visited set,
//! and opaque or excluded nodes are treated as leaves that do not appear in
//! the reachable set at all. That last rule is what keeps two instances
//! sharing an excluded singleton from being judged connected through it.

use std::collections::VecDeque;
use std::sync::Arc;

use ahash::AHashSet;

use crate::errors::Result;

/// Capability trait for objects that participate in reachability analysis
///
/// Implementors enumerate the handles of their sub-objects. The default
/// implementation is a leaf with no children; `opaque` nodes are never
/// expanded nor collected, regardless of what `children` would return.
pub trait Traversable: Send + Sync {
    /// Handles of the objects directly reachable from this one
    ///
    /// Errors are swallowed by the analyzer: a node that fails to
    /// enumerate its children contributes nothing beyond itself.
    fn children(&self) -> Result<Vec<GraphHandle>> {
        Ok(Vec::new())
    }

    /// Marker for nodes that must be treated as leaves outside the graph
    ///
    /// Used for singletons shared across supervised instances so that a
    /// crash in one instance is not attributed to its siblings.
    fn opaque(&self) -> bool {
        false
    }
}

/// Shared handle to a node in the object graph
pub type GraphHandle = Arc<dyn Traversable>;

/// Stable identity of a graph node
///
/// Derived from the handle's data pointer: two handles are the same node
/// iff they point at the same allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Set of node identities excluded from traversal
pub type ExcludedSet = AHashSet<NodeId>;

/// Identity of a graph handle
#[must_use]
pub fn node_id(handle: &GraphHandle) -> NodeId {
    NodeId(Arc::as_ptr(handle) as *const () as usize)
}

/// Collect the identities of every node reachable from `root`
///
/// Breadth-first, cycle-guarded. Opaque nodes and nodes in `excluded` are
/// skipped entirely (not collected, not expanded). Child-enumeration
/// failures end that node's expansion silently.
#[must_use]
pub fn reachable_set(root: &GraphHandle, excluded: &ExcludedSet) -> AHashSet<NodeId> {
    let mut visited = AHashSet::new();
    let mut queue = VecDeque::new();

    enqueue(root, excluded, &mut visited, &mut queue);

    while let Some(node) = queue.pop_front() {
        let Ok(children) = node.children() else {
            continue;
        };
        for child in &children {
            enqueue(child, excluded, &mut visited, &mut queue);
        }
    }

    visited
}

fn enqueue(
    handle: &GraphHandle,
    excluded: &ExcludedSet,
    visited: &mut AHashSet<NodeId>,
    queue: &mut VecDeque<GraphHandle>,
) {
    let id = node_id(handle);
    if handle.opaque() || excluded.contains(&id) || !visited.insert(id) {
        return;
    }
    queue.push_back(handle.clone());
}

/// Check whether two object graphs share at least one node
///
/// True when `a` and `b` are the same object, or when their reachable sets
/// intersect. Symmetric by construction.
#[must_use]
pub fn are_connected(a: &GraphHandle, b: &GraphHandle, excluded: &ExcludedSet) -> bool {
    if node_id(a) == node_id(b) {
        return true;
    }

    let from_a = reachable_set(a, excluded);
    if from_a.is_empty() {
        return false;
    }

    // Walk from b with early exit instead of materializing both sets.
    let mut visited = AHashSet::new();
    let mut queue = VecDeque::new();
    enqueue(b, excluded, &mut visited, &mut queue);

    while let Some(node) = queue.pop_front() {
        if from_a.contains(&node_id(&node)) {
            return true;
        }
        let Ok(children) = node.children() else {
            continue;
        };
        for child in &children {
            enqueue(child, excluded, &mut visited, &mut queue);
        }
    }

    false
}
