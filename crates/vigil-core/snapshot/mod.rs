//! Serializable document-state snapshots
//!
//! A snapshot captures everything needed to rebuild an instance's document
//! after a crash: one entry per attached content root (content tree,
//! attributes, load flag), serialized marker ranges, and opaque payloads
//! from optional collaboration add-ons. Content shapes belong to the
//! instance's own format; the watchdog stores them as `serde_json::Value`
//! trees and never looks inside.
//!
//! Snapshots are replaced wholesale on every successful save, never merged
//! partially, and consumed exactly once when rebuilding after a crash.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{CoreError, Result};
use crate::instance::SupervisedEditor;

/// Captured state of one content root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootSnapshot {
    /// Serialized content tree
    pub content: Value,
    /// Serialized root attributes
    pub attributes: Value,
    /// Whether the root was actually loaded when captured
    pub is_loaded: bool,
}

/// Captured state of one marker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerSnapshot {
    /// Serialized marker range
    pub range: Value,
    /// Whether the marker was managed through operations
    pub using_operation: bool,
    /// Whether the marker affects document data
    pub affects_data: bool,
}

/// Full document-state capture of a supervised instance
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EditorSnapshot {
    /// Captured roots keyed by root name
    pub roots: HashMap<String, RootSnapshot>,
    /// Captured markers keyed by marker name
    pub markers: HashMap<String, MarkerSnapshot>,
    /// Opaque comment-thread payload, when a collaboration add-on is present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_threads: Option<Value>,
    /// Opaque suggestion payload, when a collaboration add-on is present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Value>,
}

impl EditorSnapshot {
    /// Names of roots that were loaded when the snapshot was taken
    #[must_use]
    pub fn loaded_root_names(&self) -> Vec<String> {
        self.roots
            .iter()
            .filter(|(_, root)| root.is_loaded)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Names of roots that were never loaded (deferred on re-creation)
    #[must_use]
    pub fn unloaded_root_names(&self) -> Vec<String> {
        self.roots
            .iter()
            .filter(|(_, root)| !root.is_loaded)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Initial-data map for re-creating an instance from loaded roots
    ///
    /// Content trees are JSON-encoded per root; the recovery plugin replays
    /// the full snapshot regardless, so this only seeds root existence.
    #[must_use]
    pub fn root_data(&self) -> HashMap<String, String> {
        self.roots
            .iter()
            .filter(|(_, root)| root.is_loaded)
            .map(|(name, root)| (name.clone(), root.content.to_string()))
            .collect()
    }
}

/// Capture a snapshot from a live instance
///
/// Fails if any loaded root refuses to serialize; callers keep the previous
/// snapshot in that case.
pub fn capture(editor: &dyn SupervisedEditor) -> Result<EditorSnapshot> {
    let mut roots = HashMap::new();
    for name in editor.root_names() {
        let content = editor.root_content(&name)?;
        let attributes = editor.root_attributes(&name)?;
        roots.insert(
            name.clone(),
            RootSnapshot {
                content,
                attributes,
                is_loaded: editor.root_is_loaded(&name),
            },
        );
    }

    let markers = editor
        .markers()
        .map_err(|e| CoreError::snapshot(format!("marker enumeration failed: {e}")))?
        .into_iter()
        .collect();

    Ok(EditorSnapshot {
        roots,
        markers,
        comment_threads: editor.comment_threads(),
        suggestions: editor.suggestions(),
    })
}
