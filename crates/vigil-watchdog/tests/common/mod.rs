//! Shared test doubles: a mock supervised editor, its backend factories,
//! and a mock shared context.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::{json, Value};

use vigil_core::graph::{GraphHandle, Traversable};
use vigil_core::instance::{
    ChangeListener, EditorConfig, EditorCreator, EditorDestructor, EditorHandle, EditorSource,
    HostElement, ListenerHandle, SupervisedEditor,
};
use vigil_core::snapshot::MarkerSnapshot;
use vigil_core::{CoreError, Fault, FaultHub, ReportedError};
use vigil_watchdog::{ContextCreator, ContextDestructor, ItemDescriptor};

/// Plain graph node with mutable children
pub struct GraphNode {
    children: Mutex<Vec<GraphHandle>>,
}

impl GraphNode {
    pub fn leaf() -> Arc<Self> {
        Arc::new(Self {
            children: Mutex::new(Vec::new()),
        })
    }

    pub fn with(children: Vec<GraphHandle>) -> Arc<Self> {
        Arc::new(Self {
            children: Mutex::new(children),
        })
    }
}

impl Traversable for GraphNode {
    fn children(&self) -> vigil_core::Result<Vec<GraphHandle>> {
        Ok(self.children.lock().clone())
    }
}

/// Coerce a concrete node into a graph handle
pub fn gh(node: &Arc<GraphNode>) -> GraphHandle {
    node.clone()
}

pub struct MockElement;
impl HostElement for MockElement {}

struct RootState {
    content: Value,
    attributes: Value,
    loaded: bool,
}

/// In-memory supervised editor honoring the recovery contract
pub struct MockEditor {
    roots: Mutex<HashMap<String, RootState>>,
    markers: Mutex<HashMap<String, MarkerSnapshot>>,
    comment_threads: Mutex<Option<Value>>,
    suggestions: Mutex<Option<Value>>,
    version: AtomicU64,
    listeners: Mutex<HashMap<u64, ChangeListener>>,
    next_listener: AtomicU64,
    root_node: Arc<GraphNode>,
    doc_node: Arc<GraphNode>,
    fail_capture: AtomicBool,
}

impl MockEditor {
    pub fn build(source: &EditorSource, config: &EditorConfig) -> Arc<Self> {
        let doc_node = GraphNode::leaf();
        let mut graph_children = vec![gh(&doc_node)];
        if let Some(context) = &config.context {
            graph_children.push(context.clone());
        }
        let root_node = GraphNode::with(graph_children);

        let mut roots = HashMap::new();
        let mut markers = HashMap::new();
        let mut comment_threads = None;
        let mut suggestions = None;

        if let Some(snapshot) = &config.recovery {
            // Recovery boot: replay the snapshot instead of loading initial
            // data; deferred roots stay unloaded.
            for (name, root) in &snapshot.roots {
                roots.insert(
                    name.clone(),
                    RootState {
                        content: root.content.clone(),
                        attributes: root.attributes.clone(),
                        loaded: root.is_loaded && !config.lazy_roots.contains(name),
                    },
                );
            }
            for (name, marker) in &snapshot.markers {
                markers.insert(name.clone(), marker.clone());
            }
            comment_threads = snapshot.comment_threads.clone();
            suggestions = snapshot.suggestions.clone();
        } else {
            match source {
                EditorSource::Element(..) => {
                    roots.insert(
                        "main".to_string(),
                        RootState {
                            content: json!(""),
                            attributes: json!({}),
                            loaded: true,
                        },
                    );
                }
                EditorSource::Data(data) => {
                    for (name, value) in data {
                        roots.insert(
                            name.clone(),
                            RootState {
                                content: json!(value),
                                attributes: json!({}),
                                loaded: true,
                            },
                        );
                    }
                }
            }
        }

        Arc::new(Self {
            roots: Mutex::new(roots),
            markers: Mutex::new(markers),
            comment_threads: Mutex::new(comment_threads),
            suggestions: Mutex::new(suggestions),
            version: AtomicU64::new(0),
            listeners: Mutex::new(HashMap::new()),
            next_listener: AtomicU64::new(0),
            root_node,
            doc_node,
            fail_capture: AtomicBool::new(false),
        })
    }

    /// Replace a root's content, bumping the version and notifying
    pub fn write(&self, root: &str, content: Value) {
        let mut roots = self.roots.lock();
        match roots.get_mut(root) {
            Some(state) => state.content = content,
            None => {
                roots.insert(
                    root.to_string(),
                    RootState {
                        content,
                        attributes: json!({}),
                        loaded: true,
                    },
                );
            }
        }
        drop(roots);
        self.bump();
    }

    pub fn set_attributes(&self, root: &str, attributes: Value) {
        if let Some(state) = self.roots.lock().get_mut(root) {
            state.attributes = attributes;
        }
        self.bump();
    }

    pub fn set_marker(&self, name: &str, marker: MarkerSnapshot) {
        self.markers.lock().insert(name.to_string(), marker);
        self.bump();
    }

    /// Attach a root that exists but was never loaded
    pub fn add_unloaded_root(&self, name: &str) {
        self.roots.lock().insert(
            name.to_string(),
            RootState {
                content: json!(null),
                attributes: json!({}),
                loaded: false,
            },
        );
        self.bump();
    }

    pub fn set_comment_threads(&self, payload: Value) {
        *self.comment_threads.lock() = Some(payload);
        self.bump();
    }

    pub fn set_fail_capture(&self, fail: bool) {
        self.fail_capture.store(fail, Ordering::SeqCst);
    }

    pub fn content(&self, root: &str) -> Value {
        self.roots.lock()[root].content.clone()
    }

    pub fn attributes(&self, root: &str) -> Value {
        self.roots.lock()[root].attributes.clone()
    }

    pub fn marker(&self, name: &str) -> Option<MarkerSnapshot> {
        self.markers.lock().get(name).cloned()
    }

    pub fn comment_threads_payload(&self) -> Option<Value> {
        self.comment_threads.lock().clone()
    }

    pub fn root_is_loaded_probe(&self, root: &str) -> bool {
        self.roots.lock().get(root).is_some_and(|state| state.loaded)
    }

    /// A node inside this editor's object graph, usable as fault context
    pub fn doc_handle(&self) -> GraphHandle {
        gh(&self.doc_node)
    }

    fn bump(&self) {
        self.version.fetch_add(1, Ordering::SeqCst);
        let listeners: Vec<ChangeListener> = self.listeners.lock().values().cloned().collect();
        for listener in listeners {
            listener();
        }
    }
}

impl SupervisedEditor for MockEditor {
    fn document_version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    fn add_change_listener(&self, listener: ChangeListener) -> ListenerHandle {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().insert(id, listener);
        ListenerHandle(id)
    }

    fn remove_change_listener(&self, handle: ListenerHandle) {
        self.listeners.lock().remove(&handle.0);
    }

    fn root_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.roots.lock().keys().cloned().collect();
        names.sort();
        names
    }

    fn root_content(&self, root: &str) -> vigil_core::Result<Value> {
        if self.fail_capture.load(Ordering::SeqCst) {
            return Err(CoreError::serialization("capture disabled"));
        }
        self.roots
            .lock()
            .get(root)
            .map(|state| state.content.clone())
            .ok_or_else(|| CoreError::missing_root(root))
    }

    fn root_attributes(&self, root: &str) -> vigil_core::Result<Value> {
        self.roots
            .lock()
            .get(root)
            .map(|state| state.attributes.clone())
            .ok_or_else(|| CoreError::missing_root(root))
    }

    fn root_is_loaded(&self, root: &str) -> bool {
        self.roots.lock().get(root).is_some_and(|state| state.loaded)
    }

    fn markers(&self) -> vigil_core::Result<Vec<(String, MarkerSnapshot)>> {
        Ok(self
            .markers
            .lock()
            .iter()
            .map(|(name, marker)| (name.clone(), marker.clone()))
            .collect())
    }

    fn comment_threads(&self) -> Option<Value> {
        self.comment_threads.lock().clone()
    }

    fn suggestions(&self) -> Option<Value> {
        self.suggestions.lock().clone()
    }

    fn graph_root(&self) -> GraphHandle {
        self.root_node.clone()
    }
}

/// Factory tracking every instance it creates and destroys
#[derive(Default)]
pub struct MockBackend {
    pub created: AtomicUsize,
    pub destroyed: AtomicUsize,
    pub editors: Mutex<Vec<Arc<MockEditor>>>,
    pub configs: Mutex<Vec<EditorConfig>>,
    pub log: Mutex<Vec<String>>,
    pub fail_creates: AtomicUsize,
    pub fail_destroys: AtomicUsize,
    pub create_delay: Mutex<Option<Duration>>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The most recently created editor
    pub fn latest(&self) -> Arc<MockEditor> {
        self.editors.lock().last().expect("no editor created").clone()
    }

    pub fn creator(self: &Arc<Self>) -> EditorCreator {
        let backend = self.clone();
        Arc::new(move |source, config| {
            let backend = backend.clone();
            async move {
                let failures = backend.fail_creates.load(Ordering::SeqCst);
                if failures > 0 {
                    backend.fail_creates.store(failures - 1, Ordering::SeqCst);
                    return Err(CoreError::creation("injected creator failure"));
                }
                let delay = *backend.create_delay.lock();
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                backend.configs.lock().push(config.clone());
                backend.log.lock().push("create".to_string());
                let editor = MockEditor::build(&source, &config);
                backend.editors.lock().push(editor.clone());
                backend.created.fetch_add(1, Ordering::SeqCst);
                let handle: EditorHandle = editor;
                Ok(handle)
            }
            .boxed()
        })
    }

    pub fn destructor(self: &Arc<Self>) -> EditorDestructor {
        let backend = self.clone();
        Arc::new(move |_editor| {
            let backend = backend.clone();
            async move {
                let failures = backend.fail_destroys.load(Ordering::SeqCst);
                if failures > 0 {
                    backend.fail_destroys.store(failures - 1, Ordering::SeqCst);
                    return Err(CoreError::destruction("injected destructor failure"));
                }
                backend.log.lock().push("destroy".to_string());
                backend.destroyed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            .boxed()
        })
    }
}

/// Factory for shared mock contexts
#[derive(Default)]
pub struct MockContextBackend {
    pub created: AtomicUsize,
    pub destroyed: AtomicUsize,
    pub contexts: Mutex<Vec<Arc<GraphNode>>>,
}

impl MockContextBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn latest(&self) -> Arc<GraphNode> {
        self.contexts.lock().last().expect("no context created").clone()
    }

    pub fn creator(self: &Arc<Self>) -> ContextCreator {
        let backend = self.clone();
        Arc::new(move |_config| {
            let backend = backend.clone();
            async move {
                let plugin = GraphNode::leaf();
                let context = GraphNode::with(vec![gh(&plugin)]);
                backend.contexts.lock().push(context.clone());
                backend.created.fetch_add(1, Ordering::SeqCst);
                Ok(gh(&context))
            }
            .boxed()
        })
    }

    pub fn destructor(self: &Arc<Self>) -> ContextDestructor {
        let backend = self.clone();
        Arc::new(move |_context| {
            let backend = backend.clone();
            async move {
                backend.destroyed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            .boxed()
        })
    }
}

/// Item descriptor over a mock backend with a single empty `main` root
pub fn descriptor(id: &str, backend: &Arc<MockBackend>) -> ItemDescriptor {
    ItemDescriptor {
        id: id.to_string(),
        source: EditorSource::Data(HashMap::from([("main".to_string(), String::new())])),
        config: EditorConfig::default(),
        creator: backend.creator(),
        destructor: Some(backend.destructor()),
    }
}

/// Report a structured fault whose context is `node`
pub fn report_fault(node: GraphHandle, message: &str) {
    FaultHub::report_error(&ReportedError::Fault(
        Fault::new(message).with_context(node),
    ));
}

/// Whether the watchdog's current snapshot holds `expected` in `root`
pub fn data_is(watchdog: &vigil_watchdog::EditorWatchdog, root: &str, expected: &Value) -> bool {
    watchdog.snapshot().is_some_and(|snapshot| {
        snapshot
            .roots
            .get(root)
            .is_some_and(|state| &state.content == expected)
    })
}

/// Spin (with the paused clock) until `condition` holds
pub async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("condition not reached in time");
}
