//! Shared-context group supervisor
//!
//! `ContextWatchdog` owns one shared context object plus a dynamic set of
//! named item watchdogs. All lifecycle operations across the group are
//! ordered through per-key [`ActionQueues`](crate::queue::ActionQueues):
//! group-wide operations run on the main key and exclude everything, two
//! operations on the same item never overlap, and operations on different
//! items may run concurrently.
//!
//! Crash isolation works in both directions. The context's reachable
//! object set is published to every member as an exclusion set, so a fault
//! inside one member is never attributed to a sibling just because both
//! hold the shared context. The group's own fault intake first asks every
//! member whether the fault belongs to it; only unclaimed faults are
//! checked against the context graph.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use tokio::runtime::Handle;

use vigil_core::graph::{are_connected, reachable_set};
use vigil_core::{
    EditorConfig, EditorCreator, EditorDestructor, EditorSource, ExcludedSet, GraphHandle,
    ReportedError, RECOVERY_PLUGIN,
};

use crate::config::WatchdogConfig;
use crate::crash::CrashRecord;
use crate::editor::EditorWatchdog;
use crate::errors::{Result, WatchdogError};
use crate::events::{GroupEvents, ItemError, ItemRestart, RestartEvent, SupervisorEvents};
use crate::queue::{ActionQueues, QueueKey};
use crate::state::WatchdogState;
use crate::supervisor::Supervisor;

/// Injectable async constructor for the shared context
pub type ContextCreator =
    Arc<dyn Fn(ContextConfig) -> BoxFuture<'static, vigil_core::Result<GraphHandle>> + Send + Sync>;

/// Injectable async destructor for the shared context
pub type ContextDestructor =
    Arc<dyn Fn(GraphHandle) -> BoxFuture<'static, vigil_core::Result<()>> + Send + Sync>;

/// Configuration passed to the context creator
#[derive(Debug, Clone, Default)]
pub struct ContextConfig {
    /// Plugins the shared context loads
    pub plugins: Vec<String>,
    /// Opaque host configuration passed through to the creator
    pub extra: Map<String, Value>,
}

/// Description of one item added to the group
#[derive(Clone)]
pub struct ItemDescriptor {
    /// Unique item ID within the group
    pub id: String,
    /// What the item's instance is created from
    pub source: EditorSource,
    /// Instance configuration; the group injects the shared context
    pub config: EditorConfig,
    /// Async constructor for the item's instance
    pub creator: EditorCreator,
    /// Optional async destructor for the item's instance
    pub destructor: Option<EditorDestructor>,
}

impl fmt::Debug for ItemDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemDescriptor")
            .field("id", &self.id)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Watchdog supervising a shared context and its member instances
#[derive(Clone)]
pub struct ContextWatchdog {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    supervisor: Supervisor,
    queues: ActionQueues,
    creator: ContextCreator,
    destructor: Mutex<Option<ContextDestructor>>,
    context: Mutex<Option<GraphHandle>>,
    context_config: Mutex<Option<ContextConfig>>,
    items: Mutex<HashMap<String, EditorWatchdog>>,
    descriptors: Mutex<HashMap<String, ItemDescriptor>>,
    /// Reachable set of the shared context, published to every member
    excluded: Arc<RwLock<ExcludedSet>>,
    group_events: GroupEvents,
    /// Crash policy handed down to member watchdogs
    item_config: WatchdogConfig,
    runtime: Mutex<Option<Handle>>,
}

impl ContextWatchdog {
    /// Create a group watchdog around an injected context creator
    #[must_use]
    pub fn new(creator: ContextCreator, config: WatchdogConfig) -> Self {
        let inner = Arc::new(ContextInner {
            supervisor: Supervisor::new(config.clone()),
            queues: ActionQueues::new(),
            creator,
            destructor: Mutex::new(None),
            context: Mutex::new(None),
            context_config: Mutex::new(None),
            items: Mutex::new(HashMap::new()),
            descriptors: Mutex::new(HashMap::new()),
            excluded: Arc::new(RwLock::new(ExcludedSet::default())),
            group_events: GroupEvents::default(),
            item_config: config,
            runtime: Mutex::new(None),
        });

        // The group leaves `Initializing` only once every queued lifecycle
        // operation has settled.
        let weak = Arc::downgrade(&inner);
        inner.queues.on_empty(move || {
            if let Some(inner) = weak.upgrade() {
                if inner.supervisor.state().is_initializing() {
                    inner.supervisor.set_state(WatchdogState::Ready);
                }
            }
        });

        Self { inner }
    }

    /// Inject the async context destructor
    pub fn set_destructor(&self, destructor: ContextDestructor) {
        *self.inner.destructor.lock() = Some(destructor);
    }

    /// Current group state
    #[must_use]
    pub fn state(&self) -> WatchdogState {
        self.inner.supervisor.state()
    }

    /// Read-only group-level crash log
    #[must_use]
    pub fn crashes(&self) -> Vec<CrashRecord> {
        self.inner.supervisor.crashes()
    }

    /// The shared context handle, once created
    #[must_use]
    pub fn context(&self) -> Option<GraphHandle> {
        self.inner.context.lock().clone()
    }

    /// Member watchdog by ID
    #[must_use]
    pub fn item(&self, id: &str) -> Option<EditorWatchdog> {
        self.inner.items.lock().get(id).cloned()
    }

    /// Lifecycle state of a member
    pub fn item_state(&self, id: &str) -> Result<WatchdogState> {
        self.inner
            .items
            .lock()
            .get(id)
            .map(EditorWatchdog::state)
            .ok_or_else(|| WatchdogError::item_not_found(id))
    }

    /// Observer lists for group state-change, error and restart events
    #[must_use]
    pub fn events(&self) -> &SupervisorEvents {
        &self.inner.supervisor.events
    }

    /// Observer lists for member-level error and restart events
    #[must_use]
    pub fn group_events(&self) -> &GroupEvents {
        &self.inner.group_events
    }

    /// Build the shared context and start watching for faults
    pub async fn create(&self, config: ContextConfig) -> Result<()> {
        let inner = &self.inner;
        if inner.supervisor.state().is_destroyed() {
            return Err(WatchdogError::Destroyed);
        }

        *inner.runtime.lock() = Some(Handle::current());
        inner.queues.bind_runtime(Handle::current());

        let weak = Arc::downgrade(&self.inner);
        inner
            .supervisor
            .start_error_handling(Arc::new(move |reported| {
                if let Some(inner) = weak.upgrade() {
                    ContextWatchdog { inner }.handle_report(reported);
                }
            }));

        let inner = self.inner.clone();
        self.inner
            .queues
            .enqueue(QueueKey::Main, move || {
                async move {
                    *inner.context_config.lock() = Some(config.clone());
                    let context = (inner.creator)(config).await?;
                    publish_context(&inner, context);
                    Ok(())
                }
                .boxed()
            })
            .await
    }

    /// Add one or more items to the group
    ///
    /// Each item is enqueued on its own key, so independent items are
    /// created concurrently while still waiting behind any group-wide
    /// operation in flight.
    pub async fn add(&self, descriptors: impl IntoIterator<Item = ItemDescriptor>) -> Result<()> {
        let pending: Vec<_> = descriptors
            .into_iter()
            .map(|descriptor| self.enqueue_add(descriptor))
            .collect();
        try_join_all(pending).await.map(|_| ())
    }

    fn enqueue_add(&self, descriptor: ItemDescriptor) -> impl Future<Output = Result<()>> + Send {
        let inner = self.inner.clone();
        let key = QueueKey::item(descriptor.id.clone());
        self.inner.queues.enqueue(key, move || {
            async move {
                if inner.supervisor.state().is_destroyed() {
                    return Err(WatchdogError::Destroyed);
                }
                if inner.context.lock().is_none() {
                    return Err(WatchdogError::ContextNotCreated);
                }
                if inner.items.lock().contains_key(&descriptor.id) {
                    return Err(WatchdogError::item_exists(&descriptor.id));
                }

                let item = build_item(&inner, &descriptor);
                inner.items.lock().insert(descriptor.id.clone(), item.clone());
                inner
                    .descriptors
                    .lock()
                    .insert(descriptor.id.clone(), descriptor.clone());

                let mut config = descriptor.config.clone();
                config.context = inner.context.lock().clone();
                item.create(descriptor.source.clone(), config).await
            }
            .boxed()
        })
    }

    /// Destroy and forget one or more items
    pub async fn remove(&self, ids: impl IntoIterator<Item = String>) -> Result<()> {
        let pending: Vec<_> = ids
            .into_iter()
            .map(|id| {
                let inner = self.inner.clone();
                let key = QueueKey::item(id.clone());
                self.inner.queues.enqueue(key, move || {
                    async move {
                        let item = inner
                            .items
                            .lock()
                            .remove(&id)
                            .ok_or_else(|| WatchdogError::item_not_found(&id))?;
                        inner.descriptors.lock().remove(&id);
                        item.destroy().await
                    }
                    .boxed()
                })
            })
            .collect();
        try_join_all(pending).await.map(|_| ())
    }

    /// Tear down every member and the context, terminally
    pub async fn destroy(&self) -> Result<()> {
        let inner = self.inner.clone();
        self.inner
            .queues
            .enqueue(QueueKey::Main, move || {
                async move {
                    inner.supervisor.set_state(WatchdogState::Destroyed);
                    inner.supervisor.stop_error_handling();

                    let items: Vec<(String, EditorWatchdog)> =
                        inner.items.lock().drain().collect();
                    for (id, item) in items {
                        if let Err(error) = item.destroy().await {
                            tracing::error!(item = %id, %error, "member teardown failed during destroy");
                        }
                    }
                    inner.descriptors.lock().clear();

                    let context = inner.context.lock().take();
                    let destructor = inner.destructor.lock().clone();
                    let result = match (context, destructor) {
                        (Some(context), Some(destructor)) => {
                            destructor(context).await.map_err(Into::into)
                        }
                        _ => Ok(()),
                    };

                    inner.supervisor.events.clear();
                    inner.group_events.clear();
                    result
                }
                .boxed()
            })
            .await
    }

    /// Tear down and rebuild the context plus every registered member
    ///
    /// Members are rebuilt with their last snapshots injected, so a
    /// context-level crash preserves member content the same way a member
    /// crash does.
    async fn restart(&self) -> Result<()> {
        let inner = self.inner.clone();
        self.inner
            .queues
            .enqueue(QueueKey::Main, move || {
                async move {
                    // A destroy may already be queued ahead; destroyed is
                    // terminal.
                    if inner.supervisor.state().is_destroyed() {
                        return Ok(());
                    }

                    inner.supervisor.set_state(WatchdogState::Initializing);

                    let items: Vec<(String, EditorWatchdog)> =
                        inner.items.lock().drain().collect();
                    let mut snapshots = HashMap::new();
                    for (id, item) in items {
                        if let Some(snapshot) = item.snapshot() {
                            snapshots.insert(id.clone(), snapshot);
                        }
                        if let Err(error) = item.destroy().await {
                            tracing::error!(item = %id, %error, "member teardown failed during context restart");
                        }
                    }

                    let context = inner.context.lock().take();
                    if let Some(context) = context {
                        let destructor = inner.destructor.lock().clone();
                        if let Some(destructor) = destructor {
                            if let Err(error) = destructor(context).await {
                                tracing::error!(%error, "context teardown failed during restart, continuing");
                            }
                        }
                    }

                    let config = inner.context_config.lock().clone().unwrap_or_default();
                    let context = (inner.creator)(config).await?;
                    publish_context(&inner, context);

                    let descriptors: Vec<ItemDescriptor> =
                        inner.descriptors.lock().values().cloned().collect();
                    for descriptor in descriptors {
                        let item = build_item(&inner, &descriptor);
                        inner.items.lock().insert(descriptor.id.clone(), item.clone());

                        let mut config = descriptor.config.clone();
                        config.context = inner.context.lock().clone();
                        if let Some(snapshot) = snapshots.remove(&descriptor.id) {
                            config.lazy_roots = snapshot.unloaded_root_names();
                            if !config.extra_plugins.iter().any(|p| p == RECOVERY_PLUGIN) {
                                config.extra_plugins.push(RECOVERY_PLUGIN.to_string());
                            }
                            config.recovery = Some(snapshot);
                        }
                        item.create(descriptor.source.clone(), config).await?;
                    }

                    inner.supervisor.events.restart.emit(&RestartEvent);
                    Ok(())
                }
                .boxed()
            })
            .await
    }

    /// Fault-hub intake with member-first attribution
    fn handle_report(&self, reported: &ReportedError) {
        let Some(fault) = self.inner.supervisor.relevant_fault(reported) else {
            return;
        };

        // A fault claimed by any member is handled by that member's own
        // watchdog; it is not a context crash.
        let items: Vec<EditorWatchdog> = self.inner.items.lock().values().cloned().collect();
        if items.iter().any(|item| item.owns_fault(&fault)) {
            return;
        }

        let Some(context) = self.inner.context.lock().clone() else {
            return;
        };
        let Some(fault_context) = fault.context() else {
            return;
        };
        if !are_connected(fault_context, &context, &ExcludedSet::default()) {
            return;
        }

        let causes_restart = self.inner.supervisor.record_crash(&fault);
        if !causes_restart {
            return;
        }

        let Some(runtime) = self.inner.runtime.lock().clone() else {
            tracing::error!("no runtime captured, cannot restart the context");
            return;
        };
        let watchdog = self.clone();
        runtime.spawn(async move {
            if let Err(error) = watchdog.restart().await {
                tracing::error!(%error, "context restart failed");
            }
        });
    }
}

/// Store the new context and publish its reachable set to members
fn publish_context(inner: &Arc<ContextInner>, context: GraphHandle) {
    let reachable = reachable_set(&context, &ExcludedSet::default());
    *inner.excluded.write() = reachable;
    *inner.context.lock() = Some(context);
}

/// Construct a member watchdog and wire its events to the group
fn build_item(inner: &Arc<ContextInner>, descriptor: &ItemDescriptor) -> EditorWatchdog {
    let item =
        EditorWatchdog::with_shared_exclusions(inner.item_config.clone(), inner.excluded.clone());
    item.set_creator(descriptor.creator.clone());
    if let Some(destructor) = descriptor.destructor.clone() {
        item.set_destructor(destructor);
    }

    let weak_group = Arc::downgrade(inner);
    let weak_item = item.downgrade();
    let item_id = descriptor.id.clone();
    item.events().error.add(move |event| {
        let Some(group) = weak_group.upgrade() else {
            return;
        };
        group.group_events.item_error.emit(&ItemError {
            item_id: item_id.clone(),
            error: event.error.clone(),
        });

        if !event.causes_restart {
            return;
        }
        let Some(item) = weak_item.upgrade() else {
            return;
        };

        // Subscribe before the restart can begin, then announce it from the
        // item's own queue key once it completes.
        let mut restarts = item.restart_watch();
        let announce_id = item_id.clone();
        let group_for_action = group.clone();
        let pending = group.queues.enqueue(QueueKey::item(item_id.clone()), move || {
            async move {
                let _ = restarts.changed().await;
                group_for_action
                    .group_events
                    .item_restart
                    .emit(&ItemRestart {
                        item_id: announce_id,
                    });
                Ok(())
            }
            .boxed()
        });
        drop(pending);
    });

    item
}

impl fmt::Debug for ContextWatchdog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextWatchdog")
            .field("state", &self.state())
            .field("items", &self.inner.items.lock().keys().collect::<Vec<_>>())
            .field("crashes", &self.crashes().len())
            .finish()
    }
}
