//! Single-instance supervisor
//!
//! `EditorWatchdog` owns the lifecycle of exactly one supervised editor
//! instance: it creates it through an injected async creator, keeps a
//! throttled snapshot of its document state while it runs, and when a fault
//! is attributed to the instance destroys and re-creates it, replaying the
//! snapshot through the recovery plugin so no saved content is lost.
//!
//! Every lifecycle operation chains onto one fair async lock, so a manual
//! `destroy` can never race an automatic restart on the same instance.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::sync::watch;

use vigil_core::graph::are_connected;
use vigil_core::instance::ListenerHandle;
use vigil_core::snapshot::capture;
use vigil_core::{
    EditorConfig, EditorCreator, EditorDestructor, EditorHandle, EditorSnapshot, EditorSource,
    ExcludedSet, Fault, ReportedError, RECOVERY_PLUGIN,
};

use crate::config::WatchdogConfig;
use crate::crash::CrashRecord;
use crate::errors::{Result, WatchdogError};
use crate::events::{RestartEvent, SupervisorEvents};
use crate::state::WatchdogState;
use crate::supervisor::Supervisor;
use crate::throttle::Throttle;

/// Watchdog supervising a single editor instance
///
/// Cloning is cheap and shares the same supervised instance.
#[derive(Clone)]
pub struct EditorWatchdog {
    inner: Arc<EditorWatchdogInner>,
}

struct EditorWatchdogInner {
    supervisor: Supervisor,
    /// Serializes create/destroy/restart; tokio mutexes are fair, so
    /// lifecycle calls run in request order.
    lifecycle: tokio::sync::Mutex<()>,
    creator: Mutex<Option<EditorCreator>>,
    destructor: Mutex<Option<EditorDestructor>>,
    editor: Mutex<Option<EditorHandle>>,
    source: Mutex<Option<EditorSource>>,
    config: Mutex<Option<EditorConfig>>,
    snapshot: Mutex<Option<EditorSnapshot>>,
    last_saved_version: AtomicU64,
    throttle: Mutex<Option<Throttle>>,
    change_listener: Mutex<Option<ListenerHandle>>,
    /// Graph nodes never traversed when attributing faults; shared with the
    /// owning group watchdog, which publishes the context's reachable set.
    excluded: Arc<RwLock<ExcludedSet>>,
    restart_seq: watch::Sender<u64>,
    runtime: Mutex<Option<Handle>>,
}

impl EditorWatchdog {
    /// Create a watchdog with no instance attached yet
    #[must_use]
    pub fn new(config: WatchdogConfig) -> Self {
        Self::with_shared_exclusions(config, Arc::new(RwLock::new(ExcludedSet::default())))
    }

    pub(crate) fn with_shared_exclusions(
        config: WatchdogConfig,
        excluded: Arc<RwLock<ExcludedSet>>,
    ) -> Self {
        let (restart_seq, _) = watch::channel(0);
        Self {
            inner: Arc::new(EditorWatchdogInner {
                supervisor: Supervisor::new(config),
                lifecycle: tokio::sync::Mutex::new(()),
                creator: Mutex::new(None),
                destructor: Mutex::new(None),
                editor: Mutex::new(None),
                source: Mutex::new(None),
                config: Mutex::new(None),
                snapshot: Mutex::new(None),
                last_saved_version: AtomicU64::new(0),
                throttle: Mutex::new(None),
                change_listener: Mutex::new(None),
                excluded,
                restart_seq,
                runtime: Mutex::new(None),
            }),
        }
    }

    /// Inject the async instance constructor
    pub fn set_creator(&self, creator: EditorCreator) {
        *self.inner.creator.lock() = Some(creator);
    }

    /// Inject the async instance destructor
    ///
    /// Without one, teardown just drops the instance handle.
    pub fn set_destructor(&self, destructor: EditorDestructor) {
        *self.inner.destructor.lock() = Some(destructor);
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> WatchdogState {
        self.inner.supervisor.state()
    }

    /// Read-only crash log
    #[must_use]
    pub fn crashes(&self) -> Vec<CrashRecord> {
        self.inner.supervisor.crashes()
    }

    /// The live instance handle, when one is attached
    #[must_use]
    pub fn editor(&self) -> Option<EditorHandle> {
        self.inner.editor.lock().clone()
    }

    /// The last successfully captured snapshot
    #[must_use]
    pub fn snapshot(&self) -> Option<EditorSnapshot> {
        self.inner.snapshot.lock().clone()
    }

    /// Observer lists for state-change, error and restart events
    #[must_use]
    pub fn events(&self) -> &SupervisorEvents {
        &self.inner.supervisor.events
    }

    /// Create and start supervising an instance
    ///
    /// Waits for any pending lifecycle operation first. On success the
    /// watchdog is `Ready`, an initial snapshot has been captured and
    /// global fault handling is active. Creator failures propagate and
    /// leave the watchdog `Initializing`.
    pub async fn create(&self, source: EditorSource, config: EditorConfig) -> Result<()> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        self.create_locked(source, config).await
    }

    async fn create_locked(&self, source: EditorSource, config: EditorConfig) -> Result<()> {
        let inner = &self.inner;
        if inner.supervisor.state().is_destroyed() {
            return Err(WatchdogError::Destroyed);
        }

        *inner.runtime.lock() = Some(Handle::current());

        let weak = Arc::downgrade(&self.inner);
        inner
            .supervisor
            .start_error_handling(Arc::new(move |reported| {
                if let Some(inner) = weak.upgrade() {
                    EditorWatchdog { inner }.handle_report(reported);
                }
            }));

        // Remember how to rebuild. The stored configuration never keeps a
        // recovery payload: each restart injects the snapshot of that crash.
        *inner.source.lock() = Some(source.clone());
        let mut stored = config.clone();
        stored.recovery = None;
        *inner.config.lock() = Some(stored);

        let creator = inner
            .creator
            .lock()
            .clone()
            .ok_or(WatchdogError::MissingCreator)?;
        let editor = creator(source, config).await?;
        *inner.editor.lock() = Some(editor.clone());

        let throttle = Throttle::new(
            inner.supervisor.config().save_interval,
            Handle::current(),
            {
                let weak = Arc::downgrade(&self.inner);
                move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.save_snapshot();
                    }
                }
            },
        );
        let listener = editor.add_change_listener(Arc::new({
            let throttle = throttle.clone();
            move || throttle.request()
        }));
        *inner.throttle.lock() = Some(throttle);
        *inner.change_listener.lock() = Some(listener);

        match capture(editor.as_ref()) {
            Ok(snapshot) => {
                inner
                    .last_saved_version
                    .store(editor.document_version(), Ordering::SeqCst);
                *inner.snapshot.lock() = Some(snapshot);
            }
            Err(error) => {
                tracing::warn!(%error, "initial snapshot capture failed, keeping previous snapshot");
            }
        }

        inner.supervisor.set_state(WatchdogState::Ready);
        Ok(())
    }

    /// Destroy the supervised instance and terminate the watchdog
    ///
    /// Waits for any pending lifecycle operation first. A pending throttled
    /// save is cancelled, not flushed: prompt shutdown wins over data newer
    /// than the last snapshot. Destructor errors propagate.
    pub async fn destroy(&self) -> Result<()> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        let inner = &self.inner;

        inner.supervisor.set_state(WatchdogState::Destroyed);
        inner.supervisor.stop_error_handling();

        let editor = self.detach_instance();
        let destructor = inner.destructor.lock().clone();
        let result = match (editor, destructor) {
            (Some(editor), Some(destructor)) => destructor(editor).await.map_err(Into::into),
            _ => Ok(()),
        };

        inner.supervisor.events.clear();
        result
    }

    /// Destroy and re-create the instance after an accepted crash
    ///
    /// Teardown is best effort: a failing destructor is logged and must not
    /// block recovery. The last snapshot is injected into the rebuilt
    /// configuration and consumed by the recovery plugin.
    pub(crate) async fn restart(&self) -> Result<()> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        let inner = &self.inner;

        // A destroy may have won the lock race; destroyed is terminal.
        if inner.supervisor.state().is_destroyed() {
            return Ok(());
        }

        inner.supervisor.set_state(WatchdogState::Initializing);

        let editor = self.detach_instance();
        if let Some(editor) = editor {
            let destructor = inner.destructor.lock().clone();
            if let Some(destructor) = destructor {
                if let Err(error) = destructor(editor).await {
                    tracing::error!(%error, "teardown failed during restart, continuing with re-creation");
                }
            }
        }

        let snapshot = inner.snapshot.lock().clone().unwrap_or_default();
        let mut config = inner.config.lock().clone().unwrap_or_default();
        config.lazy_roots = snapshot.unloaded_root_names();
        if !config.extra_plugins.iter().any(|p| p == RECOVERY_PLUGIN) {
            config.extra_plugins.push(RECOVERY_PLUGIN.to_string());
        }
        config.recovery = Some(snapshot.clone());

        // Rebuild from the original element when construction used one,
        // otherwise from a root-name map recreated out of the snapshot.
        let source = match inner.source.lock().clone() {
            Some(EditorSource::Element(element)) => EditorSource::Element(element),
            _ => EditorSource::Data(snapshot.root_data()),
        };

        self.create_locked(source, config).await?;

        inner.supervisor.events.restart.emit(&RestartEvent);
        inner.restart_seq.send_modify(|seq| *seq += 1);
        Ok(())
    }

    /// Unhook the throttle, change listener and instance handle
    fn detach_instance(&self) -> Option<EditorHandle> {
        let inner = &self.inner;
        if let Some(throttle) = inner.throttle.lock().take() {
            throttle.cancel();
        }
        let listener = inner.change_listener.lock().take();
        let editor = inner.editor.lock().take();
        if let (Some(editor), Some(listener)) = (&editor, listener) {
            editor.remove_change_listener(listener);
        }
        editor
    }

    /// Whether a fault's context belongs to this instance's object graph
    pub(crate) fn owns_fault(&self, fault: &Fault) -> bool {
        let Some(context) = fault.context() else {
            return false;
        };
        let Some(editor) = self.inner.editor.lock().clone() else {
            return false;
        };
        let excluded = self.inner.excluded.read().clone();
        are_connected(context, &editor.graph_root(), &excluded)
    }

    /// Fault-hub intake
    pub(crate) fn handle_report(&self, reported: &ReportedError) {
        let Some(fault) = self.inner.supervisor.relevant_fault(reported) else {
            return;
        };
        if !self.owns_fault(&fault) {
            return;
        }

        let causes_restart = self.inner.supervisor.record_crash(&fault);
        if !causes_restart {
            return;
        }

        let Some(runtime) = self.inner.runtime.lock().clone() else {
            tracing::error!("no runtime captured, cannot restart the instance");
            return;
        };
        let watchdog = self.clone();
        runtime.spawn(async move {
            if let Err(error) = watchdog.restart().await {
                tracing::error!(%error, "instance restart failed");
            }
        });
    }

    /// Receiver observing the restart sequence counter
    ///
    /// The counter increments once per completed restart; subscribing
    /// before a restart begins guarantees the bump is observed.
    pub(crate) fn restart_watch(&self) -> watch::Receiver<u64> {
        self.inner.restart_seq.subscribe()
    }

    /// Non-owning handle, for callbacks that must not keep the watchdog
    /// alive
    pub(crate) fn downgrade(&self) -> WeakEditorWatchdog {
        WeakEditorWatchdog {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

/// Weak counterpart of [`EditorWatchdog`]
pub(crate) struct WeakEditorWatchdog {
    inner: std::sync::Weak<EditorWatchdogInner>,
}

impl WeakEditorWatchdog {
    pub(crate) fn upgrade(&self) -> Option<EditorWatchdog> {
        self.inner.upgrade().map(|inner| EditorWatchdog { inner })
    }
}

impl EditorWatchdogInner {
    /// Throttled snapshot refresh; stale versions and capture failures
    /// leave the previous snapshot in place.
    fn save_snapshot(&self) {
        let Some(editor) = self.editor.lock().clone() else {
            return;
        };
        let version = editor.document_version();
        if version == self.last_saved_version.load(Ordering::SeqCst) {
            return;
        }
        match capture(editor.as_ref()) {
            Ok(snapshot) => {
                self.last_saved_version.store(version, Ordering::SeqCst);
                *self.snapshot.lock() = Some(snapshot);
            }
            Err(error) => {
                tracing::warn!(%error, "snapshot capture failed, keeping previous snapshot");
            }
        }
    }
}

impl fmt::Debug for EditorWatchdog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditorWatchdog")
            .field("state", &self.state())
            .field("crashes", &self.crashes().len())
            .field("has_editor", &self.inner.editor.lock().is_some())
            .finish()
    }
}
