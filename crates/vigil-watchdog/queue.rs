//! Per-key serialization of overlapping async lifecycle operations
//!
//! A minimal cooperative scheduler: every key owns a chain of pending
//! actions, and enqueueing captures the chain position synchronously.
//! Actions on the distinguished [`QueueKey::Main`] key await the tails of
//! every key (a group-wide operation cannot interleave with any in-flight
//! per-item operation); actions on an item key await the main tail and
//! their own tail, so two different items may overlap each other.
//!
//! A failing action settles its caller's future with the error but never
//! breaks the chain for subsequent actions on the same key.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::errors::{Result, WatchdogError};
use crate::events::{ListenerId, ObserverList};

/// Queue identity: the group-wide main key or one item's key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueueKey {
    /// Group-wide operations; excludes every other key
    Main,
    /// Operations on a single named item
    Item(String),
}

impl QueueKey {
    /// Convenience constructor for item keys
    pub fn item(id: impl Into<String>) -> Self {
        Self::Item(id.into())
    }
}

impl fmt::Display for QueueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Main => f.write_str("main"),
            Self::Item(id) => write!(f, "item:{id}"),
        }
    }
}

type Tail = Shared<BoxFuture<'static, ()>>;

/// Per-key action chains with a main-key barrier
#[derive(Clone)]
pub struct ActionQueues {
    inner: Arc<QueuesInner>,
}

struct QueuesInner {
    tails: Mutex<HashMap<QueueKey, Tail>>,
    pending: AtomicUsize,
    on_empty: ObserverList<()>,
    runtime: Mutex<Option<Handle>>,
}

impl Default for ActionQueues {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionQueues {
    /// Create an empty queue set
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(QueuesInner {
                tails: Mutex::new(HashMap::new()),
                pending: AtomicUsize::new(0),
                on_empty: ObserverList::new(),
                runtime: Mutex::new(None),
            }),
        }
    }

    /// Bind a runtime handle for enqueues arriving from host threads
    ///
    /// Enqueues from within a tokio runtime never need this.
    pub fn bind_runtime(&self, handle: Handle) {
        *self.inner.runtime.lock() = Some(handle);
    }

    /// Register a callback fired whenever the pending count drains to zero
    pub fn on_empty(&self, callback: impl Fn() + Send + Sync + 'static) -> ListenerId {
        self.inner.on_empty.add(move |_| callback())
    }

    /// Number of actions enqueued but not yet finished
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.load(Ordering::SeqCst)
    }

    /// Enqueue `action` on `key`
    ///
    /// The chain position is captured synchronously: ordering between two
    /// `enqueue` calls is decided by call order, not by when the returned
    /// futures are awaited. The returned future only carries the result and
    /// may be dropped without cancelling the action.
    pub fn enqueue<T, F>(&self, key: QueueKey, action: F) -> impl Future<Output = Result<T>> + Send
    where
        T: Send + 'static,
        F: FnOnce() -> BoxFuture<'static, Result<T>> + Send + 'static,
    {
        use futures::future::{ready, Either};

        let Some(runtime) = self.runtime_handle() else {
            tracing::error!(%key, "action enqueued outside a tokio runtime with no bound handle");
            return Either::Left(ready(Err(WatchdogError::action_dropped(&key))));
        };

        let (tx, rx) = oneshot::channel::<Result<T>>();
        let inner = self.inner.clone();
        {
            let mut tails = inner.tails.lock();
            let waits: Vec<Tail> = match &key {
                QueueKey::Main => tails.values().cloned().collect(),
                QueueKey::Item(..) => [tails.get(&QueueKey::Main), tails.get(&key)]
                    .into_iter()
                    .flatten()
                    .cloned()
                    .collect(),
            };
            inner.pending.fetch_add(1, Ordering::SeqCst);

            let work = async move {
                for tail in waits {
                    tail.await;
                }
                let result = action().await;
                let _ = tx.send(result);
            };

            let bookkeeping = self.inner.clone();
            let handle = runtime.spawn(async move {
                if AssertUnwindSafe(work).catch_unwind().await.is_err() {
                    tracing::error!("queued action panicked");
                }
                let drained = bookkeeping.pending.fetch_sub(1, Ordering::SeqCst) == 1;
                if drained {
                    // Re-check under the tails lock: enqueues increment the
                    // pending count while holding it, so a clean read here
                    // means no chain is live and stale tails can go.
                    let mut tails = bookkeeping.tails.lock();
                    if bookkeeping.pending.load(Ordering::SeqCst) == 0 {
                        tails.clear();
                    } else {
                        return;
                    }
                    drop(tails);
                    bookkeeping.on_empty.emit(&());
                }
            });

            let tail: Tail = async move {
                let _ = handle.await;
            }
            .boxed()
            .shared();
            tails.insert(key.clone(), tail);
        }

        Either::Right(async move {
            rx.await
                .unwrap_or_else(|_| Err(WatchdogError::action_dropped(&key)))
        })
    }

    fn runtime_handle(&self) -> Option<Handle> {
        Handle::try_current()
            .ok()
            .or_else(|| self.inner.runtime.lock().clone())
    }
}

impl fmt::Debug for ActionQueues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionQueues")
            .field("pending", &self.pending_count())
            .field("tails", &self.inner.tails.lock().len())
            .finish()
    }
}
