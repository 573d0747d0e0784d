//! Timer-based call coalescer with a trailing-edge guarantee
//!
//! Used to rate-limit snapshot captures: the first request in a quiet
//! period runs immediately (leading edge), further requests inside the
//! interval coalesce into one trailing call scheduled at the interval
//! boundary, so the final state is always eventually captured even if
//! requests stop arriving. Cancellation drops the pending trailing call
//! without flushing it.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Coalesces bursts of `request` calls into rate-limited callback runs
#[derive(Clone)]
pub struct Throttle {
    inner: Arc<ThrottleInner>,
}

struct ThrottleInner {
    interval: Duration,
    callback: Arc<dyn Fn() + Send + Sync>,
    runtime: Handle,
    state: Mutex<ThrottleState>,
}

#[derive(Default)]
struct ThrottleState {
    last_run: Option<Instant>,
    trailing: Option<JoinHandle<()>>,
}

impl Throttle {
    /// Create a throttle running `callback` at most once per `interval`
    ///
    /// Trailing calls are spawned on `runtime`, so `request` stays callable
    /// from host threads outside the runtime.
    pub fn new(
        interval: Duration,
        runtime: Handle,
        callback: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(ThrottleInner {
                interval,
                callback: Arc::new(callback),
                runtime,
                state: Mutex::new(ThrottleState::default()),
            }),
        }
    }

    /// Request a callback run
    ///
    /// Runs immediately when the interval since the last run has elapsed;
    /// otherwise schedules (or coalesces into) one trailing run at the
    /// interval boundary.
    pub fn request(&self) {
        let now = Instant::now();
        let run_now = {
            let mut state = self.inner.state.lock();
            if state.trailing.is_some() {
                return;
            }
            match state.last_run {
                Some(last) if now.duration_since(last) < self.inner.interval => {
                    let delay = self.inner.interval - now.duration_since(last);
                    let inner = self.inner.clone();
                    state.trailing = Some(self.inner.runtime.spawn(async move {
                        tokio::time::sleep(delay).await;
                        {
                            let mut state = inner.state.lock();
                            state.trailing = None;
                            state.last_run = Some(Instant::now());
                        }
                        (inner.callback)();
                    }));
                    false
                }
                _ => {
                    state.last_run = Some(now);
                    true
                }
            }
        };
        if run_now {
            (self.inner.callback)();
        }
    }

    /// Drop the pending trailing run, if any, without executing it
    pub fn cancel(&self) {
        if let Some(handle) = self.inner.state.lock().trailing.take() {
            handle.abort();
        }
    }
}

impl core::fmt::Debug for Throttle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Throttle")
            .field("interval", &self.inner.interval)
            .finish()
    }
}
