//! Structured runtime faults and the process-wide fault hub
//!
//! A [`Fault`] is the structured error a supervised editor runtime raises
//! when something goes wrong deep inside an instance. Unlike an ordinary
//! `Err`, it carries an optional handle into the object graph it originated
//! from, which lets supervisors attribute it to a specific instance.
//!
//! [`FaultHub`] is the process-wide multiplexer replacing global error and
//! unhandled-rejection hooks: supervisors install a handler and receive
//! every reported error; each handler decides independently whether the
//! error belongs to its instance. Registration is scoped by the returned
//! [`HubGuard`], so dropping a supervisor always detaches its hook.

use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::graph::GraphHandle;

/// Source position a fault was raised from, when known
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    /// File the fault originated in
    pub file: String,
    /// 1-based line number
    pub line: u32,
    /// 1-based column number
    pub column: u32,
}

impl SourceLocation {
    /// Create a new source location
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Structured runtime fault with an optional object-graph context
///
/// A fault without a context is one the runtime raised too early or too
/// late in a lifecycle to attribute safely; supervisors never react to it.
#[derive(Clone)]
pub struct Fault {
    message: String,
    stack: Option<String>,
    location: Option<SourceLocation>,
    context: Option<GraphHandle>,
}

impl Fault {
    /// Create a fault with a message and no context
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
            location: None,
            context: None,
        }
    }

    /// Attach the object-graph handle the fault originated from
    #[must_use]
    pub fn with_context(mut self, context: GraphHandle) -> Self {
        self.context = Some(context);
        self
    }

    /// Attach a captured stack trace
    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Attach the source position the fault was raised from
    #[must_use]
    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// The fault message
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The captured stack trace, if any
    #[must_use]
    pub fn stack(&self) -> Option<&str> {
        self.stack.as_deref()
    }

    /// The source position, if known
    #[must_use]
    pub fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }

    /// The object-graph context, if the fault is attributable
    #[must_use]
    pub fn context(&self) -> Option<&GraphHandle> {
        self.context.as_ref()
    }

    /// Whether the fault carries an attributable context
    #[must_use]
    pub fn has_context(&self) -> bool {
        self.context.is_some()
    }
}

impl fmt::Debug for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fault")
            .field("message", &self.message)
            .field("stack", &self.stack)
            .field("location", &self.location)
            .field("context", &self.context.as_ref().map(|_| "<graph handle>"))
            .finish()
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// An error reported into the hub
///
/// Only the `Fault` variant can ever drive recovery; `Foreign` covers
/// arbitrary third-party errors that pass through untouched.
#[derive(Debug, Clone)]
pub enum ReportedError {
    /// A structured fault raised by a supervised runtime
    Fault(Fault),
    /// Any other error observed by the host's global hooks
    Foreign(String),
}

impl ReportedError {
    /// The contained fault, when structured
    #[must_use]
    pub fn as_fault(&self) -> Option<&Fault> {
        match self {
            Self::Fault(fault) => Some(fault),
            Self::Foreign(..) => None,
        }
    }
}

/// Handler callback installed on the hub
pub type FaultHandler = Arc<dyn Fn(&ReportedError) + Send + Sync>;

static HANDLERS: Mutex<Vec<(u64, FaultHandler)>> = Mutex::new(Vec::new());
static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(0);

/// Process-wide error multiplexer
///
/// Hosts route their global synchronous-error and unhandled-rejection hooks
/// into [`FaultHub::report_error`] and [`FaultHub::report_rejection`]; both
/// feed the same set of installed handlers. Multiple supervisors keep their
/// handlers installed concurrently and filter independently.
pub struct FaultHub;

impl FaultHub {
    /// Install a handler, scoped to the returned guard
    #[must_use]
    pub fn install(handler: FaultHandler) -> HubGuard {
        let id = NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed);
        HANDLERS.lock().push((id, handler));
        HubGuard { id }
    }

    /// Report an error caught by a synchronous global hook
    pub fn report_error(error: &ReportedError) {
        Self::dispatch(error);
    }

    /// Report an error surfaced as an unhandled async rejection
    pub fn report_rejection(error: &ReportedError) {
        Self::dispatch(error);
    }

    /// Number of handlers currently installed
    #[must_use]
    pub fn handler_count() -> usize {
        HANDLERS.lock().len()
    }

    fn dispatch(error: &ReportedError) {
        // Snapshot the handler list so callbacks can install or remove
        // handlers without deadlocking.
        let handlers: Vec<FaultHandler> = HANDLERS
            .lock()
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();
        for handler in handlers {
            handler(error);
        }
    }

    fn remove(id: u64) {
        HANDLERS.lock().retain(|(handler_id, _)| *handler_id != id);
    }
}

/// Scoped registration token for a hub handler
///
/// Dropping the guard removes the handler.
#[derive(Debug)]
pub struct HubGuard {
    id: u64,
}

impl Drop for HubGuard {
    fn drop(&mut self) {
        FaultHub::remove(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Traversable;
    use std::sync::atomic::AtomicUsize;

    struct Ctx;
    impl Traversable for Ctx {}

    #[test]
    fn fault_builder_accessors() {
        let context: GraphHandle = Arc::new(Ctx);
        let fault = Fault::new("model out of sync")
            .with_stack("at apply_operation")
            .with_location(SourceLocation::new("model.rs", 42, 7))
            .with_context(context);

        assert_eq!(fault.message(), "model out of sync");
        assert_eq!(fault.stack(), Some("at apply_operation"));
        assert_eq!(fault.location().unwrap().line, 42);
        assert!(fault.has_context());
        assert_eq!(fault.to_string(), "model out of sync");
    }

    #[test]
    fn reported_error_classification() {
        let fault = ReportedError::Fault(Fault::new("x"));
        assert!(fault.as_fault().is_some());

        let foreign = ReportedError::Foreign("TypeError: y is undefined".into());
        assert!(foreign.as_fault().is_none());
    }

    /// Count only reports carrying `marker`, so concurrently running tests
    /// sharing the process-wide hub cannot skew each other's counters.
    fn counting_handler(marker: &'static str, seen: Arc<AtomicUsize>) -> FaultHandler {
        Arc::new(move |error| {
            let message = match error {
                ReportedError::Fault(fault) => fault.message(),
                ReportedError::Foreign(message) => message.as_str(),
            };
            if message == marker {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        })
    }

    #[test]
    fn hub_dispatches_to_installed_handlers() {
        let marker = "hub_dispatches_to_installed_handlers";
        let seen = Arc::new(AtomicUsize::new(0));
        let guard = FaultHub::install(counting_handler(marker, seen.clone()));

        FaultHub::report_error(&ReportedError::Foreign(marker.into()));
        FaultHub::report_rejection(&ReportedError::Fault(Fault::new(marker)));
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        drop(guard);
        FaultHub::report_error(&ReportedError::Foreign(marker.into()));
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn guards_remove_only_their_own_handler() {
        let marker = "guards_remove_only_their_own_handler";
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let guard_a = FaultHub::install(counting_handler(marker, first.clone()));
        let guard_b = FaultHub::install(counting_handler(marker, second.clone()));

        drop(guard_a);
        FaultHub::report_error(&ReportedError::Foreign(marker.into()));

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        drop(guard_b);
    }
}
