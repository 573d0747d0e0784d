//! Append-only crash records

use std::time::SystemTime;

use vigil_core::{Fault, SourceLocation};

/// One entry in a watchdog's crash log
///
/// Records are appended on every accepted fault and never mutated. The log
/// drives the restart-versus-give-up policy and is exposed read-only for
/// diagnostics and telemetry collectors.
#[derive(Debug, Clone)]
pub struct CrashRecord {
    /// Fault message
    pub message: String,
    /// Captured stack trace, when available
    pub stack: Option<String>,
    /// Wall-clock time the crash was recorded
    pub date: SystemTime,
    /// Source position the fault was raised from, when known
    pub location: Option<SourceLocation>,
}

impl CrashRecord {
    pub(crate) fn from_fault(fault: &Fault) -> Self {
        Self {
            message: fault.message().to_string(),
            stack: fault.stack().map(str::to_string),
            date: SystemTime::now(),
            location: fault.location().cloned(),
        }
    }
}
