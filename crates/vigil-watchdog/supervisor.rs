//! Shared crash-accounting state machine
//!
//! Both watchdog kinds embed a [`Supervisor`] instead of inheriting from an
//! abstract base: it owns the crash log, the lifecycle state, the typed
//! observer lists and the fault-hub registration, and encodes the
//! restart-versus-give-up policy. What varies per kind (fault ownership,
//! how to restart) stays in the embedding type.

use parking_lot::Mutex;

use vigil_core::{Fault, FaultHandler, FaultHub, HubGuard, ReportedError};

use crate::config::WatchdogConfig;
use crate::crash::CrashRecord;
use crate::events::{ErrorEvent, StateChange, SupervisorEvents};
use crate::state::WatchdogState;

pub(crate) struct Supervisor {
    config: WatchdogConfig,
    state: Mutex<WatchdogState>,
    crashes: Mutex<Vec<CrashRecord>>,
    pub(crate) events: SupervisorEvents,
    hub_guard: Mutex<Option<HubGuard>>,
}

impl Supervisor {
    pub(crate) fn new(config: WatchdogConfig) -> Self {
        Self {
            config,
            state: Mutex::new(WatchdogState::Initializing),
            crashes: Mutex::new(Vec::new()),
            events: SupervisorEvents::default(),
            hub_guard: Mutex::new(None),
        }
    }

    pub(crate) fn config(&self) -> &WatchdogConfig {
        &self.config
    }

    pub(crate) fn state(&self) -> WatchdogState {
        *self.state.lock()
    }

    /// Transition to `state`, firing the state-change event on an actual
    /// change. Listeners run outside the state lock.
    pub(crate) fn set_state(&self, state: WatchdogState) {
        {
            let mut current = self.state.lock();
            if *current == state {
                return;
            }
            *current = state;
        }
        self.events.state_change.emit(&StateChange { state });
    }

    pub(crate) fn crashes(&self) -> Vec<CrashRecord> {
        self.crashes.lock().clone()
    }

    /// Extract the fault a watchdog in this state may react to
    ///
    /// Foreign errors and faults without a context never qualify. Neither
    /// does anything observed while not `Ready`: faults arriving during a
    /// restart-in-progress are deliberately ignored.
    pub(crate) fn relevant_fault(&self, reported: &ReportedError) -> Option<Fault> {
        let fault = reported.as_fault()?;
        if !fault.has_context() {
            return None;
        }
        if !self.state().is_ready() {
            return None;
        }
        Some(fault.clone())
    }

    /// Record an accepted fault and run the full crash sequence
    ///
    /// Appends a crash record, decides whether to restart, transitions to
    /// `Crashed`, fires the error event, and on give-up transitions further
    /// to `CrashedPermanently`. Returns whether the embedding watchdog
    /// should attempt a restart.
    pub(crate) fn record_crash(&self, fault: &Fault) -> bool {
        self.crashes.lock().push(CrashRecord::from_fault(fault));
        let causes_restart = self.should_restart();

        self.set_state(WatchdogState::Crashed);
        self.events.error.emit(&ErrorEvent {
            error: fault.clone(),
            causes_restart,
        });

        if !causes_restart {
            self.set_state(WatchdogState::CrashedPermanently);
        }
        causes_restart
    }

    /// Restart-versus-give-up policy
    ///
    /// Crashes up to `crash_number_limit` always restart. Beyond that the
    /// average spacing of the most recent `crash_number_limit` crashes must
    /// exceed `minimum_non_error_time`: isolated faults are tolerated,
    /// crash loops are not.
    fn should_restart(&self) -> bool {
        let limit = self.config.crash_number_limit;
        if limit == 0 {
            return false;
        }

        let crashes = self.crashes.lock();
        if crashes.len() <= limit {
            return true;
        }

        let newest = crashes[crashes.len() - 1].date;
        let oldest = crashes[crashes.len() - 1 - limit].date;
        let window = newest.duration_since(oldest).unwrap_or_default();
        let average = window / limit as u32;
        average > self.config.minimum_non_error_time
    }

    pub(crate) fn start_error_handling(&self, handler: FaultHandler) {
        *self.hub_guard.lock() = Some(FaultHub::install(handler));
    }

    pub(crate) fn stop_error_handling(&self) {
        self.hub_guard.lock().take();
    }

    pub(crate) fn is_watching(&self) -> bool {
        self.hub_guard.lock().is_some()
    }

    /// Base teardown: detach from the hub and drop all listeners
    pub(crate) fn teardown(&self) {
        self.stop_error_handling();
        self.events.clear();
    }
}
