//! Context handed to hooks and actions.

use super::machine::Machine;
use crate::core::Args;
use std::fmt;

/// What a hook or action knows about the dispatch that invoked it.
///
/// Hooks and replayed deferred actions run while the engine's gate is held.
/// Awaiting [`Machine::enter`] or [`Machine::process`] from inside them would
/// wait on that same gate forever; use [`Context::schedule`] to chain a
/// transition instead.
#[derive(Clone)]
pub struct Context {
    machine: Machine,
    state: Option<String>,
    event: Option<String>,
}

impl Context {
    pub(crate) fn new(machine: Machine, state: Option<String>, event: Option<String>) -> Self {
        Self {
            machine,
            state,
            event,
        }
    }

    /// The engine this invocation belongs to.
    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    /// State the engine was in when the handler was resolved.
    ///
    /// For an exit hook this is the state being left, for an entry hook the
    /// state being entered.
    pub fn state(&self) -> Option<&str> {
        self.state.as_deref()
    }

    /// Event being dispatched; `None` for hooks and state-keyed handlers.
    pub fn event(&self) -> Option<&str> {
        self.event.as_deref()
    }

    /// Queue a transition to `target`.
    ///
    /// Inside a transition it runs right after the current one finishes,
    /// before the gate is released. From an action it runs before the
    /// dispatch that invoked the action returns. Failures are logged.
    pub fn schedule(&self, target: impl Into<String>, args: Args) {
        self.machine.schedule(target.into(), args);
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("machine", &self.machine.name())
            .field("state", &self.state)
            .field("event", &self.event)
            .finish()
    }
}
