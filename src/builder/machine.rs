//! Builder for constructing engines.

use crate::builder::error::BuildError;
use crate::config::MachineConfig;
use crate::core::StateTable;
use crate::engine::Machine;
use crate::observe::{Observer, Observers};
use std::sync::Arc;

/// Builder for a [`Machine`] over a fixed table.
pub struct MachineBuilder {
    table: StateTable,
    config: MachineConfig,
    observers: Observers,
}

impl MachineBuilder {
    pub fn new(table: StateTable) -> Self {
        Self {
            table,
            config: MachineConfig::default(),
            observers: Observers::default(),
        }
    }

    /// Replace the whole configuration, e.g. one loaded with
    /// [`MachineConfig::from_json`].
    pub fn config(mut self, config: MachineConfig) -> Self {
        self.config = config;
        self
    }

    /// Name used in logs and signals.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// State to enter before anything else is dispatched.
    ///
    /// The transition is not run by [`build`](Self::build). It is queued and
    /// runs, entry hook included, on the first `enter`, `process` or `ready`
    /// call, so [`Machine::state`] reports `None` until then. Await
    /// [`Machine::ready`] to enter it eagerly.
    pub fn initial(mut self, state: impl Into<String>) -> Self {
        self.config.initial_state = Some(state.into());
        self
    }

    pub fn history_limit(mut self, limit: usize) -> Self {
        self.config.history_limit = limit;
        self
    }

    pub fn observer<O: Observer + 'static>(mut self, observer: O) -> Self {
        self.observers.push(Arc::new(observer));
        self
    }

    /// Build the engine.
    /// Returns an error if the initial state is not in the table.
    pub fn build(self) -> Result<Machine, BuildError> {
        if let Some(initial) = &self.config.initial_state {
            if initial.is_empty() || !self.table.contains(initial) {
                return Err(BuildError::UnknownInitialState {
                    state: initial.clone(),
                });
            }
        }
        Ok(Machine::from_parts(self.table, &self.config, self.observers))
    }
}

impl std::fmt::Debug for MachineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MachineBuilder")
            .field("table", &self.table)
            .field("config", &self.config)
            .field("observers", &self.observers.len())
            .finish()
    }
}
