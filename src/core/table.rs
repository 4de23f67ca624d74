//! The immutable state table an engine runs against.

use super::handler::Handler;
use super::state::State;
use crate::builder::TableBuilder;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Mapping from state name to [`State`].
///
/// Cloning a table is cheap: clones share the same immutable map, so one
/// table can back any number of engines.
#[derive(Clone, Default)]
pub struct StateTable {
    states: Arc<HashMap<String, State>>,
}

impl StateTable {
    /// Start a fragment-merging builder.
    pub fn builder() -> TableBuilder {
        TableBuilder::new()
    }

    pub(crate) fn from_map(states: HashMap<String, State>) -> Self {
        Self {
            states: Arc::new(states),
        }
    }

    pub fn get(&self, name: &str) -> Option<&State> {
        self.states.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.states.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.states.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &State)> {
        self.states.iter().map(|(name, state)| (name.as_str(), state))
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Resolve the handler for `event` while in `state`.
    ///
    /// Returns `None` when there is no current state, when the state is not
    /// in the table, or when the state has neither an exact nor a wildcard
    /// handler for the event.
    pub fn resolve(&self, state: Option<&str>, event: &str) -> Option<&Handler> {
        state
            .and_then(|name| self.states.get(name))
            .and_then(|state| state.resolve(event))
    }
}

impl<K: Into<String>> FromIterator<(K, State)> for StateTable {
    /// Build a table directly, without fragment merging or validation.
    fn from_iter<I: IntoIterator<Item = (K, State)>>(iter: I) -> Self {
        Self::from_map(
            iter.into_iter()
                .map(|(name, state)| (name.into(), state))
                .collect(),
        )
    }
}

impl fmt::Debug for StateTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut states: Vec<_> = self.states.iter().collect();
        states.sort_by(|a, b| a.0.cmp(b.0));
        f.debug_map().entries(states).finish()
    }
}
