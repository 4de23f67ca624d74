//! Fragment-merging builder for state tables.

use crate::builder::error::{BuildError, TableViolation};
use crate::core::{Handler, State, StateTable};
use std::collections::HashMap;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

type Check = Validation<(), NonEmptyVec<TableViolation>>;

/// Builds a [`StateTable`] out of ordered fragments.
///
/// Fragments are laid over each other base first: for every state, each
/// hook and each event handler comes from the last fragment that defines it,
/// everything else is the union of all fragments.
///
/// # Example
///
/// ```rust
/// use waypoint::{Handler, State, StateTable};
///
/// let base = [
///     ("idle", State::new().transition("start", "busy").noop("ping")),
///     ("busy", State::new().transition("stop", "idle")),
/// ];
/// let derived = [("idle", State::new().defer("ping"))];
///
/// let table = StateTable::builder()
///     .fragment(base)
///     .fragment(derived)
///     .build()
///     .unwrap();
///
/// let idle = table.get("idle").unwrap();
/// assert!(matches!(idle.resolve("ping"), Some(Handler::Defer)));
/// assert!(matches!(idle.resolve("start"), Some(Handler::TransitionTo(_))));
/// ```
#[derive(Debug, Default)]
pub struct TableBuilder {
    fragments: Vec<Vec<(String, State)>>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment; later fragments override earlier ones.
    pub fn fragment<K, I>(mut self, states: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, State)>,
    {
        self.fragments.push(
            states
                .into_iter()
                .map(|(name, state)| (name.into(), state))
                .collect(),
        );
        self
    }

    /// Append a single-state fragment.
    pub fn state(self, name: impl Into<String>, state: State) -> Self {
        self.fragment([(name.into(), state)])
    }

    /// Merge the fragments and validate the result.
    ///
    /// Every violation is reported, sorted, not only the first one found.
    pub fn build(self) -> Result<StateTable, BuildError> {
        let merged = merge(self.fragments);
        match validate(&merged) {
            Validation::Success(()) => Ok(StateTable::from_map(merged)),
            Validation::Failure(errors) => {
                let mut violations: Vec<_> = errors.iter().cloned().collect();
                violations.sort();
                violations.dedup();
                Err(BuildError::InvalidTable { violations })
            }
        }
    }
}

fn merge(fragments: Vec<Vec<(String, State)>>) -> HashMap<String, State> {
    let mut merged: HashMap<String, State> = HashMap::new();
    for (name, state) in fragments.into_iter().flatten() {
        merged.entry(name).or_default().overlay(&state);
    }
    merged
}

fn validate(states: &HashMap<String, State>) -> Check {
    let mut checks: Vec<Check> = Vec::new();

    for (name, state) in states {
        if name.is_empty() {
            checks.push(Validation::fail(TableViolation::EmptyStateName));
        }
        for (event, handler) in state.events() {
            if event.is_empty() {
                checks.push(Validation::fail(TableViolation::EmptyEventName {
                    state: name.clone(),
                }));
            }
            if let Handler::TransitionTo(target) = handler {
                if !states.contains_key(target) {
                    checks.push(Validation::fail(TableViolation::DanglingTarget {
                        state: name.clone(),
                        event: event.to_string(),
                        target: target.clone(),
                    }));
                }
            }
        }
    }

    if checks.is_empty() {
        return Validation::success(());
    }
    Validation::all_vec(checks).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_fragment_builds() {
        let table = TableBuilder::new()
            .state("a", State::new().transition("go", "b"))
            .state("b", State::new())
            .build()
            .unwrap();

        assert_eq!(table.len(), 2);
        assert!(table.contains("a"));
    }

    #[test]
    fn most_derived_fragment_wins_per_event() {
        let table = TableBuilder::new()
            .fragment([("s", State::new().noop("a").noop("b"))])
            .fragment([("s", State::new().defer("b").defer("c"))])
            .build()
            .unwrap();

        let s = table.get("s").unwrap();
        assert!(matches!(s.handler("a"), Some(Handler::Noop)));
        assert!(matches!(s.handler("b"), Some(Handler::Defer)));
        assert!(matches!(s.handler("c"), Some(Handler::Defer)));
    }

    #[test]
    fn hooks_survive_unless_overridden() {
        let table = TableBuilder::new()
            .fragment([("s", State::new().on_entry(|_, _| async { Ok(()) }))])
            .fragment([("s", State::new().on_exit(|_, _| async { Ok(()) }))])
            .build()
            .unwrap();

        let s = table.get("s").unwrap();
        assert!(s.entry().is_some());
        assert!(s.exit().is_some());
    }

    #[test]
    fn derived_fragments_add_states() {
        let table = TableBuilder::new()
            .fragment([("a", State::new())])
            .fragment([("b", State::new().transition("back", "a"))])
            .build()
            .unwrap();

        let mut names: Vec<_> = table.names().collect();
        names.sort();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn target_may_come_from_a_later_fragment() {
        let result = TableBuilder::new()
            .fragment([("a", State::new().transition("go", "b"))])
            .fragment([("b", State::new())])
            .build();

        assert!(result.is_ok());
    }

    #[test]
    fn every_violation_is_reported() {
        let result = TableBuilder::new()
            .state("", State::new())
            .state(
                "a",
                State::new()
                    .transition("go", "nowhere")
                    .transition("also", "missing")
                    .noop(""),
            )
            .build();

        let err = result.unwrap_err();
        let violations = err.violations();
        assert_eq!(violations.len(), 4);
        assert_eq!(violations[0], TableViolation::EmptyStateName);
        assert!(violations.contains(&TableViolation::EmptyEventName { state: "a".into() }));
        assert!(violations.contains(&TableViolation::DanglingTarget {
            state: "a".into(),
            event: "go".into(),
            target: "nowhere".into(),
        }));
        assert!(violations.contains(&TableViolation::DanglingTarget {
            state: "a".into(),
            event: "also".into(),
            target: "missing".into(),
        }));
    }

    #[test]
    fn empty_builder_yields_empty_table() {
        let table = TableBuilder::new().build().unwrap();

        assert!(table.is_empty());
    }
}
