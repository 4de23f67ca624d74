//! Build errors for state tables and engines.

use thiserror::Error;

/// Errors that can occur when building a table or an engine.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Initial state \"{state}\" is not in the state table")]
    UnknownInitialState { state: String },

    #[error("State table is invalid: {}", describe(.violations))]
    InvalidTable { violations: Vec<TableViolation> },
}

impl BuildError {
    /// Violations behind an [`BuildError::InvalidTable`], empty otherwise.
    pub fn violations(&self) -> &[TableViolation] {
        match self {
            Self::InvalidTable { violations } => violations,
            Self::UnknownInitialState { .. } => &[],
        }
    }
}

/// A single problem found while validating a merged table.
#[derive(Debug, Clone, Error, PartialEq, Eq, PartialOrd, Ord)]
pub enum TableViolation {
    #[error("state with an empty name")]
    EmptyStateName,

    #[error("state \"{state}\" handles an event with an empty name")]
    EmptyEventName { state: String },

    #[error("event \"{event}\" in state \"{state}\" transitions to unknown state \"{target}\"")]
    DanglingTarget {
        state: String,
        event: String,
        target: String,
    },
}

fn describe(violations: &[TableViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
