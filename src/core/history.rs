//! Transition history tracking.
//!
//! Every committed transition is recorded, including the ones whose hooks
//! failed, so the path an engine took can be inspected after the fact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{vec_deque, VecDeque};
use std::time::Duration;

/// Default number of transitions kept by a [`StateHistory`].
pub const DEFAULT_HISTORY_LIMIT: usize = 64;

/// How a committed transition ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionOutcome {
    /// Hooks ran and deferred events were replayed.
    Completed,
    /// The exit hook of the old state failed; the new state was still committed.
    ExitFailed,
    /// The entry hook of the new state failed.
    EntryFailed,
}

/// Record of a single committed transition.
///
/// # Example
///
/// ```rust
/// use waypoint::{StateTransition, TransitionOutcome};
/// use chrono::Utc;
///
/// let transition = StateTransition {
///     from: Some("locked".to_string()),
///     to: "unlocked".to_string(),
///     timestamp: Utc::now(),
///     outcome: TransitionOutcome::Completed,
/// };
/// assert!(transition.succeeded());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    /// The state being left; `None` for the first transition
    pub from: Option<String>,
    /// The state that was committed
    pub to: String,
    /// When the transition finished
    pub timestamp: DateTime<Utc>,
    pub outcome: TransitionOutcome,
}

impl StateTransition {
    pub fn succeeded(&self) -> bool {
        self.outcome == TransitionOutcome::Completed
    }
}

/// Ordered, bounded history of transitions.
///
/// Once `limit` transitions are stored, recording a new one drops the
/// oldest. A limit of zero disables recording.
///
/// # Example
///
/// ```rust
/// use waypoint::{StateHistory, StateTransition, TransitionOutcome};
/// use chrono::Utc;
///
/// let mut history = StateHistory::new();
/// for (from, to) in [(None, "start"), (Some("start"), "middle"), (Some("middle"), "end")] {
///     history.record(StateTransition {
///         from: from.map(str::to_string),
///         to: to.to_string(),
///         timestamp: Utc::now(),
///         outcome: TransitionOutcome::Completed,
///     });
/// }
///
/// assert_eq!(history.get_path(), vec!["start", "middle", "end"]);
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StateHistory {
    transitions: VecDeque<StateTransition>,
    limit: usize,
}

impl Default for StateHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl StateHistory {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            transitions: VecDeque::new(),
            limit,
        }
    }

    /// Record a transition, evicting the oldest one when full.
    pub fn record(&mut self, transition: StateTransition) {
        if self.limit == 0 {
            return;
        }
        while self.transitions.len() >= self.limit {
            self.transitions.pop_front();
        }
        self.transitions.push_back(transition);
    }

    /// Get the path of states traversed.
    ///
    /// Starts with the `from` state of the oldest retained transition (if it
    /// had one), followed by the `to` state of each transition.
    pub fn get_path(&self) -> Vec<&str> {
        let mut path = Vec::new();
        if let Some(from) = self.transitions.front().and_then(|t| t.from.as_deref()) {
            path.push(from);
        }
        for transition in &self.transitions {
            path.push(transition.to.as_str());
        }
        path
    }

    /// Time between the oldest and newest retained transitions.
    pub fn duration(&self) -> Option<Duration> {
        if let (Some(first), Some(last)) = (self.transitions.front(), self.transitions.back()) {
            let duration = last.timestamp.signed_duration_since(first.timestamp);
            duration.to_std().ok()
        } else {
            None
        }
    }

    /// Retained transitions, oldest first.
    pub fn transitions(&self) -> vec_deque::Iter<'_, StateTransition> {
        self.transitions.iter()
    }

    pub fn last(&self) -> Option<&StateTransition> {
        self.transitions.back()
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}
