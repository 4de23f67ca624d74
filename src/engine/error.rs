//! Errors returned by engine operations.

use crate::core::{Args, HookKind};
use thiserror::Error;

/// Boxed error carried by hook and action failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while entering states or processing events.
///
/// Unhandled events and hook failures are distinct variants so a caller can
/// retry one and not the other.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid event \"{event}\"")]
    InvalidEvent { event: String },

    #[error(
        "Unhandled {}event \"{event}\" in state \"{}\"",
        deferred_prefix(.deferred),
        state_label(.state)
    )]
    UnhandledEvent {
        event: String,
        state: Option<String>,
        deferred: bool,
        args: Args,
    },

    #[error("Invalid state \"{state}\"")]
    InvalidState { state: String },

    #[error("Unknown state \"{state}\"")]
    UnknownState { state: String },

    #[error("The {hook} hook of state \"{state}\" failed: {source}")]
    HookFailed {
        state: String,
        hook: HookKind,
        #[source]
        source: BoxError,
    },

    #[error("Action for event \"{event}\" failed: {source}")]
    ActionFailed {
        event: String,
        #[source]
        source: BoxError,
    },

    #[error("Deferred event \"{event}\" was cancelled before it could be replayed")]
    DeferredCancelled { event: String },

    /// The runtime shut the transition task down before it finished.
    #[error("Transition to state \"{state}\" was interrupted by runtime shutdown")]
    TransitionInterrupted { state: String },
}

impl EngineError {
    pub(crate) fn unhandled(
        event: impl Into<String>,
        state: Option<String>,
        deferred: bool,
        args: Args,
    ) -> Self {
        Self::UnhandledEvent {
            event: event.into(),
            state,
            deferred,
            args,
        }
    }

    /// No handler was found for the event.
    pub fn is_unhandled(&self) -> bool {
        matches!(self, Self::UnhandledEvent { .. })
    }

    /// An entry or exit hook failed; the new state was still committed.
    pub fn is_hook_failure(&self) -> bool {
        matches!(self, Self::HookFailed { .. })
    }

    pub fn is_action_failure(&self) -> bool {
        matches!(self, Self::ActionFailed { .. })
    }

    /// The request itself was malformed or named a state that does not exist.
    pub fn is_invalid_request(&self) -> bool {
        matches!(
            self,
            Self::InvalidEvent { .. } | Self::InvalidState { .. } | Self::UnknownState { .. }
        )
    }
}

fn deferred_prefix(deferred: &bool) -> &'static str {
    if *deferred {
        "deferred "
    } else {
        ""
    }
}

fn state_label(state: &Option<String>) -> &str {
    state.as_deref().unwrap_or("unknown")
}
