//! A single named state: its hooks and its event handlers.

use super::handler::{Action, Args, Handler, Hook, WILDCARD};
use crate::engine::Context;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;

/// Handler set of one state.
///
/// States are assembled with a fluent API and are immutable once placed in
/// a [`StateTable`](super::StateTable).
///
/// # Example
///
/// ```rust
/// use waypoint::{Handler, State};
/// use serde_json::json;
///
/// let locked = State::new()
///     .on_entry(|_ctx, _args| async { Ok(()) })
///     .transition("coin", "unlocked")
///     .noop("push")
///     .defer("maintenance")
///     .action("status", |_ctx, _args| async { Ok(json!("locked")) });
///
/// assert!(matches!(locked.resolve("coin"), Some(Handler::TransitionTo(t)) if t == "unlocked"));
/// assert!(locked.resolve("kick").is_none());
/// ```
#[derive(Clone, Default)]
pub struct State {
    entry: Option<Hook>,
    exit: Option<Hook>,
    events: HashMap<String, Handler>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the entry hook from an async closure.
    pub fn on_entry<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Context, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.with_entry(Hook::new(f))
    }

    /// Set the exit hook from an async closure.
    pub fn on_exit<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Context, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.with_exit(Hook::new(f))
    }

    pub fn with_entry(mut self, hook: Hook) -> Self {
        self.entry = Some(hook);
        self
    }

    pub fn with_exit(mut self, hook: Hook) -> Self {
        self.exit = Some(hook);
        self
    }

    /// Map an event name to a handler, replacing any previous one.
    pub fn handle(mut self, event: impl Into<String>, handler: Handler) -> Self {
        self.events.insert(event.into(), handler);
        self
    }

    /// Handle an event with an async action.
    pub fn action<F, Fut>(self, event: impl Into<String>, f: F) -> Self
    where
        F: Fn(Context, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.handle(event, Handler::Action(Action::new(f)))
    }

    pub fn defer(self, event: impl Into<String>) -> Self {
        self.handle(event, Handler::Defer)
    }

    pub fn noop(self, event: impl Into<String>) -> Self {
        self.handle(event, Handler::Noop)
    }

    /// Transition to `target` whenever `event` arrives.
    pub fn transition(self, event: impl Into<String>, target: impl Into<String>) -> Self {
        self.handle(event, Handler::TransitionTo(target.into()))
    }

    /// Fallback handler for events without an exact match.
    pub fn wildcard(self, handler: Handler) -> Self {
        self.handle(WILDCARD, handler)
    }

    pub fn entry(&self) -> Option<&Hook> {
        self.entry.as_ref()
    }

    pub fn exit(&self) -> Option<&Hook> {
        self.exit.as_ref()
    }

    /// Exact lookup, without the wildcard fallback.
    pub fn handler(&self, event: &str) -> Option<&Handler> {
        self.events.get(event)
    }

    /// Resolve the handler for an event: exact match first, then `*`.
    pub fn resolve(&self, event: &str) -> Option<&Handler> {
        self.events
            .get(event)
            .or_else(|| self.events.get(WILDCARD))
    }

    pub fn events(&self) -> impl Iterator<Item = (&str, &Handler)> {
        self.events.iter().map(|(name, handler)| (name.as_str(), handler))
    }

    /// Lay `other` over this state: every hook or event `other` defines wins,
    /// everything else is kept.
    pub(crate) fn overlay(&mut self, other: &State) {
        if let Some(entry) = &other.entry {
            self.entry = Some(entry.clone());
        }
        if let Some(exit) = &other.exit {
            self.exit = Some(exit.clone());
        }
        for (event, handler) in &other.events {
            self.events.insert(event.clone(), handler.clone());
        }
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut events: Vec<_> = self.events.iter().collect();
        events.sort_by(|a, b| a.0.cmp(b.0));
        f.debug_struct("State")
            .field("entry", &self.entry.is_some())
            .field("exit", &self.exit.is_some())
            .field("events", &events)
            .finish()
    }
}
