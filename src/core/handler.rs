//! Handler slots for states.
//!
//! Every event a state knows about maps to one [`Handler`]: an [`Action`] to
//! run, a request to defer the event until the next transition, an explicit
//! no-op, or a shorthand transition to another state. Entry and exit hooks
//! are [`Hook`]s.

use crate::engine::Context;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Arguments passed to hooks and actions.
pub type Args = Vec<Value>;

/// Key of the fallback handler used when no exact event name matches.
pub const WILDCARD: &str = "*";

type ActionFn = dyn Fn(Context, Args) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync;
type HookFn = dyn Fn(Context, Args) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync;

/// An event handler function.
///
/// Actions receive a [`Context`] bound to the engine and the arguments the
/// event was dispatched with. The value they return becomes the result of
/// the dispatch; an error becomes [`EngineError::ActionFailed`].
///
/// [`EngineError::ActionFailed`]: crate::EngineError::ActionFailed
///
/// # Example
///
/// ```rust
/// use waypoint::Action;
/// use serde_json::json;
///
/// let double = Action::sync(|_ctx, args| {
///     let n = args.first().and_then(|v| v.as_i64()).unwrap_or(0);
///     Ok(json!(n * 2))
/// });
///
/// let greet = Action::new(|ctx, _args| async move {
///     Ok(json!(format!("hello from {}", ctx.state().unwrap_or("nowhere"))))
/// });
/// # let _ = (double, greet);
/// ```
#[derive(Clone)]
pub struct Action {
    f: Arc<ActionFn>,
}

impl Action {
    /// Create an action from an async closure.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Context, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self {
            f: Arc::new(move |ctx, args| f(ctx, args).boxed()),
        }
    }

    /// Create an action from a synchronous closure.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&Context, Args) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self::new(move |ctx, args| futures::future::ready(f(&ctx, args)))
    }

    /// Run the action. A panic inside the action is reported as an error.
    pub(crate) async fn call(&self, ctx: Context, args: Args) -> anyhow::Result<Value> {
        guarded("action", || (self.f)(ctx, args)).await
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Action(..)")
    }
}

/// An entry or exit hook.
#[derive(Clone)]
pub struct Hook {
    f: Arc<HookFn>,
}

impl Hook {
    /// Create a hook from an async closure.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Context, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            f: Arc::new(move |ctx, args| f(ctx, args).boxed()),
        }
    }

    /// Create a hook from a synchronous closure.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&Context, Args) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::new(move |ctx, args| futures::future::ready(f(&ctx, args)))
    }

    pub(crate) async fn call(&self, ctx: Context, args: Args) -> anyhow::Result<()> {
        guarded("hook", || (self.f)(ctx, args)).await
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Hook(..)")
    }
}

/// Which hook of a state ran.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookKind {
    Entry,
    Exit,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entry => f.write_str("entry"),
            Self::Exit => f.write_str("exit"),
        }
    }
}

/// What a state does with an event.
#[derive(Clone)]
pub enum Handler {
    /// Run the action and settle the dispatch with its result.
    Action(Action),

    /// Queue the event and replay it after the next transition.
    Defer,

    /// Accept the event and do nothing.
    Noop,

    /// Transition to the named state with the event's arguments.
    TransitionTo(String),
}

impl Handler {
    /// Shorthand for `Handler::Action(Action::new(f))`.
    pub fn action<F, Fut>(f: F) -> Self
    where
        F: Fn(Context, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self::Action(Action::new(f))
    }

    /// Shorthand for `Handler::TransitionTo(target.into())`.
    pub fn transition_to(target: impl Into<String>) -> Self {
        Self::TransitionTo(target.into())
    }

    /// Short name of the variant, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Action(_) => "action",
            Self::Defer => "defer",
            Self::Noop => "noop",
            Self::TransitionTo(_) => "transition",
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Action(_) => f.write_str("Action(..)"),
            Self::Defer => f.write_str("Defer"),
            Self::Noop => f.write_str("Noop"),
            Self::TransitionTo(target) => f.debug_tuple("TransitionTo").field(target).finish(),
        }
    }
}

impl From<Action> for Handler {
    fn from(action: Action) -> Self {
        Self::Action(action)
    }
}

async fn guarded<T, F>(what: &str, make: F) -> anyhow::Result<T>
where
    F: FnOnce() -> BoxFuture<'static, anyhow::Result<T>>,
{
    let future = match std::panic::catch_unwind(AssertUnwindSafe(make)) {
        Ok(future) => future,
        Err(payload) => return Err(panicked(what, &payload)),
    };
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(panicked(what, &payload)),
    }
}

fn panicked(what: &str, payload: &Box<dyn Any + Send>) -> anyhow::Error {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    };
    anyhow::anyhow!("{what} panicked: {message}")
}
