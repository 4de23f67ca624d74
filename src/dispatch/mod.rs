//! Callable adapters over an engine.
//!
//! An [`EventHandler`] packages "dispatch this to the machine" into a value
//! that can be handed to other code: either a fixed event name, or a map of
//! actions keyed by the state the machine is in when the handler is called.
//! A [`CallbackEventHandler`] does the same for callers that want a
//! completion callback instead of a future.

use crate::core::{Action, Args, WILDCARD};
use crate::engine::{EngineError, Machine};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

/// Target of an [`EventHandler`].
#[derive(Clone, Debug)]
pub enum Dispatch {
    /// Forward to [`Machine::process`] with this event name.
    Event(String),
    /// Run the action registered for the current state name.
    ByState(StateHandlers),
}

impl From<&str> for Dispatch {
    fn from(event: &str) -> Self {
        Self::Event(event.to_string())
    }
}

impl From<String> for Dispatch {
    fn from(event: String) -> Self {
        Self::Event(event)
    }
}

impl From<StateHandlers> for Dispatch {
    fn from(handlers: StateHandlers) -> Self {
        Self::ByState(handlers)
    }
}

/// Actions keyed by state name, with `*` as the fallback.
///
/// The label is reported as the event name when no action covers the
/// current state.
///
/// # Example
///
/// ```rust
/// use waypoint::{Action, StateHandlers};
/// use serde_json::json;
///
/// let status = StateHandlers::new("status")
///     .on("locked", Action::sync(|_, _| Ok(json!("insert coin"))))
///     .fallback(Action::sync(|_, _| Ok(json!("go ahead"))));
/// assert_eq!(status.label(), "status");
/// ```
#[derive(Clone)]
pub struct StateHandlers {
    label: String,
    handlers: HashMap<String, Action>,
}

impl StateHandlers {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            handlers: HashMap::new(),
        }
    }

    pub fn on(mut self, state: impl Into<String>, action: Action) -> Self {
        self.handlers.insert(state.into(), action);
        self
    }

    pub fn fallback(self, action: Action) -> Self {
        self.on(WILDCARD, action)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Action for `state`, falling back to `*`.
    pub fn resolve(&self, state: Option<&str>) -> Option<&Action> {
        state
            .and_then(|name| self.handlers.get(name))
            .or_else(|| self.handlers.get(WILDCARD))
    }
}

impl fmt::Debug for StateHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut states: Vec<_> = self.handlers.keys().collect();
        states.sort();
        f.debug_struct("StateHandlers")
            .field("label", &self.label)
            .field("states", &states)
            .finish()
    }
}

/// A reusable dispatch into an engine.
#[derive(Clone)]
pub struct EventHandler {
    machine: Machine,
    dispatch: Arc<Dispatch>,
}

impl EventHandler {
    pub(crate) fn new(machine: Machine, dispatch: Dispatch) -> Self {
        Self {
            machine,
            dispatch: Arc::new(dispatch),
        }
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    pub async fn call(&self, args: Args) -> Result<Value, EngineError> {
        match self.dispatch.as_ref() {
            Dispatch::Event(event) => self.machine.process(event, args).await,
            Dispatch::ByState(handlers) => self.machine.dispatch_by_state(handlers, args).await,
        }
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandler")
            .field("machine", &self.machine.name())
            .field("dispatch", &self.dispatch)
            .finish()
    }
}

/// Callback-style wrapper around an [`EventHandler`].
///
/// Each call spawns the dispatch and returns immediately; the returned
/// handle completes once the dispatch and the callback (if any) are done.
///
/// Dispatches are spawned on the tokio runtime that was current when the
/// handler was created, so `call` and `call_with` may be used from threads
/// outside of it. Use [`on_runtime`](Self::on_runtime) to pick a runtime
/// explicitly.
///
/// # Panics
///
/// `call` and `call_with` panic if the handler was created outside a tokio
/// runtime, was not given one with `on_runtime`, and is called outside a
/// runtime as well.
#[derive(Clone, Debug)]
pub struct CallbackEventHandler {
    inner: EventHandler,
    runtime: Option<Handle>,
}

impl CallbackEventHandler {
    pub(crate) fn new(inner: EventHandler) -> Self {
        Self {
            inner,
            runtime: Handle::try_current().ok(),
        }
    }

    /// Spawn dispatches on `runtime`.
    pub fn on_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    fn spawn<F>(&self, task: F) -> JoinHandle<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        match &self.runtime {
            Some(runtime) => runtime.spawn(task),
            None => tokio::spawn(task),
        }
    }

    /// Dispatch without a callback. Failures are logged and discarded.
    pub fn call(&self, args: Args) -> JoinHandle<()> {
        let handler = self.inner.clone();
        self.spawn(async move {
            if let Err(err) = handler.call(args).await {
                debug!(error = %err, "discarding failed dispatch");
            }
        })
    }

    /// Dispatch and hand the outcome to `callback`.
    pub fn call_with<F>(&self, args: Args, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(Result<Value, EngineError>) + Send + 'static,
    {
        let handler = self.inner.clone();
        self.spawn(async move {
            let outcome = handler.call(args).await;
            callback(outcome);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{State, StateTable};
    use crate::args;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    fn counting(counter: &Arc<AtomicUsize>, value: Value) -> Action {
        let counter = counter.clone();
        Action::sync(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(value.clone())
        })
    }

    async fn machine(states: &[&str], initial: &str) -> Machine {
        let table = StateTable::from_iter(states.iter().map(|name| (*name, State::new())));
        let machine = Machine::builder(table).initial(initial).build().unwrap();
        machine.ready().await;
        machine
    }

    #[test]
    fn dispatch_from_names_and_maps() {
        assert!(matches!(Dispatch::from("ev"), Dispatch::Event(e) if e == "ev"));
        assert!(matches!(Dispatch::from("ev".to_string()), Dispatch::Event(_)));
        assert!(matches!(
            Dispatch::from(StateHandlers::new("status")),
            Dispatch::ByState(_)
        ));
    }

    #[test]
    fn state_handlers_fall_back_to_wildcard() {
        let handlers = StateHandlers::new("status")
            .on("start", Action::sync(|_, _| Ok(json!(1))))
            .fallback(Action::sync(|_, _| Ok(json!(2))));

        assert!(handlers.resolve(Some("start")).is_some());
        assert!(handlers.resolve(Some("other")).is_some());
        assert!(handlers.resolve(None).is_some());
        assert!(StateHandlers::new("status").resolve(Some("start")).is_none());
        assert_eq!(handlers.label(), "status");
    }

    #[tokio::test]
    async fn named_handler_forwards_to_process() {
        let table = StateTable::from_iter([(
            "start",
            State::new().action("ev", |_ctx, args| async move { Ok(json!(args.len())) }),
        )]);
        let machine = Machine::builder(table).initial("start").build().unwrap();

        let handler = machine.event_handler("ev");

        assert_eq!(handler.call(args![1, 2, 3]).await.unwrap(), json!(3));
        assert_eq!(machine.last_event().as_deref(), Some("ev"));
    }

    #[tokio::test]
    async fn state_keyed_handler_follows_current_state() {
        let machine = machine(&["start", "work", "end", "unexp"], "start").await;
        let start = Arc::new(AtomicUsize::new(0));
        let work = Arc::new(AtomicUsize::new(0));
        let end = Arc::new(AtomicUsize::new(0));
        let handler = machine.event_handler(
            StateHandlers::new("step")
                .on("start", counting(&start, json!("s")))
                .on("work", counting(&work, json!("w")))
                .on("end", counting(&end, json!("e"))),
        );

        assert_eq!(handler.call(args![]).await.unwrap(), json!("s"));
        machine.enter("work", args![]).await.unwrap();
        assert_eq!(handler.call(args![]).await.unwrap(), json!("w"));
        machine.enter("end", args![]).await.unwrap();
        assert_eq!(handler.call(args![]).await.unwrap(), json!("e"));
        machine.enter("unexp", args![]).await.unwrap();
        let err = handler.call(args![]).await.unwrap_err();

        assert!(err.is_unhandled());
        assert_eq!(start.load(Ordering::SeqCst), 1);
        assert_eq!(work.load(Ordering::SeqCst), 1);
        assert_eq!(end.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn state_keyed_handler_preserves_arguments() {
        let machine = machine(&["start", "end"], "start").await;
        let handler = machine.event_handler(
            StateHandlers::new("echo").fallback(Action::sync(|_, args| Ok(Value::Array(args)))),
        );

        let result = handler.call(args!["aaa", 1]).await.unwrap();

        assert_eq!(result, json!(["aaa", 1]));
    }

    #[tokio::test]
    async fn uncovered_state_is_unhandled() {
        let machine = machine(&["start", "end"], "start").await;
        let handler = machine.event_handler(
            StateHandlers::new("status").on("end", Action::sync(|_, _| Ok(json!(1)))),
        );

        let err = handler.call(args![]).await.unwrap_err();

        match err {
            EngineError::UnhandledEvent { event, state, .. } => {
                assert_eq!(event, "status");
                assert_eq!(state.as_deref(), Some("start"));
            }
            other => panic!("expected UnhandledEvent, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn state_handler_wins_over_event_handlers() {
        let table = StateTable::from_iter([(
            "start",
            State::new()
                .action("ev", |_ctx, _args| async { Ok(json!(4)) })
                .action("*", |_ctx, _args| async { Ok(json!(3)) }),
        )]);
        let machine = Machine::builder(table).initial("start").build().unwrap();

        let by_state = machine
            .event_handler(StateHandlers::new("ev").on("start", Action::sync(|_, _| Ok(json!(5)))));

        assert_eq!(by_state.call(args![]).await.unwrap(), json!(5));
        assert_eq!(machine.event_handler("ev").call(args![1, 2, 3]).await.unwrap(), json!(4));
        assert_eq!(machine.event_handler("ev__").call(args![]).await.unwrap(), json!(3));
    }

    #[tokio::test]
    async fn callback_receives_result() {
        let table = StateTable::from_iter([(
            "start",
            State::new().action("ev", |_ctx, args| async move {
                let n = args.first().and_then(Value::as_i64).unwrap_or_default();
                Ok(json!(n * 2))
            }),
        )]);
        let machine = Machine::builder(table).initial("start").build().unwrap();
        let (tx, rx) = oneshot::channel();

        machine
            .callback_event_handler("ev")
            .call_with(args![5], move |outcome| {
                let _ = tx.send(outcome);
            })
            .await
            .unwrap();

        assert_eq!(rx.await.unwrap().unwrap(), json!(10));
    }

    #[tokio::test]
    async fn callback_receives_error() {
        let table = StateTable::from_iter([("start", State::new().noop("ev"))]);
        let machine = Machine::builder(table).initial("start").build().unwrap();
        let (tx, rx) = oneshot::channel();

        machine
            .callback_event_handler("aaa")
            .call_with(args![5], move |outcome| {
                let _ = tx.send(outcome);
            })
            .await
            .unwrap();

        assert!(rx.await.unwrap().unwrap_err().is_unhandled());
    }

    #[tokio::test]
    async fn callback_handler_without_callback_swallows_errors() {
        let table = StateTable::from_iter([("start", State::new().noop("ev"))]);
        let machine = Machine::builder(table).initial("start").build().unwrap();
        let handler = machine.callback_event_handler("missing");

        handler.call(args![5]).await.unwrap();
        machine.callback_event_handler("ev").call(args![]).await.unwrap();

        assert_eq!(machine.last_event().as_deref(), Some("ev"));
    }

    #[test]
    fn callback_handler_dispatches_from_outside_the_runtime() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .build()
            .unwrap();
        let table = StateTable::from_iter([(
            "start",
            State::new().action("ev", |ctx, _args| async move {
                Ok(json!(ctx.state().map(str::to_string)))
            }),
        )]);
        let handler = runtime.block_on(async {
            Machine::builder(table)
                .initial("start")
                .build()
                .unwrap()
                .callback_event_handler("ev")
        });
        let (tx, rx) = std::sync::mpsc::channel();

        std::thread::spawn(move || {
            handler.call_with(args![], move |outcome| {
                let _ = tx.send(outcome);
            });
        })
        .join()
        .unwrap();

        let outcome = rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
        assert_eq!(outcome.unwrap(), json!("start"));
    }

    #[test]
    fn callback_handler_can_be_pointed_at_a_runtime() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .build()
            .unwrap();
        let table = StateTable::from_iter([("start", State::new().noop("ev"))]);
        let machine = Machine::builder(table).initial("start").build().unwrap();
        let handler = machine
            .callback_event_handler("ev")
            .on_runtime(runtime.handle().clone());
        let (tx, rx) = std::sync::mpsc::channel();

        handler.call_with(args![], move |outcome| {
            let _ = tx.send(outcome);
        });

        let outcome = rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
        assert_eq!(outcome.unwrap(), Value::Null);
        assert_eq!(machine.state().as_deref(), Some("start"));
    }
}
