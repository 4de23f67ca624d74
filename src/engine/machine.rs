//! The transition engine.

use super::context::Context;
use super::deferred::{self, DeferredEvent, DeferredQueue, Outcome, Responder};
use super::error::EngineError;
use crate::builder::MachineBuilder;
use crate::config::MachineConfig;
use crate::core::{
    Action, Args, Handler, HookKind, State, StateHistory, StateTable, StateTransition,
    TransitionOutcome,
};
use crate::dispatch::{CallbackEventHandler, Dispatch, EventHandler, StateHandlers};
use crate::observe::{Observers, Signal, SignalKind};
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex as Gate, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// An async finite-state engine over a [`StateTable`].
///
/// `Machine` is a cheap handle; clones drive the same engine.
///
/// A configured initial state is entered lazily: building the engine only
/// queues the transition, and the first `enter`, `process` or
/// [`ready`](Machine::ready) call runs it. Until then [`state`](Machine::state)
/// is `None`.
///
/// # Serialization
///
/// Every engine has one gate. [`enter`](Machine::enter) holds it for the
/// whole exit → commit → entry → replay sequence. [`process`](Machine::process)
/// and the dispatch facades wait for it, resolve a handler against the
/// current state, and release it before running the handler's action, so
/// actions of concurrent dispatches may interleave while no transition is
/// active.
///
/// # Cancellation
///
/// Transitions run on their own tokio task, so the engine must be driven
/// from inside a tokio runtime. Dropping the future returned by
/// [`enter`](Machine::enter) (or by any call that had to run a scheduled
/// transition first) only stops waiting: the exit → commit → entry → replay
/// sequence still runs to completion, and a later call observes its result.
/// Calls can therefore be wrapped in `tokio::time::timeout`.
///
/// # Liveness
///
/// There is no built-in timeout. A hook or replayed action that never
/// completes holds the gate forever and every later call waits behind it.
/// A deferred event waits until some later transition replays it, or until
/// [`cancel_deferred`](Machine::cancel_deferred) is called.
///
/// # Example
///
/// ```rust
/// use waypoint::{args, Machine, State, StateTable};
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), waypoint::EngineError> {
/// let table = StateTable::from_iter([
///     ("locked", State::new().transition("coin", "unlocked").defer("push")),
///     ("unlocked", State::new()
///         .action("push", |_ctx, _args| async { Ok(json!("through")) })),
/// ]);
/// let machine = Machine::builder(table).initial("locked").build().unwrap();
///
/// let pushed = {
///     let machine = machine.clone();
///     tokio::spawn(async move { machine.process("push", args![]).await })
/// };
/// tokio::task::yield_now().await;
///
/// machine.process("coin", args![]).await?;
/// assert_eq!(machine.state().as_deref(), Some("unlocked"));
/// assert_eq!(pushed.await.unwrap()?, json!("through"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Machine {
    shared: Arc<Shared>,
}

struct Shared {
    id: Uuid,
    name: String,
    table: StateTable,
    observers: Observers,
    gate: Gate<()>,
    core: Mutex<Core>,
}

/// Engine data. Only locked for short synchronous sections, never across
/// an await; mutated only by whoever holds the gate.
struct Core {
    current: Option<String>,
    last_event: Option<String>,
    deferred: DeferredQueue,
    scheduled: VecDeque<ScheduledTransition>,
    history: StateHistory,
}

struct ScheduledTransition {
    target: String,
    args: Args,
    responder: Option<Responder>,
}

/// What `process` decided while holding the gate.
enum Resolution {
    Deferred(oneshot::Receiver<Outcome>),
    Noop,
    Transition(String, Args),
    Action(Action, Context, Args),
}

impl Machine {
    /// Create an engine with no initial state and default configuration.
    pub fn new(table: StateTable) -> Self {
        Self::from_parts(table, &MachineConfig::default(), Observers::default())
    }

    pub fn builder(table: StateTable) -> MachineBuilder {
        MachineBuilder::new(table)
    }

    /// Assemble an engine. The initial state, if any, must already have been
    /// checked against the table; it is scheduled and runs at the first
    /// gate acquisition.
    pub(crate) fn from_parts(table: StateTable, config: &MachineConfig, observers: Observers) -> Self {
        let mut scheduled = VecDeque::new();
        if let Some(initial) = &config.initial_state {
            scheduled.push_back(ScheduledTransition {
                target: initial.clone(),
                args: Vec::new(),
                responder: None,
            });
        }
        Self {
            shared: Arc::new(Shared {
                id: Uuid::new_v4(),
                name: config.name.clone(),
                table,
                observers,
                gate: Gate::new(()),
                core: Mutex::new(Core {
                    current: None,
                    last_event: None,
                    deferred: DeferredQueue::default(),
                    scheduled,
                    history: StateHistory::with_limit(config.history_limit),
                }),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn table(&self) -> &StateTable {
        &self.shared.table
    }

    /// Snapshot of the current state. May be mid-transition; use
    /// [`ready`](Machine::ready) to wait for a settled value.
    pub fn state(&self) -> Option<String> {
        self.shared.core.lock().current.clone()
    }

    /// Name of the most recently dispatched event that found a handler.
    pub fn last_event(&self) -> Option<String> {
        self.shared.core.lock().last_event.clone()
    }

    /// Number of events waiting for the next transition.
    pub fn pending_deferred(&self) -> usize {
        self.shared.core.lock().deferred.len()
    }

    pub fn history(&self) -> StateHistory {
        self.shared.core.lock().history.clone()
    }

    /// Wait until no transition is in flight (running any scheduled ones
    /// first) and return the current state.
    pub async fn ready(&self) -> Option<String> {
        let _gate = self.acquire().await;
        self.state()
    }

    /// Transition to `target`.
    ///
    /// Runs the old state's exit hook, commits `target`, runs its entry hook
    /// and replays deferred events against it. Entering the current state
    /// again is a no-op that resolves `true`.
    ///
    /// A failing hook yields [`EngineError::HookFailed`]; the new state stays
    /// committed either way.
    ///
    /// The transition runs on a spawned task and completes even if this
    /// future is dropped.
    pub async fn enter(&self, target: &str, args: Args) -> Result<bool, EngineError> {
        self.lookup(target)?;
        let machine = self.clone();
        let owned = target.to_string();
        let running = tokio::spawn(async move {
            let _gate = machine.acquire().await;
            let outcome = machine.transition(&owned, args).await;
            machine.drain_scheduled().await;
            outcome
        });
        match running.await {
            Ok(outcome) => outcome,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => {
                warn!(machine = %self.shared.name, state = target, "transition task was cancelled");
                Err(EngineError::TransitionInterrupted {
                    state: target.to_string(),
                })
            }
        }
    }

    /// Dispatch `event` to the current state's handler.
    pub async fn process(&self, event: &str, args: Args) -> Result<Value, EngineError> {
        if event.is_empty() {
            debug!(machine = %self.shared.name, "rejecting event without a name");
            return Err(EngineError::InvalidEvent {
                event: event.to_string(),
            });
        }

        let resolution = {
            let _gate = self.acquire().await;
            self.resolve(event, args)?
        };

        let outcome = match resolution {
            Resolution::Deferred(pending) => {
                return pending.await.unwrap_or_else(|_| {
                    Err(EngineError::DeferredCancelled {
                        event: event.to_string(),
                    })
                });
            }
            Resolution::Noop => Ok(Value::Null),
            Resolution::Transition(target, args) => self.enter(&target, args).await.map(Value::Bool),
            Resolution::Action(action, ctx, args) => {
                action
                    .call(ctx, args)
                    .await
                    .map_err(|source| EngineError::ActionFailed {
                        event: event.to_string(),
                        source: source.into(),
                    })
            }
        };
        self.run_scheduled().await;
        outcome
    }

    /// Handler that forwards its arguments to an event or to a state-keyed
    /// handler map.
    pub fn event_handler(&self, dispatch: impl Into<Dispatch>) -> EventHandler {
        EventHandler::new(self.clone(), dispatch.into())
    }

    /// Fire-and-forget variant of [`event_handler`](Machine::event_handler).
    pub fn callback_event_handler(&self, dispatch: impl Into<Dispatch>) -> CallbackEventHandler {
        CallbackEventHandler::new(self.event_handler(dispatch))
    }

    /// Reject every deferred event still waiting with
    /// [`EngineError::DeferredCancelled`]. Returns how many were cancelled.
    pub async fn cancel_deferred(&self) -> usize {
        let _gate = self.acquire().await;
        let batch = self.shared.core.lock().deferred.detach();
        let count = batch.len();
        for deferred in batch {
            let event = deferred.event.clone();
            deferred.settle(Err(EngineError::DeferredCancelled { event }));
        }
        if count > 0 {
            info!(machine = %self.shared.name, count, "cancelled deferred events");
        }
        count
    }

    /// Run an action keyed by the current state name.
    pub(crate) async fn dispatch_by_state(
        &self,
        handlers: &StateHandlers,
        args: Args,
    ) -> Result<Value, EngineError> {
        let (state, action) = {
            let _gate = self.acquire().await;
            let state = self.state();
            let action = handlers.resolve(state.as_deref()).cloned();
            (state, action)
        };
        let Some(action) = action else {
            debug!(
                machine = %self.shared.name,
                state = state.as_deref().unwrap_or("-"),
                handler = handlers.label(),
                "no state handler for current state"
            );
            return Err(EngineError::unhandled(handlers.label(), state, false, args));
        };

        let ctx = self.context(state, None);
        let outcome = action
            .call(ctx, args)
            .await
            .map_err(|source| EngineError::ActionFailed {
                event: handlers.label().to_string(),
                source: source.into(),
            });
        self.run_scheduled().await;
        outcome
    }

    pub(crate) fn schedule(&self, target: String, args: Args) {
        debug!(machine = %self.shared.name, target = %target, "scheduling transition");
        self.shared.core.lock().scheduled.push_back(ScheduledTransition {
            target,
            args,
            responder: None,
        });
    }

    fn context(&self, state: Option<String>, event: Option<&str>) -> Context {
        Context::new(self.clone(), state, event.map(str::to_string))
    }

    fn emit(&self, kind: impl FnOnce() -> SignalKind) {
        if self.shared.observers.is_empty() {
            return;
        }
        let signal = Signal {
            machine_id: self.shared.id,
            machine: self.shared.name.clone(),
            kind: kind(),
            emitted_at: Utc::now(),
        };
        self.shared.observers.notify(&signal);
    }

    fn lookup(&self, target: &str) -> Result<&State, EngineError> {
        if target.is_empty() {
            debug!(machine = %self.shared.name, "rejecting transition without a target");
            return Err(EngineError::InvalidState {
                state: target.to_string(),
            });
        }
        self.shared.table.get(target).ok_or_else(|| {
            warn!(machine = %self.shared.name, state = target, "unknown state");
            EngineError::UnknownState {
                state: target.to_string(),
            }
        })
    }

    /// Take the gate once nothing is scheduled.
    ///
    /// Scheduled transitions are drained on a spawned task holding the gate,
    /// so a caller that stops waiting cannot leave one half done.
    async fn acquire(&self) -> MutexGuard<'_, ()> {
        loop {
            let gate = self.shared.gate.lock().await;
            if self.shared.core.lock().scheduled.is_empty() {
                return gate;
            }
            drop(gate);

            let machine = self.clone();
            let draining = tokio::spawn(async move {
                let _gate = machine.shared.gate.lock().await;
                machine.drain_scheduled().await;
            });
            if let Err(err) = draining.await {
                if err.is_panic() {
                    std::panic::resume_unwind(err.into_panic());
                }
                warn!(machine = %self.shared.name, "scheduled transitions were cancelled");
                return self.shared.gate.lock().await;
            }
        }
    }

    /// Run transitions scheduled from outside a transition, if there are any.
    async fn run_scheduled(&self) {
        let idle = self.shared.core.lock().scheduled.is_empty();
        if !idle {
            let _gate = self.acquire().await;
        }
    }

    /// Gate must be held.
    async fn drain_scheduled(&self) {
        loop {
            let next = self.shared.core.lock().scheduled.pop_front();
            let Some(ScheduledTransition {
                target,
                args,
                responder,
            }) = next
            else {
                break;
            };

            let outcome = self.transition(&target, args).await;
            match responder {
                Some(responder) => deferred::settle(&target, responder, outcome.map(Value::Bool)),
                None => {
                    if let Err(err) = outcome {
                        warn!(
                            machine = %self.shared.name,
                            target = %target,
                            error = %err,
                            "scheduled transition failed"
                        );
                    }
                }
            }
        }
    }

    /// The exit → commit → entry → replay sequence. Gate must be held.
    async fn transition(&self, target: &str, args: Args) -> Result<bool, EngineError> {
        let entering = self.lookup(target)?;
        let from = self.state();
        if from.as_deref() == Some(target) {
            return Ok(true);
        }
        let leaving = from
            .as_deref()
            .and_then(|name| self.shared.table.get(name))
            .and_then(State::exit);

        if let Some(from) = &from {
            self.emit(|| SignalKind::Exit {
                state: from.clone(),
                to: target.to_string(),
                args: args.clone(),
            });
        }
        self.emit(|| SignalKind::PreEntry {
            state: target.to_string(),
            args: args.clone(),
        });
        info!(
            machine = %self.shared.name,
            machine_id = %self.shared.id,
            from = from.as_deref().unwrap_or("-"),
            to = target,
            "transition"
        );

        let exited = match leaving {
            Some(hook) => hook.call(self.context(from.clone(), None), args.clone()).await,
            None => Ok(()),
        };

        self.shared.core.lock().current = Some(target.to_string());

        if let Err(source) = exited {
            self.record(from.clone(), target, TransitionOutcome::ExitFailed);
            return Err(EngineError::HookFailed {
                state: from.unwrap_or_default(),
                hook: HookKind::Exit,
                source: source.into(),
            });
        }

        let entered = match entering.entry() {
            Some(hook) => {
                let ctx = self.context(Some(target.to_string()), None);
                hook.call(ctx, args.clone()).await
            }
            None => Ok(()),
        };
        if let Err(source) = entered {
            self.record(from, target, TransitionOutcome::EntryFailed);
            return Err(EngineError::HookFailed {
                state: target.to_string(),
                hook: HookKind::Entry,
                source: source.into(),
            });
        }

        self.flush_deferred().await;
        self.record(from, target, TransitionOutcome::Completed);

        self.emit(|| SignalKind::Entry {
            state: target.to_string(),
            args,
        });
        self.emit(|| SignalKind::Reached {
            state: target.to_string(),
        });
        Ok(true)
    }

    fn record(&self, from: Option<String>, to: &str, outcome: TransitionOutcome) {
        self.shared.core.lock().history.record(StateTransition {
            from,
            to: to.to_string(),
            timestamp: Utc::now(),
            outcome,
        });
    }

    /// Resolve an event against the current state. Gate must be held.
    fn resolve(&self, event: &str, args: Args) -> Result<Resolution, EngineError> {
        let mut core = self.shared.core.lock();
        let state = core.current.clone();
        let Some(handler) = self.shared.table.resolve(state.as_deref(), event).cloned() else {
            debug!(
                machine = %self.shared.name,
                event,
                state = state.as_deref().unwrap_or("-"),
                "unhandled event"
            );
            return Err(EngineError::unhandled(event, state, false, args));
        };
        core.last_event = Some(event.to_string());

        let resolution = match handler {
            Handler::Defer => {
                debug!(machine = %self.shared.name, event, "deferring event");
                let (deferred, pending) = DeferredEvent::new(event, args);
                core.deferred.push(deferred);
                Resolution::Deferred(pending)
            }
            Handler::Noop => {
                debug!(machine = %self.shared.name, event, "ignoring event");
                Resolution::Noop
            }
            Handler::TransitionTo(target) => Resolution::Transition(target, args),
            Handler::Action(action) => {
                debug!(machine = %self.shared.name, event, "processing event");
                Resolution::Action(action, self.context(state, Some(event)), args)
            }
        };
        Ok(resolution)
    }

    /// Replay the current generation of deferred events. Gate must be held.
    async fn flush_deferred(&self) {
        let batch = {
            let mut core = self.shared.core.lock();
            if core.deferred.is_empty() {
                return;
            }
            core.deferred.detach()
        };
        debug!(machine = %self.shared.name, count = batch.len(), "replaying deferred events");
        for deferred in batch {
            self.replay(deferred).await;
        }
    }

    async fn replay(&self, deferred: DeferredEvent) {
        let (event, args, responder) = deferred.into_parts();
        let (state, handler) = {
            let mut core = self.shared.core.lock();
            let state = core.current.clone();
            let handler = self.shared.table.resolve(state.as_deref(), &event).cloned();
            if handler.is_some() {
                core.last_event = Some(event.clone());
            }
            (state, handler)
        };

        match handler {
            None => {
                debug!(
                    machine = %self.shared.name,
                    event = %event,
                    state = state.as_deref().unwrap_or("-"),
                    "unhandled deferred event"
                );
                let err = EngineError::unhandled(event.clone(), state, true, args);
                deferred::settle(&event, responder, Err(err));
            }
            Some(Handler::Defer) => {
                debug!(machine = %self.shared.name, event = %event, "deferring event again");
                let requeued = DeferredEvent::from_parts(event, args, responder);
                self.shared.core.lock().deferred.push(requeued);
            }
            Some(Handler::Noop) => deferred::settle(&event, responder, Ok(Value::Null)),
            Some(Handler::TransitionTo(target)) => {
                self.shared.core.lock().scheduled.push_back(ScheduledTransition {
                    target,
                    args,
                    responder: Some(responder),
                });
            }
            Some(Handler::Action(action)) => {
                debug!(machine = %self.shared.name, event = %event, "processing deferred event");
                let outcome = action
                    .call(self.context(state, Some(&event)), args)
                    .await
                    .map_err(|source| EngineError::ActionFailed {
                        event: event.clone(),
                        source: source.into(),
                    });
                deferred::settle(&event, responder, outcome);
            }
        }
    }
}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.shared.core.lock();
        f.debug_struct("Machine")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .field("state", &core.current)
            .field("deferred", &core.deferred.len())
            .field("observers", &self.shared.observers.len())
            .finish()
    }
}
