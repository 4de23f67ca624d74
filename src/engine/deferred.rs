//! Queue of events a state asked to postpone.

use super::error::EngineError;
use crate::core::Args;
use serde_json::Value;
use tokio::sync::oneshot;

/// Result delivered to whoever is waiting on a deferred event.
pub(crate) type Outcome = Result<Value, EngineError>;

/// Sending half of a pending result.
pub(crate) type Responder = oneshot::Sender<Outcome>;

/// An event waiting for the next transition.
#[derive(Debug)]
pub(crate) struct DeferredEvent {
    pub(crate) event: String,
    pub(crate) args: Args,
    responder: Responder,
}

impl DeferredEvent {
    /// Create an entry and the receiver its caller waits on.
    pub(crate) fn new(event: impl Into<String>, args: Args) -> (Self, oneshot::Receiver<Outcome>) {
        let (responder, pending) = oneshot::channel();
        let deferred = Self {
            event: event.into(),
            args,
            responder,
        };
        (deferred, pending)
    }

    pub(crate) fn into_parts(self) -> (String, Args, Responder) {
        (self.event, self.args, self.responder)
    }

    pub(crate) fn from_parts(event: String, args: Args, responder: Responder) -> Self {
        Self {
            event,
            args,
            responder,
        }
    }

    /// Settle the pending result. Consumes the entry, so it settles once.
    pub(crate) fn settle(self, outcome: Outcome) {
        settle(&self.event, self.responder, outcome);
    }
}

/// Deliver an outcome; a caller that stopped waiting is not an error.
pub(crate) fn settle(event: &str, responder: Responder, outcome: Outcome) {
    if responder.send(outcome).is_err() {
        tracing::trace!(event, "deferred result dropped, caller no longer waiting");
    }
}

/// FIFO of deferred events.
#[derive(Debug, Default)]
pub(crate) struct DeferredQueue {
    events: Vec<DeferredEvent>,
}

impl DeferredQueue {
    pub(crate) fn push(&mut self, event: DeferredEvent) {
        self.events.push(event);
    }

    /// Take the whole current generation, leaving an empty queue behind for
    /// anything deferred while the detached entries are replayed.
    pub(crate) fn detach(&mut self) -> Vec<DeferredEvent> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn len(&self) -> usize {
        self.events.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
