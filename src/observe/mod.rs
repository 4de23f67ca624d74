//! Lifecycle signals for outside observers.
//!
//! Observers are injected when the engine is built and receive a [`Signal`]
//! around every transition. Delivery is best effort: observers cannot change
//! control flow, ordering, or the result of the transition, and a panicking
//! observer is logged and skipped.

use crate::core::Args;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// What happened.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalKind {
    /// A transition into `state` is about to run its hooks.
    PreEntry { state: String, args: Args },
    /// `state` is being left for `to`.
    Exit { state: String, to: String, args: Args },
    /// `state` was entered and deferred events were replayed.
    Entry { state: String, args: Args },
    /// Emitted after `Entry`, named after the state.
    Reached { state: String },
}

impl SignalKind {
    /// The state the signal is about.
    pub fn state(&self) -> &str {
        match self {
            Self::PreEntry { state, .. }
            | Self::Exit { state, .. }
            | Self::Entry { state, .. }
            | Self::Reached { state } => state,
        }
    }

    /// Topic-style label: `"<state>:pre-entry"`, `"<state>:exit"`,
    /// `"<state>:entry"`, or just `"<state>"` for [`SignalKind::Reached`].
    pub fn label(&self) -> String {
        match self {
            Self::PreEntry { state, .. } => format!("{state}:pre-entry"),
            Self::Exit { state, .. } => format!("{state}:exit"),
            Self::Entry { state, .. } => format!("{state}:entry"),
            Self::Reached { state } => state.clone(),
        }
    }
}

/// A lifecycle signal emitted by an engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Signal {
    pub machine_id: Uuid,
    pub machine: String,
    pub kind: SignalKind,
    pub emitted_at: DateTime<Utc>,
}

/// Receives lifecycle signals.
///
/// Any `Fn(&Signal) + Send + Sync` closure is an observer.
pub trait Observer: Send + Sync {
    fn observe(&self, signal: &Signal);
}

impl<F> Observer for F
where
    F: Fn(&Signal) + Send + Sync,
{
    fn observe(&self, signal: &Signal) {
        self(signal)
    }
}

/// The observers attached to one engine.
#[derive(Clone, Default)]
pub(crate) struct Observers {
    list: Vec<Arc<dyn Observer>>,
}

impl Observers {
    pub(crate) fn push(&mut self, observer: Arc<dyn Observer>) {
        self.list.push(observer);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.list.len()
    }

    pub(crate) fn notify(&self, signal: &Signal) {
        for observer in &self.list {
            let delivered =
                std::panic::catch_unwind(AssertUnwindSafe(|| observer.observe(signal)));
            if delivered.is_err() {
                tracing::warn!(
                    machine = %signal.machine,
                    signal = %signal.kind.label(),
                    "observer panicked while handling signal"
                );
            }
        }
    }
}

/// Republishes signals on a broadcast channel.
///
/// Signals sent while nobody is subscribed are dropped.
///
/// # Example
///
/// ```rust
/// use waypoint::{BroadcastObserver, Machine, State, StateTable};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let signals = BroadcastObserver::new(16);
/// let mut rx = signals.subscribe();
///
/// let table = StateTable::from_iter([("start", State::new())]);
/// let machine = Machine::builder(table).observer(signals.clone()).build().unwrap();
/// machine.enter("start", Vec::new()).await.unwrap();
///
/// let first = rx.recv().await.unwrap();
/// assert_eq!(first.kind.label(), "start:pre-entry");
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct BroadcastObserver {
    sender: broadcast::Sender<Signal>,
}

impl BroadcastObserver {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Signal> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastObserver {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl Observer for BroadcastObserver {
    fn observe(&self, signal: &Signal) {
        // No subscribers is fine; the signal is simply not delivered.
        let _ = self.sender.send(signal.clone());
    }
}
