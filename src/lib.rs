//! Waypoint: an async finite-state event engine
//!
//! A [`Machine`] runs over an immutable [`StateTable`]. Each state maps event
//! names to a [`Handler`]: run an action, defer the event until the next
//! transition, ignore it, or transition to another state. Transitions run
//! the old state's exit hook and the new state's entry hook, then replay
//! deferred events against the new state in arrival order.
//!
//! # Core Concepts
//!
//! - **State table**: named [`State`]s, assembled directly or from ordered
//!   fragments with [`TableBuilder`]
//! - **Serialization**: one gate per engine; transitions never interleave
//!   and events are resolved against a settled state
//! - **Deferral**: a deferred event's future resolves once a later state
//!   handles it (or rejects it)
//! - **Observers**: best-effort lifecycle [`Signal`]s around every transition
//!
//! # Example
//!
//! ```rust
//! use waypoint::{args, Machine, State, StateTable};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let table = StateTable::from_iter([
//!     ("idle", State::new().transition("start", "running")),
//!     ("running", State::new()
//!         .action("status", |_ctx, _args| async { Ok(json!("busy")) })
//!         .transition("stop", "idle")),
//! ]);
//!
//! let machine = Machine::builder(table).name("worker").initial("idle").build()?;
//!
//! machine.process("start", args![]).await?;
//! assert_eq!(machine.process("status", args![]).await?, json!("busy"));
//! assert!(machine.process("start", args![]).await.unwrap_err().is_unhandled());
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod engine;
pub mod observe;

// Re-export commonly used types
pub use builder::{BuildError, MachineBuilder, TableBuilder, TableViolation};
pub use config::{ConfigError, MachineConfig};
pub use core::{
    Action, Args, Handler, Hook, HookKind, State, StateHistory, StateTable, StateTransition,
    TransitionOutcome, DEFAULT_HISTORY_LIMIT, WILDCARD,
};
pub use dispatch::{CallbackEventHandler, Dispatch, EventHandler, StateHandlers};
pub use engine::{BoxError, Context, EngineError, Machine};
pub use observe::{BroadcastObserver, Observer, Signal, SignalKind};

#[doc(hidden)]
pub use serde_json as __serde_json;
