//! Core state table types.
//!
//! This module contains the passive data the engine runs against:
//! - `State` handler sets and the `Handler` variant
//! - `Action` and `Hook` functions
//! - The immutable `StateTable`
//! - Bounded transition history
//!
//! Nothing in here holds engine state; tables are built once and shared.

mod handler;
mod history;
mod state;
mod table;

pub use handler::{Action, Args, Handler, Hook, HookKind, WILDCARD};
pub use history::{StateHistory, StateTransition, TransitionOutcome, DEFAULT_HISTORY_LIMIT};
pub use state::State;
pub use table::StateTable;
