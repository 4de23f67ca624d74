//! The transition engine and its supporting pieces.
//!
//! - `Machine` owns the current state, the serialization gate and the
//!   deferred queue, and implements `enter` / `process`
//! - `Context` is what hooks and actions see of the engine
//! - `EngineError` covers every way a dispatch or transition can fail

mod context;
mod deferred;
mod error;
mod machine;

pub use context::Context;
pub use error::{BoxError, EngineError};
pub use machine::Machine;
