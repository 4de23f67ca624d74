//! Builder API for state tables and engines.
//!
//! Tables are assembled from ordered fragments and validated as a whole;
//! engines are built from a table plus configuration and observers.

pub mod error;
pub mod machine;
pub mod macros;
pub mod table;

pub use error::{BuildError, TableViolation};
pub use machine::MachineBuilder;
pub use table::TableBuilder;
