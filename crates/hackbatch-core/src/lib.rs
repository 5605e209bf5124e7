//! hackbatch-core — target model, operation kinds, formulas, and configuration.
//! The engine and the daemon both depend on this one.

pub mod config;
pub mod formulas;
pub mod operation;
pub mod target;
pub mod units;

pub use formulas::{Actor, Formulas, StandardFormulas};
pub use operation::OperationKind;
pub use target::TargetState;
