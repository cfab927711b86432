//! Domain entities
//!
//! - Newtypes for validated relative paths, cycle identifiers and hashes
//! - `Node` and `Snapshot`: point-in-time view of one tree
//! - `Action`: a single filesystem operation on the destination
//! - `CycleReport`: outcome of one scan/diff/apply pass
//! - Domain-specific error types

pub mod action;
pub mod errors;
pub mod newtypes;
pub mod node;
pub mod report;

pub use action::Action;
pub use errors::DomainError;
pub use newtypes::*;
pub use node::{Node, NodeKind, Snapshot};
pub use report::{ApplyErrorKind, CycleReport, FailedAction};
