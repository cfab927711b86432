//! Port definitions (hexagonal architecture)
//!
//! Ports are trait interfaces that the engine depends on. Adapter crates
//! implement them for concrete platforms.
//!
//! - [`local_filesystem`] - Primitive filesystem operations used by the
//!   scanner and the applier

pub mod local_filesystem;

pub use local_filesystem::{DirEntry, EntryState, ILocalFileSystem};
