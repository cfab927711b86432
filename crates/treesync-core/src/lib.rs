//! TreeSync Core - Domain model, ports and configuration
//!
//! This crate contains everything the synchronization engine reasons about
//! without touching the disk:
//! - **Domain types** - `RelativePath`, `Node`, `Snapshot`, `Action`, `CycleReport`
//! - **Port definitions** - `ILocalFileSystem`, the filesystem collaborator
//! - **Configuration** - YAML-backed `Config` with validation and a builder
//!
//! # Architecture
//!
//! Follows a ports & adapters layout. The domain module is pure data and
//! pure functions. Ports define the trait the adapter crate implements, so
//! the scanner and applier can be exercised against any filesystem.

pub mod config;
pub mod domain;
pub mod ports;
