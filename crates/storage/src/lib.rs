//! Storage adapters for the data access layer
//!
//! This crate implements the backend capability traits of `dataaccess-core`:
//! - MemoryBackend: in-process tables with atomic transaction scopes
//! - FaultInjector: scripted transient / permanent failures for testing
//!   retry and rescheduling paths
//!
//! Real adapters (SQL servers, embedded key-value stores, document
//! databases) implement the same traits; `MemoryBackend` doubles as the
//! reference for their expected semantics.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod faults;
pub mod memory;

pub use faults::FaultInjector;
pub use memory::{BackendStats, MemoryBackend, TRANSIENT_CODES};
