//! DataAccess - entity data access with retrying reads, result caching and
//! deferred transactions
//!
//! Backends plug in through three traits: [`EntityRepository`] (reads),
//! [`TransactionScopeFactory`] (atomic write scopes) and the transient-error
//! predicate both carry. On top of them this crate provides:
//!
//! - Reads that retry on deadlocks and lock timeouts
//! - A result cache keyed by entity and criteria, filled at most once per
//!   key and refreshed per entity timeout
//! - Transactions that queue writes and commit them as one atomic batch,
//!   either when dropped or later through a scheduler
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use dataaccess::{Criteria, DataContext, IsolationLevel, MemoryBackend, ReadMode};
//!
//! let ctx = DataContext::builder()
//!     .read_mode(ReadMode::Cached)
//!     .backend(Arc::new(MemoryBackend::new("main")))
//!     .build()?;
//!
//! {
//!     let mut txn = ctx.begin_transaction("main", IsolationLevel::default())?;
//!     txn.insert(&customer)?;
//! } // committed here
//!
//! let berlin = ctx.get::<Customer>()?.filter().eq("city", "Berlin").read()?;
//! ```

pub use dataaccess_core::*;
pub use dataaccess_engine::*;
pub use dataaccess_storage::{BackendStats, FaultInjector, MemoryBackend, TRANSIENT_CODES};
