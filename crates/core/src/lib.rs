//! Core types and traits for the data access layer
//!
//! This crate defines the foundational types used throughout the system:
//! - Value / TypeTag: Column values and their type discriminator
//! - Criterion / Criteria: Filter predicates and cache fingerprints
//! - Record: One entity instance
//! - EntityInfo / EntityRegistry: Per-entity metadata, memoized per type
//! - DataError: Error taxonomy
//! - Traits: Backend capabilities (read, transient classification, scopes)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod criterion;
pub mod entity;
pub mod error;
pub mod record;
pub mod traits;
pub mod value;

pub use criterion::{Criteria, Criterion};
pub use entity::{Entity, EntityInfo, EntityInfoBuilder, EntityRegistry, KeyDeclaration};
pub use error::{DataError, DataResult};
pub use record::Record;
pub use traits::{
    EntityRepository, IsolationLevel, RecordCursor, TransactionScope, TransactionScopeFactory,
};
pub use value::{TypeTag, Value};
