//! Backend capability traits
//!
//! These traits are the seam between the generic data layer and concrete
//! storage adapters (SQL servers, embedded stores, document databases).
//! The engine never talks to a backend except through them.
//!
//! Thread safety: capabilities are shared across worker threads and must be
//! `Send + Sync`. Scopes are owned by a single committing thread.

use std::fmt;

use crate::criterion::Criteria;
use crate::entity::EntityInfo;
use crate::error::{DataError, DataResult};
use crate::record::Record;

/// One-shot, non-restartable sequence of records
///
/// Mirrors a database cursor bound to a live connection: records are pulled
/// lazily and the cursor cannot be rewound. Dropping it releases whatever
/// resource the backend attached to it.
pub struct RecordCursor {
    inner: Box<dyn Iterator<Item = DataResult<Record>> + Send>,
}

impl RecordCursor {
    /// Wrap a backend iterator
    pub fn new<I>(iter: I) -> Self
    where
        I: Iterator<Item = DataResult<Record>> + Send + 'static,
    {
        Self {
            inner: Box::new(iter),
        }
    }

    /// Cursor over already-materialized records
    pub fn from_records(records: Vec<Record>) -> Self {
        Self::new(records.into_iter().map(Ok))
    }

    /// Drain the cursor into a vector, stopping at the first error
    pub fn materialize(self) -> DataResult<Vec<Record>> {
        self.collect()
    }
}

impl Iterator for RecordCursor {
    type Item = DataResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

impl fmt::Debug for RecordCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordCursor").finish_non_exhaustive()
    }
}

/// Read capability of a backend
///
/// Must be safe to invoke repeatedly; the cached layer calls it once per
/// fingerprint miss.
pub trait EntityRepository: Send + Sync {
    /// Name under which entities refer to this repository
    fn name(&self) -> &str;

    /// Open a cursor over the records of `entity` matching `criteria`
    ///
    /// # Errors
    ///
    /// Returns `Backend` on I/O failure; the error may be transient.
    fn read(&self, entity: &EntityInfo, criteria: &Criteria) -> DataResult<RecordCursor>;

    /// Whether `error` is caused by temporary contention (deadlock, lock
    /// timeout) and the operation is worth retrying
    fn is_transient(&self, error: &DataError) -> bool;
}

/// Isolation level requested for a transaction scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IsolationLevel {
    /// Dirty reads allowed
    ReadUncommitted,
    /// Only committed data is visible (most backends' default)
    #[default]
    ReadCommitted,
    /// Rows read stay stable for the scope
    RepeatableRead,
    /// Full serializability
    Serializable,
    /// Snapshot isolation
    Snapshot,
}

/// Backend-specific transactional context
///
/// Writes issued through a scope become visible only once
/// [`complete`](TransactionScope::complete) succeeds. Dropping a scope that
/// was never completed aborts every write made through it.
///
/// Each write returns `Ok(false)` for a *logical* failure (row already
/// exists, nothing to update) and `Err` for an I/O failure.
pub trait TransactionScope {
    /// Insert one record
    fn insert(&mut self, entity: &EntityInfo, record: &Record) -> DataResult<bool>;

    /// Update one record, located by the entity's primary key
    fn update(&mut self, entity: &EntityInfo, record: &Record) -> DataResult<bool>;

    /// Delete one record, located by the entity's primary key
    fn delete(&mut self, entity: &EntityInfo, record: &Record) -> DataResult<bool>;

    /// Insert a batch; fails as soon as one insert fails
    fn insert_many(&mut self, entity: &EntityInfo, records: &[Record]) -> DataResult<bool> {
        for record in records {
            if !self.insert(entity, record)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Update a batch; fails as soon as one update fails
    fn update_many(&mut self, entity: &EntityInfo, records: &[Record]) -> DataResult<bool> {
        for record in records {
            if !self.update(entity, record)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Delete a batch; fails as soon as one delete fails
    fn delete_many(&mut self, entity: &EntityInfo, records: &[Record]) -> DataResult<bool> {
        for record in records {
            if !self.delete(entity, record)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Make every write of this scope durable and visible
    fn complete(self: Box<Self>) -> DataResult<()>;
}

/// Write capability of a backend: opens transaction scopes
pub trait TransactionScopeFactory: Send + Sync {
    /// Name of the backend, used in logs
    fn name(&self) -> &str;

    /// Begin a new scope
    ///
    /// # Errors
    ///
    /// Returns `Backend` if no connection/transaction could be opened.
    fn begin(&self, isolation: IsolationLevel) -> DataResult<Box<dyn TransactionScope>>;

    /// Whether `error` is transient for this backend
    fn is_transient(&self, error: &DataError) -> bool;
}
