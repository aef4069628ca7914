//! Direct reading repository: no caching, retry on transient failure

use std::sync::Arc;

use dataaccess_core::{
    Criteria, DataResult, EntityInfo, EntityRepository, RecordCursor, Value,
};

use super::{Entities, ReadingRepository};
use crate::registry::RepositoryRegistry;
use crate::retry::{retry_on_transient_failure, RetryConfig};

/// Reads straight from the backend serving each entity
///
/// Every operation resolves the backend from the entity's repository name,
/// failing with `Configuration` before any I/O when it is unknown, then runs
/// under [`retry_on_transient_failure`] with the backend's own predicate.
pub struct DirectReadingRepository {
    repositories: Arc<RepositoryRegistry>,
    retry: RetryConfig,
}

impl DirectReadingRepository {
    /// Reader over `repositories` using `retry` for every backend call
    pub fn new(repositories: Arc<RepositoryRegistry>, retry: RetryConfig) -> Self {
        Self {
            repositories,
            retry,
        }
    }

    /// Retry policy in use
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Open a lazy, single-pass cursor
    ///
    /// Only opening the cursor is retried. Errors raised while iterating are
    /// returned to the caller as-is, since a half-consumed cursor cannot be
    /// replayed.
    pub fn read_cursor(&self, entity: &EntityInfo, criteria: &Criteria) -> DataResult<RecordCursor> {
        let backend = self.repositories.reader_for(entity)?;
        retry_on_transient_failure(
            &self.retry,
            "read_cursor",
            |e| backend.is_transient(e),
            || backend.read(entity, criteria),
        )
    }

    /// Open a cursor and consume it with `consume`, retrying the whole pass
    fn with_cursor<T, F>(
        &self,
        operation: &str,
        entity: &EntityInfo,
        criteria: &Criteria,
        mut consume: F,
    ) -> DataResult<T>
    where
        F: FnMut(RecordCursor) -> DataResult<T>,
    {
        let backend: Arc<dyn EntityRepository> = self.repositories.reader_for(entity)?;
        retry_on_transient_failure(
            &self.retry,
            operation,
            |e| backend.is_transient(e),
            || consume(backend.read(entity, criteria)?),
        )
    }
}

impl ReadingRepository for DirectReadingRepository {
    fn read(&self, entity: &EntityInfo, criteria: &Criteria) -> DataResult<Entities> {
        self.with_cursor("read", entity, criteria, |cursor| {
            Ok(Entities::from(cursor.materialize()?))
        })
    }

    fn any(&self, entity: &EntityInfo, criteria: &Criteria) -> DataResult<bool> {
        self.with_cursor("any", entity, criteria, |mut cursor| {
            cursor.next().transpose().map(|first| first.is_some())
        })
    }

    fn read_column(
        &self,
        column: &str,
        entity: &EntityInfo,
        criteria: &Criteria,
    ) -> DataResult<Vec<Value>> {
        self.with_cursor("read_column", entity, criteria, |cursor| {
            cursor.map(|record| record.map(|r| r.column(column))).collect()
        })
    }

    fn count_of(&self, entity: &EntityInfo, criteria: &Criteria) -> DataResult<usize> {
        self.with_cursor("count_of", entity, criteria, |mut cursor| {
            cursor.try_fold(0usize, |count, record| record.map(|_| count + 1))
        })
    }
}
