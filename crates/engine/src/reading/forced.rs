//! Forced-cache reading repository
//!
//! For lookup and reference entities loaded once per process: every entity is
//! cached regardless of its declared timeout, and entries never go stale.
//! Use [`invalidate`](ReadingRepository::invalidate) or
//! [`clear`](ForcedCacheReadingRepository::clear) to force a reload.

use std::sync::Arc;

use dataaccess_core::{Criteria, DataResult, EntityInfo, Value};

use super::cached::{CacheStats, CachedReadingRepository, TimeoutPolicy};
use super::{Entities, ReadingRepository};

/// Cache with an infinite timeout for every entity
pub struct ForcedCacheReadingRepository {
    inner: CachedReadingRepository,
}

impl ForcedCacheReadingRepository {
    /// Cache over `base` that never expires
    pub fn new(base: Arc<dyn ReadingRepository>) -> Self {
        Self {
            inner: CachedReadingRepository::with_policy(base, TimeoutPolicy::Forced),
        }
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.inner.clear();
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// True if no entry exists
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> CacheStats {
        self.inner.stats()
    }
}

impl ReadingRepository for ForcedCacheReadingRepository {
    fn read(&self, entity: &EntityInfo, criteria: &Criteria) -> DataResult<Entities> {
        self.inner.read(entity, criteria)
    }

    fn any(&self, entity: &EntityInfo, criteria: &Criteria) -> DataResult<bool> {
        self.inner.any(entity, criteria)
    }

    fn read_column(
        &self,
        column: &str,
        entity: &EntityInfo,
        criteria: &Criteria,
    ) -> DataResult<Vec<Value>> {
        self.inner.read_column(column, entity, criteria)
    }

    fn count_of(&self, entity: &EntityInfo, criteria: &Criteria) -> DataResult<usize> {
        self.inner.count_of(entity, criteria)
    }

    fn invalidate(&self, entity: &str) {
        self.inner.invalidate_entity(entity);
    }

    fn cache_stats(&self) -> Option<CacheStats> {
        Some(self.inner.stats())
    }
}
