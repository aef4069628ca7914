//! Reading repositories
//!
//! Three implementations of [`ReadingRepository`]:
//! - [`DirectReadingRepository`]: every call hits the backend, with retry
//! - [`CachedReadingRepository`]: fingerprint-keyed cache with per-entity timeout
//! - [`ForcedCacheReadingRepository`]: cached forever once filled

mod cached;
mod direct;
mod forced;

use std::sync::Arc;

use dataaccess_core::{Criteria, DataResult, EntityInfo, Record, Value};

pub use cached::{CacheStats, CacheTimeout, CachedReadingRepository};
pub use direct::DirectReadingRepository;
pub use forced::ForcedCacheReadingRepository;

/// Materialized, replayable result set shared between readers
pub type Entities = Arc<[Record]>;

/// Which reading repository a [`DataContext`](crate::DataContext) uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadMode {
    /// No caching
    Direct,
    /// Cache per entity timeout
    #[default]
    Cached,
    /// Cache everything for the lifetime of the context
    ForcedCache,
}

/// Read operations available to the data getter
pub trait ReadingRepository: Send + Sync {
    /// Records of `entity` matching `criteria`
    fn read(&self, entity: &EntityInfo, criteria: &Criteria) -> DataResult<Entities>;

    /// Whether any record matches
    fn any(&self, entity: &EntityInfo, criteria: &Criteria) -> DataResult<bool>;

    /// One column of every matching record (`Null` where absent)
    fn read_column(
        &self,
        column: &str,
        entity: &EntityInfo,
        criteria: &Criteria,
    ) -> DataResult<Vec<Value>>;

    /// Number of matching records
    fn count_of(&self, entity: &EntityInfo, criteria: &Criteria) -> DataResult<usize>;

    /// Drop cached results for `entity`, if this repository caches
    fn invalidate(&self, _entity: &str) {}

    /// Cache counters, if this repository caches
    fn cache_stats(&self) -> Option<CacheStats> {
        None
    }
}
