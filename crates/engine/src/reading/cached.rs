//! Cached reading repository
//!
//! Result sets are cached per fingerprint (entity name + criteria). Each
//! entry is filled at most once: the first reader takes the entry's own fill
//! lock and queries the base repository, everyone else waiting on the same
//! fingerprint gets that result. Readers of other fingerprints never wait on
//! it.
//!
//! A stale entry is never refreshed in place. The map slot is pointed at a
//! fresh, empty entry, so callers still holding the old `Entities` keep a
//! consistent result set.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use dataaccess_core::{Criteria, DataResult, EntityInfo, Value};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::debug;

use super::{Entities, ReadingRepository};

/// Freshness policy of one entity's cache entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTimeout {
    /// Not cached, every read goes to the base repository
    Disabled,
    /// Entries go stale once older than the duration
    Expires(Duration),
    /// Entries never go stale
    Never,
}

impl CacheTimeout {
    /// Policy declared by an entity's cache timeout (zero disables caching)
    pub fn from_duration(timeout: Duration) -> Self {
        if timeout.is_zero() {
            CacheTimeout::Disabled
        } else {
            CacheTimeout::Expires(timeout)
        }
    }

    fn is_stale(&self, queried_at: Instant) -> bool {
        match self {
            CacheTimeout::Expires(timeout) => queried_at.elapsed() > *timeout,
            CacheTimeout::Disabled | CacheTimeout::Never => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum TimeoutPolicy {
    PerEntity,
    Forced,
}

struct CacheEntry {
    entity: String,
    queried_at: Instant,
    entities: OnceCell<Entities>,
    fill_lock: Mutex<()>,
}

impl CacheEntry {
    fn new(entity: &str) -> Self {
        Self {
            entity: entity.to_string(),
            queried_at: Instant::now(),
            entities: OnceCell::new(),
            fill_lock: Mutex::new(()),
        }
    }
}

/// Snapshot of cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads answered from a filled entry
    pub hits: u64,
    /// Reads that had to query the base repository
    pub misses: u64,
    /// Misses whose result was stored
    pub fills: u64,
    /// Reads of entities with caching disabled
    pub bypasses: u64,
    /// Stale entries replaced by a fresh one
    pub replacements: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    fills: AtomicU64,
    bypasses: AtomicU64,
    replacements: AtomicU64,
}

/// Caching decorator over another [`ReadingRepository`]
///
/// `any`, `read_column` and `count_of` are answered from the same cached
/// result set as `read`, so they share its fill-once guarantee.
pub struct CachedReadingRepository {
    base: Arc<dyn ReadingRepository>,
    entries: DashMap<String, Arc<CacheEntry>>,
    policy: TimeoutPolicy,
    counters: Counters,
}

impl CachedReadingRepository {
    /// Cache over `base`, honoring each entity's own timeout
    pub fn new(base: Arc<dyn ReadingRepository>) -> Self {
        Self::with_policy(base, TimeoutPolicy::PerEntity)
    }

    pub(super) fn with_policy(base: Arc<dyn ReadingRepository>, policy: TimeoutPolicy) -> Self {
        Self {
            base,
            entries: DashMap::new(),
            policy,
            counters: Counters::default(),
        }
    }

    /// Effective freshness policy for `entity`
    pub fn timeout_of(&self, entity: &EntityInfo) -> CacheTimeout {
        match self.policy {
            TimeoutPolicy::PerEntity => CacheTimeout::from_duration(entity.cache_timeout()),
            TimeoutPolicy::Forced => CacheTimeout::Never,
        }
    }

    /// Drop every entry of `entity`
    pub fn invalidate_entity(&self, entity: &str) {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.entity != entity);
        debug!(
            target: "dataaccess::cache",
            entity,
            dropped = before.saturating_sub(self.entries.len()),
            "Invalidated cache entries"
        );
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of entries, filled or not
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no entry exists
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> CacheStats {
        let c = &self.counters;
        CacheStats {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            fills: c.fills.load(Ordering::Relaxed),
            bypasses: c.bypasses.load(Ordering::Relaxed),
            replacements: c.replacements.load(Ordering::Relaxed),
        }
    }

    /// Current entry for `fingerprint`, replacing it if stale
    fn entry_for(&self, fingerprint: String, entity: &str, timeout: CacheTimeout) -> Arc<CacheEntry> {
        if let Some(entry) = self.entries.get(&fingerprint) {
            if !timeout.is_stale(entry.queried_at) {
                return Arc::clone(entry.value());
            }
        }

        // Slow path under the shard lock: a racing thread may already have
        // inserted or replaced the entry, in which case its entry is adopted.
        match self.entries.entry(fingerprint) {
            Entry::Occupied(mut occupied) => {
                if timeout.is_stale(occupied.get().queried_at) {
                    self.counters.replacements.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        target: "dataaccess::cache",
                        fingerprint = %occupied.key(),
                        "Replacing stale cache entry"
                    );
                    let fresh = Arc::new(CacheEntry::new(entity));
                    occupied.insert(Arc::clone(&fresh));
                    fresh
                } else {
                    Arc::clone(occupied.get())
                }
            }
            Entry::Vacant(vacant) => Arc::clone(vacant.insert(Arc::new(CacheEntry::new(entity))).value()),
        }
    }

    fn cached(&self, entry: &CacheEntry) -> Option<Entities> {
        let entities = entry.entities.get()?;
        self.counters.hits.fetch_add(1, Ordering::Relaxed);
        Some(Arc::clone(entities))
    }
}

impl ReadingRepository for CachedReadingRepository {
    fn read(&self, entity: &EntityInfo, criteria: &Criteria) -> DataResult<Entities> {
        let timeout = self.timeout_of(entity);
        if timeout == CacheTimeout::Disabled {
            self.counters.bypasses.fetch_add(1, Ordering::Relaxed);
            return self.base.read(entity, criteria);
        }

        let fingerprint = criteria.fingerprint(entity.name());
        let entry = self.entry_for(fingerprint, entity.name(), timeout);
        if let Some(entities) = self.cached(&entry) {
            return Ok(entities);
        }

        let _fill = entry.fill_lock.lock();
        if let Some(entities) = self.cached(&entry) {
            return Ok(entities);
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        // A failed fill leaves the entry empty for the next caller.
        let entities = self.base.read(entity, criteria)?;
        let entities = Arc::clone(entry.entities.get_or_init(|| entities));
        self.counters.fills.fetch_add(1, Ordering::Relaxed);
        debug!(
            target: "dataaccess::cache",
            entity = entity.name(),
            rows = entities.len(),
            "Filled cache entry"
        );
        Ok(entities)
    }

    fn any(&self, entity: &EntityInfo, criteria: &Criteria) -> DataResult<bool> {
        Ok(!self.read(entity, criteria)?.is_empty())
    }

    fn read_column(
        &self,
        column: &str,
        entity: &EntityInfo,
        criteria: &Criteria,
    ) -> DataResult<Vec<Value>> {
        Ok(self
            .read(entity, criteria)?
            .iter()
            .map(|record| record.column(column))
            .collect())
    }

    fn count_of(&self, entity: &EntityInfo, criteria: &Criteria) -> DataResult<usize> {
        Ok(self.read(entity, criteria)?.len())
    }

    fn invalidate(&self, entity: &str) {
        self.invalidate_entity(entity);
    }

    fn cache_stats(&self) -> Option<CacheStats> {
        Some(self.stats())
    }
}
