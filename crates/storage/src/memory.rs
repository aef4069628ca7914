//! MemoryBackend: in-process reference adapter
//!
//! Implements both backend capabilities:
//! - `EntityRepository`: filtered reads returning a one-shot cursor
//! - `TransactionScopeFactory`: scopes that stage writes and apply them
//!   atomically on `complete`
//!
//! # Design Notes
//!
//! - Tables are `BTreeMap<row key, Record>` behind one `parking_lot::RwLock`,
//!   so reads return rows in key order and a completing scope applies its
//!   whole batch under a single write lock.
//! - Row keys are the rendered primary-key values. Entities without a primary
//!   key are keyed by the whole record.
//! - A scope sees its own staged writes (for logical insert/update/delete
//!   checks) but nothing is visible to readers until completion.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use dataaccess_core::{
    Criteria, DataError, DataResult, EntityInfo, EntityRepository, IsolationLevel, Record,
    RecordCursor, TransactionScope, TransactionScopeFactory, Value,
};

use crate::faults::FaultInjector;

/// Backend error codes treated as transient contention
///
/// SQL Server deadlock victim / lock timeout / snapshot update conflict and
/// the Postgres deadlock SQLSTATE.
pub const TRANSIENT_CODES: &[&str] = &["1205", "1222", "3960", "40P01"];

type Table = BTreeMap<String, Record>;

/// I/O counters snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BackendStats {
    /// Reads that reached the backend (including failed ones)
    pub reads: u64,
    /// Scopes opened
    pub scopes_begun: u64,
    /// Scopes completed
    pub scopes_completed: u64,
    /// Scopes dropped without completion
    pub scopes_aborted: u64,
    /// Individual row writes made visible
    pub rows_written: u64,
}

#[derive(Debug, Default)]
struct Counters {
    reads: AtomicU64,
    scopes_begun: AtomicU64,
    scopes_completed: AtomicU64,
    scopes_aborted: AtomicU64,
    rows_written: AtomicU64,
}

#[derive(Debug)]
struct MemoryInner {
    name: String,
    tables: RwLock<BTreeMap<String, Table>>,
    faults: FaultInjector,
    counters: Counters,
    read_delay: Mutex<Duration>,
}

/// In-process backend holding every entity in memory
///
/// Cheap to clone; clones share the same tables.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    inner: Arc<MemoryInner>,
}

fn row_key(entity: &EntityInfo, record: &Record) -> String {
    match entity.primary_key() {
        Some(columns) => record
            .key_of(columns)
            .iter()
            .map(Value::to_string)
            .collect::<Vec<_>>()
            .join("|"),
        None => format!("{:?}", record),
    }
}

impl MemoryBackend {
    /// Create an empty backend registered under `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                name: name.into(),
                tables: RwLock::new(BTreeMap::new()),
                faults: FaultInjector::new(),
                counters: Counters::default(),
                read_delay: Mutex::new(Duration::ZERO),
            }),
        }
    }

    /// Load rows directly, bypassing scopes and counters
    pub fn seed<I>(&self, entity: &EntityInfo, records: I)
    where
        I: IntoIterator<Item = Record>,
    {
        let mut tables = self.inner.tables.write();
        let table = tables.entry(entity.name().to_string()).or_default();
        for record in records {
            table.insert(row_key(entity, &record), record);
        }
    }

    /// Current rows of an entity, in key order
    pub fn rows(&self, entity_name: &str) -> Vec<Record> {
        self.inner
            .tables
            .read()
            .get(entity_name)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Failure script for this backend
    pub fn faults(&self) -> &FaultInjector {
        &self.inner.faults
    }

    /// Make every read sleep for `delay` before returning
    ///
    /// Widens the window in which concurrent readers overlap.
    pub fn set_read_delay(&self, delay: Duration) {
        *self.inner.read_delay.lock() = delay;
    }

    /// Snapshot of the I/O counters
    pub fn stats(&self) -> BackendStats {
        let c = &self.inner.counters;
        BackendStats {
            reads: c.reads.load(Ordering::Relaxed),
            scopes_begun: c.scopes_begun.load(Ordering::Relaxed),
            scopes_completed: c.scopes_completed.load(Ordering::Relaxed),
            scopes_aborted: c.scopes_aborted.load(Ordering::Relaxed),
            rows_written: c.rows_written.load(Ordering::Relaxed),
        }
    }

    fn classify(error: &DataError) -> bool {
        matches!(error, DataError::Backend { code: Some(code), .. } if TRANSIENT_CODES.contains(&code.as_str()))
    }
}

impl EntityRepository for MemoryBackend {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn read(&self, entity: &EntityInfo, criteria: &Criteria) -> DataResult<RecordCursor> {
        let delay = *self.inner.read_delay.lock();
        self.inner.counters.reads.fetch_add(1, Ordering::Relaxed);
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        if let Some(err) = self.inner.faults.next_read_fault() {
            return Err(err);
        }

        let rows: Vec<Record> = self
            .inner
            .tables
            .read()
            .get(entity.name())
            .map(|table| {
                table
                    .values()
                    .filter(|r| r.matches(criteria))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(RecordCursor::from_records(rows))
    }

    fn is_transient(&self, error: &DataError) -> bool {
        Self::classify(error)
    }
}

impl TransactionScopeFactory for MemoryBackend {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn begin(&self, isolation: IsolationLevel) -> DataResult<Box<dyn TransactionScope>> {
        self.inner
            .counters
            .scopes_begun
            .fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(MemoryScope {
            inner: Arc::clone(&self.inner),
            isolation,
            staged: BTreeMap::new(),
            completed: false,
        }))
    }

    fn is_transient(&self, error: &DataError) -> bool {
        Self::classify(error)
    }
}

/// Staged writes keyed by (entity, row key); `None` marks a delete
struct MemoryScope {
    inner: Arc<MemoryInner>,
    isolation: IsolationLevel,
    staged: BTreeMap<(String, String), Option<Record>>,
    completed: bool,
}

impl MemoryScope {
    fn exists(&self, entity: &str, key: &str) -> bool {
        match self.staged.get(&(entity.to_string(), key.to_string())) {
            Some(staged) => staged.is_some(),
            None => self
                .inner
                .tables
                .read()
                .get(entity)
                .is_some_and(|t| t.contains_key(key)),
        }
    }

    fn stage(&mut self, entity: &EntityInfo, record: &Record, row: Option<Record>) {
        self.staged
            .insert((entity.name().to_string(), row_key(entity, record)), row);
    }
}

impl TransactionScope for MemoryScope {
    fn insert(&mut self, entity: &EntityInfo, record: &Record) -> DataResult<bool> {
        if self.exists(entity.name(), &row_key(entity, record)) {
            return Ok(false);
        }
        self.stage(entity, record, Some(record.clone()));
        Ok(true)
    }

    fn update(&mut self, entity: &EntityInfo, record: &Record) -> DataResult<bool> {
        if !self.exists(entity.name(), &row_key(entity, record)) {
            return Ok(false);
        }
        self.stage(entity, record, Some(record.clone()));
        Ok(true)
    }

    fn delete(&mut self, entity: &EntityInfo, record: &Record) -> DataResult<bool> {
        if !self.exists(entity.name(), &row_key(entity, record)) {
            return Ok(false);
        }
        self.stage(entity, record, None);
        Ok(true)
    }

    fn complete(mut self: Box<Self>) -> DataResult<()> {
        if let Some(err) = self.inner.faults.next_commit_fault() {
            return Err(err);
        }

        let staged = std::mem::take(&mut self.staged);
        let rows = staged.len() as u64;
        {
            let mut tables = self.inner.tables.write();
            for ((entity, key), row) in staged {
                let table = tables.entry(entity).or_default();
                match row {
                    Some(record) => {
                        table.insert(key, record);
                    }
                    None => {
                        table.remove(&key);
                    }
                }
            }
        }

        self.completed = true;
        let counters = &self.inner.counters;
        counters.rows_written.fetch_add(rows, Ordering::Relaxed);
        counters.scopes_completed.fetch_add(1, Ordering::Relaxed);
        debug!(
            target: "dataaccess::storage",
            backend = %self.inner.name,
            isolation = ?self.isolation,
            rows,
            "Scope completed"
        );
        Ok(())
    }
}

impl Drop for MemoryScope {
    fn drop(&mut self) {
        if !self.completed {
            self.inner
                .counters
                .scopes_aborted
                .fetch_add(1, Ordering::Relaxed);
            debug!(
                target: "dataaccess::storage",
                backend = %self.inner.name,
                discarded = self.staged.len(),
                "Scope aborted"
            );
        }
    }
}
