//! Repository registry
//!
//! Maps the repository name carried by each [`EntityInfo`] to the backend
//! capabilities serving it. Readers and writers are registered separately so
//! a read replica and a primary can serve the same logical repository.

use std::sync::Arc;

use dashmap::DashMap;
use dataaccess_core::{DataError, DataResult, EntityInfo, EntityRepository, TransactionScopeFactory};
use tracing::debug;

/// Name → backend capability lookup
#[derive(Default)]
pub struct RepositoryRegistry {
    readers: DashMap<String, Arc<dyn EntityRepository>>,
    writers: DashMap<String, Arc<dyn TransactionScopeFactory>>,
}

impl RepositoryRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a read capability under its own name, replacing any previous one
    pub fn register_reader(&self, reader: Arc<dyn EntityRepository>) {
        let name = reader.name().to_string();
        debug!(target: "dataaccess::config", repository = %name, "Registered reader");
        self.readers.insert(name, reader);
    }

    /// Register a write capability under its own name, replacing any previous one
    pub fn register_writer(&self, writer: Arc<dyn TransactionScopeFactory>) {
        let name = writer.name().to_string();
        debug!(target: "dataaccess::config", repository = %name, "Registered writer");
        self.writers.insert(name, writer);
    }

    /// Register a backend that both reads and writes
    pub fn register_backend<B>(&self, backend: Arc<B>)
    where
        B: EntityRepository + TransactionScopeFactory + 'static,
    {
        self.register_reader(backend.clone());
        self.register_writer(backend);
    }

    /// Read capability named `name`
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if nothing is registered under `name`.
    pub fn reader(&self, name: &str) -> DataResult<Arc<dyn EntityRepository>> {
        self.readers
            .get(name)
            .map(|r| Arc::clone(r.value()))
            .ok_or_else(|| DataError::configuration(format!("no reading repository named '{}'", name)))
    }

    /// Write capability named `name`
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if nothing is registered under `name`.
    pub fn writer(&self, name: &str) -> DataResult<Arc<dyn TransactionScopeFactory>> {
        self.writers
            .get(name)
            .map(|w| Arc::clone(w.value()))
            .ok_or_else(|| DataError::configuration(format!("no writing repository named '{}'", name)))
    }

    /// Read capability serving `entity`
    pub fn reader_for(&self, entity: &EntityInfo) -> DataResult<Arc<dyn EntityRepository>> {
        self.reader(entity.repository()).map_err(|_| {
            DataError::configuration(format!(
                "entity '{}' refers to unknown repository '{}'",
                entity.name(),
                entity.repository()
            ))
        })
    }
}

impl std::fmt::Debug for RepositoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryRegistry")
            .field("readers", &self.readers.len())
            .field("writers", &self.writers.len())
            .finish()
    }
}
