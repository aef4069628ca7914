//! Data context: the session object tying everything together
//!
//! A [`DataContext`] owns the entity registry, the repository registry, the
//! reading repository chosen by [`ReadMode`] and the transaction scheduler.
//! Nothing is global: two contexts never share caches or metadata.

use std::path::Path;
use std::sync::Arc;

use dataaccess_core::{
    DataResult, Entity, EntityInfo, EntityRegistry, EntityRepository, IsolationLevel,
    TransactionScopeFactory,
};
use tracing::info;

use crate::config::DataAccessConfig;
use crate::getter::DataGetter;
use crate::reading::{
    CacheStats, CachedReadingRepository, DirectReadingRepository, ForcedCacheReadingRepository,
    ReadMode, ReadingRepository,
};
use crate::registry::RepositoryRegistry;
use crate::retry::RetryConfig;
use crate::transaction::{SchedulerFlusher, Transaction, TransactionScheduler};

/// Builder for [`DataContext`]
#[derive(Debug, Default)]
pub struct DataContextBuilder {
    config: DataAccessConfig,
    read_mode: ReadMode,
    repositories: RepositoryRegistry,
    entities: Vec<EntityInfo>,
}

impl DataContextBuilder {
    /// Use `config` instead of the defaults
    pub fn config(mut self, config: DataAccessConfig) -> Self {
        self.config = config;
        self
    }

    /// Load the config from `path`, writing the default file first if missing
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written, read or parsed.
    pub fn config_file(mut self, path: &Path) -> DataResult<Self> {
        DataAccessConfig::write_default_if_missing(path)?;
        self.config = DataAccessConfig::from_file(path)?;
        Ok(self)
    }

    /// Reading strategy
    pub fn read_mode(mut self, read_mode: ReadMode) -> Self {
        self.read_mode = read_mode;
        self
    }

    /// Register a backend that reads and writes
    pub fn backend<B>(self, backend: Arc<B>) -> Self
    where
        B: EntityRepository + TransactionScopeFactory + 'static,
    {
        self.repositories.register_backend(backend);
        self
    }

    /// Register a read-only capability
    pub fn reader(self, reader: Arc<dyn EntityRepository>) -> Self {
        self.repositories.register_reader(reader);
        self
    }

    /// Register a write-only capability
    pub fn writer(self, writer: Arc<dyn TransactionScopeFactory>) -> Self {
        self.repositories.register_writer(writer);
        self
    }

    /// Register metadata for an entity addressed by name
    pub fn entity(mut self, info: EntityInfo) -> Self {
        self.entities.push(info);
        self
    }

    /// Validate the config and assemble the context
    ///
    /// # Errors
    ///
    /// Returns `Configuration` for an invalid config or a duplicate entity.
    pub fn build(self) -> DataResult<DataContext> {
        self.config.validate()?;

        let entities = Arc::new(EntityRegistry::new());
        entities.set_default_cache_timeout(self.config.default_cache_timeout());
        for (name, timeout) in self.config.cache_overrides() {
            entities.override_cache_timeout(name, timeout);
        }
        for info in self.entities {
            entities.register(info)?;
        }

        let retry = self.config.retry_config();
        let repositories = Arc::new(self.repositories);
        let direct = Arc::new(DirectReadingRepository::new(
            Arc::clone(&repositories),
            retry.clone(),
        ));
        let reader: Arc<dyn ReadingRepository> = match self.read_mode {
            ReadMode::Direct => direct,
            ReadMode::Cached => Arc::new(CachedReadingRepository::new(direct)),
            ReadMode::ForcedCache => Arc::new(ForcedCacheReadingRepository::new(direct)),
        };
        let scheduler = Arc::new(TransactionScheduler::new(
            self.config.scheduler.max_commit_attempts,
        ));

        info!(
            target: "dataaccess::config",
            read_mode = ?self.read_mode,
            entities = entities.len(),
            max_attempts = retry.max_attempts,
            "Data context ready"
        );

        Ok(DataContext {
            config: self.config,
            read_mode: self.read_mode,
            retry,
            entities,
            repositories,
            reader,
            scheduler,
        })
    }
}

/// Session object owning metadata, backends, caches and the scheduler
pub struct DataContext {
    config: DataAccessConfig,
    read_mode: ReadMode,
    retry: RetryConfig,
    entities: Arc<EntityRegistry>,
    repositories: Arc<RepositoryRegistry>,
    reader: Arc<dyn ReadingRepository>,
    scheduler: Arc<TransactionScheduler>,
}

impl DataContext {
    /// Start building a context
    pub fn builder() -> DataContextBuilder {
        DataContextBuilder::default()
    }

    /// Getter for entity type `E`
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if `E` describes invalid metadata.
    pub fn get<E: Entity>(&self) -> DataResult<DataGetter> {
        let info = self.entities.info_for::<E>()?;
        Ok(DataGetter::new(info, Arc::clone(&self.reader)))
    }

    /// Getter for an entity registered by name
    pub fn get_by_name(&self, name: &str) -> DataResult<DataGetter> {
        let info = self.entities.by_name(name)?;
        Ok(DataGetter::new(info, Arc::clone(&self.reader)))
    }

    /// Transaction against `repository` that commits when dropped
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if no writer is registered under `repository`.
    pub fn begin_transaction(
        &self,
        repository: &str,
        isolation: IsolationLevel,
    ) -> DataResult<Transaction> {
        let factory = self.repositories.writer(repository)?;
        Ok(Transaction::new(
            factory,
            Arc::clone(&self.entities),
            self.retry.clone(),
            isolation,
        ))
    }

    /// Transaction against `repository` handed to the scheduler when dropped
    pub fn begin_scheduled_transaction(
        &self,
        repository: &str,
        isolation: IsolationLevel,
    ) -> DataResult<Transaction> {
        Ok(self
            .begin_transaction(repository, isolation)?
            .scheduled_on(Arc::clone(&self.scheduler)))
    }

    /// Start a background flusher using the configured interval
    pub fn spawn_flusher(&self) -> DataResult<SchedulerFlusher> {
        SchedulerFlusher::spawn(Arc::clone(&self.scheduler), self.config.flush_interval())
    }

    /// Register a backend after construction
    pub fn register_backend<B>(&self, backend: Arc<B>)
    where
        B: EntityRepository + TransactionScopeFactory + 'static,
    {
        self.repositories.register_backend(backend);
    }

    /// Drop cached results of `entity`
    pub fn invalidate(&self, entity: &str) {
        self.reader.invalidate(entity);
    }

    /// Cache counters, `None` in direct mode
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.reader.cache_stats()
    }

    /// Transaction scheduler
    pub fn scheduler(&self) -> &Arc<TransactionScheduler> {
        &self.scheduler
    }

    /// Entity metadata registry
    pub fn entities(&self) -> &Arc<EntityRegistry> {
        &self.entities
    }

    /// Backend registry
    pub fn repositories(&self) -> &Arc<RepositoryRegistry> {
        &self.repositories
    }

    /// Reading repository used by every getter
    pub fn reader(&self) -> &Arc<dyn ReadingRepository> {
        &self.reader
    }

    /// Active configuration
    pub fn config(&self) -> &DataAccessConfig {
        &self.config
    }

    /// Reading strategy
    pub fn read_mode(&self) -> ReadMode {
        self.read_mode
    }
}

impl std::fmt::Debug for DataContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataContext")
            .field("read_mode", &self.read_mode)
            .field("entities", &self.entities.len())
            .field("repositories", &self.repositories)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}
