//! Reading, caching and deferred-write engine
//!
//! This crate builds the data access behavior on top of the backend traits
//! of `dataaccess-core`:
//! - Retry: re-run operations that fail with a transient backend error
//! - Reading: direct, cached and forced-cache reading repositories
//! - Transactions: queued writes committed as one atomic batch
//! - Scheduler: deferred commits, flushed in parallel in the background
//! - DataContext / DataGetter: session object and read facade
//! - Config: `dataaccess.toml`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod context;
pub mod getter;
pub mod reading;
pub mod registry;
pub mod retry;
pub mod transaction;

pub use config::{DataAccessConfig, EntityOverride, CONFIG_FILE_NAME};
pub use context::{DataContext, DataContextBuilder};
pub use getter::{DataGetter, Filter};
pub use reading::{
    CacheStats, CacheTimeout, CachedReadingRepository, DirectReadingRepository, Entities,
    ForcedCacheReadingRepository, ReadMode, ReadingRepository,
};
pub use registry::RepositoryRegistry;
pub use retry::{retry_on_transient_failure, RetryConfig, DEFAULT_MAX_ATTEMPTS};
pub use transaction::{
    DeadLetter, SchedulerFlusher, SchedulerStats, Transaction, TransactionMode,
    TransactionScheduler,
};
