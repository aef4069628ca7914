//! Shared test utilities for the integration suite.

#![allow(dead_code)]

use std::sync::{Arc, Once};
use std::time::Duration;

pub use dataaccess::*;

static INIT_TRACING: Once = Once::new();

/// Route `tracing` output to the test harness (shown with `--nocapture`).
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

// ============================================================================
// Entities
// ============================================================================

/// Cached for a minute
#[derive(Debug, Clone)]
pub struct Customer {
    pub id: i64,
    pub name: String,
    pub city: String,
}

impl Entity for Customer {
    fn describe() -> DataResult<EntityInfo> {
        EntityInfo::builder("Customer")
            .repository("main")
            .cache_timeout(Duration::from_secs(60))
            .properties(["id", "name", "city"])
            .primary_key(["id"])
            .build()
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("id", self.id)
            .with("name", self.name.as_str())
            .with("city", self.city.as_str())
    }
}

pub fn customer(id: i64, name: &str, city: &str) -> Customer {
    Customer {
        id,
        name: name.to_string(),
        city: city.to_string(),
    }
}

/// Never cached
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub id: i64,
    pub message: String,
}

impl Entity for AuditEntry {
    fn describe() -> DataResult<EntityInfo> {
        EntityInfo::builder("AuditEntry")
            .repository("main")
            .properties(["id", "message"])
            .primary_key(["id"])
            .build()
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("id", self.id)
            .with("message", self.message.as_str())
    }
}

// ============================================================================
// TestEnv - context over one memory backend named "main"
// ============================================================================

pub struct TestEnv {
    pub backend: Arc<MemoryBackend>,
    pub ctx: DataContext,
}

impl TestEnv {
    pub fn new(read_mode: ReadMode) -> Self {
        Self::with_config(DataAccessConfig::default(), read_mode)
    }

    pub fn with_config(config: DataAccessConfig, read_mode: ReadMode) -> Self {
        init_tracing();
        let backend = Arc::new(MemoryBackend::new("main"));
        let ctx = DataContext::builder()
            .config(config)
            .read_mode(read_mode)
            .backend(backend.clone())
            .build()
            .expect("context should build");
        TestEnv { backend, ctx }
    }

    /// Load customers straight into the backend
    pub fn seed_customers(&self, customers: &[Customer]) {
        let info = self.ctx.entities().info_for::<Customer>().unwrap();
        self.backend
            .seed(&info, customers.iter().map(Customer::to_record));
    }

    pub fn customers(&self) -> DataGetter {
        self.ctx.get::<Customer>().unwrap()
    }

    pub fn reads(&self) -> u64 {
        self.backend.stats().reads
    }
}

pub fn berlin_and_paris() -> Vec<Customer> {
    vec![
        customer(1, "ann", "Berlin"),
        customer(2, "ben", "Berlin"),
        customer(3, "cat", "Paris"),
        customer(4, "dan", "Berlin"),
    ]
}
