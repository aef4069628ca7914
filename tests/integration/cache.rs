//! Cached reads through a DataContext

use crate::common::*;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

// ============================================================================
// Fill-once
// ============================================================================

#[test]
fn concurrent_identical_reads_hit_backend_once() {
    let env = TestEnv::new(ReadMode::Cached);
    env.seed_customers(&berlin_and_paris());
    env.backend.set_read_delay(Duration::from_millis(30));

    let getter = env.customers();
    let barrier = Arc::new(Barrier::new(16));
    let handles: Vec<_> = (0..16)
        .map(|_| {
            let getter = getter.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                getter.filter().eq("city", "Berlin").read().unwrap()
            })
        })
        .collect();

    let results: Vec<Entities> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(env.reads(), 1);
    for result in &results {
        assert_eq!(result.len(), 3);
        assert_eq!(result[..], results[0][..]);
    }
    let stats = env.ctx.cache_stats().unwrap();
    assert_eq!(stats.fills, 1);
    assert_eq!(stats.hits, 15);
}

#[test]
fn different_fingerprints_do_not_wait_for_each_other() {
    let env = TestEnv::new(ReadMode::Cached);
    env.seed_customers(&berlin_and_paris());
    env.backend.set_read_delay(Duration::from_millis(500));

    let getter = env.customers();
    let slow = {
        let getter = getter.clone();
        thread::spawn(move || getter.filter().eq("city", "Berlin").count_of().unwrap())
    };

    // Wait until the slow fill is inside the backend, then make reads fast.
    let deadline = Instant::now() + Duration::from_secs(5);
    while env.reads() == 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
    env.backend.set_read_delay(Duration::ZERO);

    assert_eq!(getter.filter().eq("city", "Paris").count_of().unwrap(), 1);
    assert!(!slow.is_finished());
    assert_eq!(slow.join().unwrap(), 3);
}

#[test]
fn derived_operations_share_one_fill() {
    let env = TestEnv::new(ReadMode::Cached);
    env.seed_customers(&berlin_and_paris());
    let customers = env.customers();
    let berlin = customers.filter().eq("city", "Berlin");

    assert_eq!(berlin.count_of().unwrap(), 3);
    assert!(berlin.any().unwrap());
    let mut names: Vec<String> = berlin
        .select("name")
        .unwrap()
        .into_iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    names.sort();
    assert_eq!(names, ["ann", "ben", "dan"]);
    assert!(berlin.first().unwrap().is_some());
    assert_eq!(env.reads(), 1);
}

// ============================================================================
// Bypass and staleness
// ============================================================================

#[test]
fn zero_timeout_entity_always_hits_backend() {
    let env = TestEnv::new(ReadMode::Cached);
    let audit = env.ctx.get::<AuditEntry>().unwrap();
    for _ in 0..4 {
        assert!(audit.all().unwrap().is_empty());
    }
    assert_eq!(env.reads(), 4);
    assert_eq!(env.ctx.cache_stats().unwrap().bypasses, 4);
}

#[test]
fn stale_entry_triggers_exactly_one_refresh() {
    init_tracing();
    let backend = Arc::new(MemoryBackend::new("main"));
    let ctx = DataContext::builder()
        .backend(backend.clone())
        .entity(
            EntityInfo::builder("Quote")
                .repository("main")
                .cache_timeout(Duration::from_millis(50))
                .primary_key(["symbol"])
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();
    let quotes = ctx.get_by_name("Quote").unwrap();
    backend.seed(quotes.info(), vec![Record::new().with("symbol", "ACME").with("px", 10)]);

    let before = quotes.all().unwrap();
    quotes.all().unwrap();
    assert_eq!(backend.stats().reads, 1);

    backend.seed(quotes.info(), vec![Record::new().with("symbol", "ACME").with("px", 11)]);
    thread::sleep(Duration::from_millis(100));

    let after = quotes.all().unwrap();
    quotes.all().unwrap();
    assert_eq!(backend.stats().reads, 2);
    assert_eq!(before[0].column("px").as_int(), Some(10));
    assert_eq!(after[0].column("px").as_int(), Some(11));
    assert_eq!(ctx.cache_stats().unwrap().replacements, 1);
}

#[test]
fn herd_arriving_after_expiry_refreshes_once() {
    init_tracing();
    let backend = Arc::new(MemoryBackend::new("main"));
    let ctx = DataContext::builder()
        .backend(backend.clone())
        .entity(
            EntityInfo::builder("Quote")
                .repository("main")
                .cache_timeout(Duration::from_millis(400))
                .primary_key(["symbol"])
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();
    let quotes = ctx.get_by_name("Quote").unwrap();
    backend.seed(quotes.info(), vec![Record::new().with("symbol", "ACME").with("px", 10)]);
    quotes.all().unwrap();
    assert_eq!(backend.stats().reads, 1);

    backend.seed(quotes.info(), vec![Record::new().with("symbol", "ACME").with("px", 11)]);
    thread::sleep(Duration::from_millis(450));
    backend.set_read_delay(Duration::from_millis(30));

    let barrier = Arc::new(Barrier::new(12));
    let handles: Vec<_> = (0..12)
        .map(|_| {
            let quotes = quotes.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                quotes.all().unwrap()
            })
        })
        .collect();

    for handle in handles {
        let rows = handle.join().unwrap();
        assert_eq!(rows[0].column("px").as_int(), Some(11));
    }
    assert_eq!(backend.stats().reads, 2);
    let stats = ctx.cache_stats().unwrap();
    assert_eq!(stats.replacements, 1);
    assert_eq!(stats.fills, 2);
}

#[test]
fn forced_cache_ignores_declared_timeouts() {
    let env = TestEnv::new(ReadMode::ForcedCache);
    let audit = env.ctx.get::<AuditEntry>().unwrap();
    audit.all().unwrap();
    audit.all().unwrap();
    assert_eq!(env.reads(), 1);
}

// ============================================================================
// Fingerprints
// ============================================================================

#[test]
fn criteria_order_does_not_split_the_cache() {
    let env = TestEnv::new(ReadMode::Cached);
    env.seed_customers(&berlin_and_paris());
    let getter = env.customers();

    let a = getter.filter().eq("city", "Berlin").eq("name", "ann").read().unwrap();
    let b = getter
        .where_(&Criteria::new().with("name", "ann").with("city", "Berlin"))
        .unwrap();
    let c: Criteria = [("name", "ann"), ("city", "Berlin")].into_iter().collect();
    let c = getter.where_(&c).unwrap();

    assert!(Arc::ptr_eq(&a, &b));
    assert!(Arc::ptr_eq(&a, &c));
    assert_eq!(env.reads(), 1);

    getter.filter().eq("city", "Berlin").eq("name", "ben").read().unwrap();
    assert_eq!(env.reads(), 2);
}

#[test]
fn integer_and_string_values_are_distinct_keys() {
    let env = TestEnv::new(ReadMode::Cached);
    env.seed_customers(&berlin_and_paris());
    let getter = env.customers();
    assert_eq!(getter.filter().eq("id", 1).count_of().unwrap(), 1);
    assert_eq!(getter.filter().eq("id", "1").count_of().unwrap(), 0);
    assert_eq!(env.reads(), 2);
}

// ============================================================================
// Retry
// ============================================================================

#[test]
fn transient_read_failures_are_absorbed() {
    let env = TestEnv::new(ReadMode::Cached);
    env.seed_customers(&berlin_and_paris());
    env.backend.faults().fail_reads(5, "1205");
    assert_eq!(env.customers().all().unwrap().len(), 4);
    assert_eq!(env.reads(), 6);
}

#[test]
fn retry_bound_comes_from_config() {
    let mut config = DataAccessConfig::default();
    config.retry.max_attempts = 3;
    let env = TestEnv::with_config(config, ReadMode::Cached);
    env.backend.faults().fail_reads(10, "1222");

    match env.customers().all().unwrap_err() {
        DataError::RetryExhausted { attempts, source } => {
            assert_eq!(attempts, 3);
            assert_eq!(source.code(), Some("1222"));
        }
        other => panic!("expected RetryExhausted, got {:?}", other),
    }
    assert_eq!(env.reads(), 3);
}

#[test]
fn permanent_failure_is_not_retried_nor_cached() {
    let env = TestEnv::new(ReadMode::Cached);
    env.seed_customers(&berlin_and_paris());
    env.backend.faults().fail_reads_permanently("permission denied");

    let err = env.customers().all().unwrap_err();
    assert!(matches!(err, DataError::Backend { code: None, .. }));
    assert_eq!(env.reads(), 1);

    env.backend.faults().reset();
    assert_eq!(env.customers().all().unwrap().len(), 4);
}
