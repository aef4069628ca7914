//! Scheduled transactions and the background flusher

use crate::common::*;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

fn begin_scheduled(env: &TestEnv) -> Transaction {
    env.ctx
        .begin_scheduled_transaction("main", IsolationLevel::ReadCommitted)
        .unwrap()
}

fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn failed_transaction_is_back_in_the_list() {
    let env = TestEnv::new(ReadMode::Direct);
    {
        let mut ok = begin_scheduled(&env);
        ok.insert(&customer(1, "ann", "Berlin")).unwrap();
    }
    let failing = {
        let mut bad = begin_scheduled(&env);
        bad.update(&customer(2, "ghost", "Nowhere")).unwrap();
        bad.id()
    };
    assert_eq!(env.ctx.scheduler().pending_len(), 2);

    assert!(!env.ctx.scheduler().sequential_commit());
    assert_eq!(env.ctx.scheduler().pending_ids(), vec![failing]);
    assert_eq!(env.backend.rows("Customer").len(), 1);
}

#[test]
fn scheduled_drop_defers_the_write() {
    let env = TestEnv::new(ReadMode::Direct);
    {
        let mut txn = begin_scheduled(&env);
        assert_eq!(txn.mode(), TransactionMode::Scheduled);
        txn.insert(&customer(1, "ann", "Berlin")).unwrap();
    }
    assert!(env.backend.rows("Customer").is_empty());
    assert_eq!(env.backend.stats().scopes_begun, 0);

    assert!(env.ctx.scheduler().grouping_commit());
    assert_eq!(env.backend.rows("Customer").len(), 1);
}

#[test]
fn scheduled_drop_during_panic_is_discarded() {
    let env = TestEnv::new(ReadMode::Direct);
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut txn = begin_scheduled(&env);
        txn.insert(&customer(1, "ann", "Berlin")).unwrap();
        panic!("caller failed halfway");
    }));
    assert!(result.is_err());
    assert_eq!(env.ctx.scheduler().pending_len(), 0);

    assert!(env.ctx.scheduler().sequential_commit());
    assert!(env.backend.rows("Customer").is_empty());
    assert_eq!(env.backend.stats().scopes_begun, 0);
}

#[test]
fn explicitly_committed_scheduled_transaction_is_not_scheduled() {
    let env = TestEnv::new(ReadMode::Direct);
    {
        let mut txn = begin_scheduled(&env);
        txn.insert(&customer(1, "ann", "Berlin")).unwrap();
        assert!(txn.commit().unwrap());
    }
    assert_eq!(env.ctx.scheduler().pending_len(), 0);
}

#[test]
fn dead_letter_bound_comes_from_config() {
    let mut config = DataAccessConfig::default();
    config.scheduler.max_commit_attempts = 2;
    let env = TestEnv::with_config(config, ReadMode::Direct);
    let failing = {
        let mut txn = begin_scheduled(&env);
        txn.delete(&customer(5, "eve", "Rome")).unwrap();
        txn.id()
    };

    assert!(!env.ctx.scheduler().sequential_commit());
    assert_eq!(env.ctx.scheduler().pending_len(), 1);
    assert!(!env.ctx.scheduler().sequential_commit());
    assert_eq!(env.ctx.scheduler().pending_len(), 0);

    let dead = env.ctx.scheduler().take_dead_letters();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].transaction.id(), failing);
    assert!(dead[0].last_error.is_none());
    let stats = env.ctx.scheduler().stats();
    assert_eq!((stats.requeued, stats.dead_lettered), (1, 1));
}

#[test]
fn flusher_commits_concurrent_hand_offs() {
    let mut config = DataAccessConfig::default();
    config.scheduler.flush_interval_ms = 5;
    let env = Arc::new(TestEnv::with_config(config, ReadMode::Direct));
    let flusher = env.ctx.spawn_flusher().unwrap();

    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let env = Arc::clone(&env);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..25 {
                    let mut txn = begin_scheduled(&env);
                    txn.insert(&customer(t * 100 + i, "c", "Lyon")).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(wait_until(Duration::from_secs(10), || {
        env.backend.rows("Customer").len() == 200
    }));
    flusher.shutdown();
    assert_eq!(env.ctx.scheduler().pending_len(), 0);
    assert_eq!(env.ctx.scheduler().stats().committed, 200);
}

#[test]
fn flusher_shutdown_drains_pending_work() {
    let env = TestEnv::new(ReadMode::Direct);
    let flusher = env.ctx.spawn_flusher().unwrap();
    for id in 0..3 {
        let mut txn = begin_scheduled(&env);
        txn.insert(&customer(id, "x", "Oslo")).unwrap();
    }
    drop(flusher);
    assert_eq!(env.backend.rows("Customer").len(), 3);
}
