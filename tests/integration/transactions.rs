//! Deferred transactions through a DataContext

use crate::common::*;
use std::panic::{self, AssertUnwindSafe};

fn begin(env: &TestEnv) -> Transaction {
    env.ctx
        .begin_transaction("main", IsolationLevel::ReadCommitted)
        .unwrap()
}

// ============================================================================
// Batch atomicity
// ============================================================================

#[test]
fn failing_action_leaves_no_trace() {
    let env = TestEnv::new(ReadMode::Direct);
    let mut txn = begin(&env);
    txn.insert(&customer(1, "ann", "Berlin")).unwrap();
    txn.update(&customer(2, "ghost", "Nowhere")).unwrap();
    txn.insert(&customer(3, "cat", "Paris")).unwrap();

    assert!(!txn.commit().unwrap());
    assert!(!txn.is_committed());
    assert_eq!(txn.pending_len(), 3);
    assert_eq!(env.customers().count_of(&Criteria::new()).unwrap(), 0);
    let stats = env.backend.stats();
    assert_eq!(stats.scopes_completed, 0);
    assert_eq!(stats.rows_written, 0);

    // The kept batch succeeds once the missing row exists.
    env.seed_customers(&[customer(2, "ben", "Berlin")]);
    assert!(txn.commit().unwrap());
    assert_eq!(env.customers().count_of(&Criteria::new()).unwrap(), 3);
    assert_eq!(txn.commit_attempts(), 2);
}

#[test]
fn batch_of_many_is_all_or_nothing() {
    let env = TestEnv::new(ReadMode::Direct);
    env.seed_customers(&[customer(2, "ben", "Berlin")]);

    let mut txn = begin(&env);
    txn.insert_many(&[
        customer(1, "ann", "Berlin"),
        customer(2, "ben", "Berlin"),
        customer(3, "cat", "Paris"),
    ])
    .unwrap();
    assert!(!txn.commit().unwrap());
    assert_eq!(env.backend.rows("Customer").len(), 1);
}

// ============================================================================
// Commit semantics
// ============================================================================

#[test]
fn commit_twice_executes_once() {
    let env = TestEnv::new(ReadMode::Direct);
    let mut txn = begin(&env);
    txn.insert(&customer(1, "ann", "Berlin")).unwrap();

    assert!(txn.commit().unwrap());
    assert!(txn.commit().unwrap());
    let stats = env.backend.stats();
    assert_eq!(stats.scopes_begun, 1);
    assert_eq!(stats.rows_written, 1);
}

#[test]
fn writes_after_commit_are_rejected() {
    let env = TestEnv::new(ReadMode::Direct);
    let mut txn = begin(&env);
    txn.insert(&customer(1, "ann", "Berlin")).unwrap();
    txn.commit().unwrap();

    for result in [
        txn.insert(&customer(2, "ben", "Berlin")),
        txn.update(&customer(1, "ann", "Paris")),
        txn.delete_many(&[customer(1, "ann", "Berlin")]),
    ] {
        assert!(matches!(result, Err(DataError::InvalidState(_))));
    }
}

#[test]
fn deadlocked_commit_is_retried_transparently() {
    let env = TestEnv::new(ReadMode::Direct);
    env.backend.faults().fail_commits(3, "40P01");
    let mut txn = begin(&env);
    txn.insert(&customer(1, "ann", "Berlin")).unwrap();

    assert!(txn.commit().unwrap());
    assert_eq!(env.backend.stats().scopes_begun, 4);
    assert_eq!(env.backend.rows("Customer").len(), 1);
}

#[test]
fn write_then_invalidate_refreshes_cached_reads() {
    let env = TestEnv::new(ReadMode::Cached);
    env.seed_customers(&berlin_and_paris());
    let customers = env.customers();
    assert_eq!(customers.filter().eq("city", "Paris").count_of().unwrap(), 1);

    let mut txn = begin(&env);
    txn.update(&customer(1, "ann", "Paris")).unwrap();
    assert!(txn.commit().unwrap());

    assert_eq!(customers.filter().eq("city", "Paris").count_of().unwrap(), 1);
    env.ctx.invalidate("Customer");
    assert_eq!(customers.filter().eq("city", "Paris").count_of().unwrap(), 2);
}

// ============================================================================
// Exit actions
// ============================================================================

#[test]
fn dropping_immediate_transaction_commits() {
    let env = TestEnv::new(ReadMode::Direct);
    {
        let mut txn = begin(&env);
        txn.insert(&customer(1, "ann", "Berlin")).unwrap();
        txn.insert(&AuditEntry {
            id: 1,
            message: "created ann".into(),
        })
        .unwrap();
    }
    assert_eq!(env.backend.rows("Customer").len(), 1);
    assert_eq!(env.backend.rows("AuditEntry").len(), 1);
}

#[test]
fn panicking_scope_does_not_commit() {
    let env = TestEnv::new(ReadMode::Direct);
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut txn = begin(&env);
        txn.insert(&customer(1, "ann", "Berlin")).unwrap();
        panic!("caller failed halfway");
    }));
    assert!(result.is_err());
    assert!(env.backend.rows("Customer").is_empty());
    assert_eq!(env.backend.stats().scopes_begun, 0);
}

#[test]
fn failed_drop_commit_discards_quietly() {
    let env = TestEnv::new(ReadMode::Direct);
    {
        let mut txn = begin(&env);
        txn.delete(&customer(9, "nobody", "Nowhere")).unwrap();
    }
    assert_eq!(env.backend.stats().scopes_aborted, 1);
    assert_eq!(env.ctx.scheduler().pending_len(), 0);
}
