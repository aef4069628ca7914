//! Transaction scheduler
//!
//! Collects transactions whose commit was deferred and replays them in
//! batches. A flush drains the whole pending list under the lock, then
//! commits the drained transactions in parallel without holding it, so new
//! hand-offs never wait on backend I/O.
//!
//! A transaction that keeps failing is re-queued until it has failed
//! `max_commit_attempts` times, then moved to the dead-letter list.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dataaccess_core::DataError;
use parking_lot::Mutex;
use rayon::prelude::*;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::{ExitAction, Transaction};

/// Transaction given up on after too many failed commits
#[derive(Debug)]
pub struct DeadLetter {
    /// The transaction, with its queue intact
    pub transaction: Transaction,
    /// Error of the last attempt, `None` if a write failed logically
    pub last_error: Option<DataError>,
    /// When it was dead-lettered
    pub failed_at: DateTime<Utc>,
}

/// Snapshot of scheduler counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Transactions waiting for the next flush
    pub pending: usize,
    /// Transactions committed by a flush
    pub committed: u64,
    /// Failed commits put back in the pending list
    pub requeued: u64,
    /// Transactions moved to the dead-letter list
    pub dead_lettered: u64,
}

#[derive(Default)]
struct Counters {
    committed: AtomicU64,
    requeued: AtomicU64,
    dead_lettered: AtomicU64,
}

/// Pending list of deferred transactions
pub struct TransactionScheduler {
    pending: Mutex<Vec<Transaction>>,
    dead_letters: Mutex<Vec<DeadLetter>>,
    max_commit_attempts: u32,
    counters: Counters,
}

impl TransactionScheduler {
    /// Scheduler that dead-letters a transaction after
    /// `max_commit_attempts` failed commits (0 = retry forever)
    pub fn new(max_commit_attempts: u32) -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
            dead_letters: Mutex::new(Vec::new()),
            max_commit_attempts,
            counters: Counters::default(),
        }
    }

    /// Failed commits allowed before dead-lettering (0 = unbounded)
    pub fn max_commit_attempts(&self) -> u32 {
        self.max_commit_attempts
    }

    /// Add a transaction to the pending list
    ///
    /// Committed transactions are ignored. The scheduler owns the
    /// transaction from now on: dropping it later does not commit it.
    pub fn append(&self, mut transaction: Transaction) {
        transaction.exit = ExitAction::Nothing;
        if transaction.is_committed() {
            return;
        }
        debug!(
            target: "dataaccess::scheduler",
            txn_id = %transaction.id(),
            actions = transaction.pending_len(),
            "Transaction scheduled"
        );
        self.pending.lock().push(transaction);
    }

    /// Drain the pending list and commit every drained transaction in parallel
    ///
    /// Failed transactions go back to the pending list, or to the dead-letter
    /// list once out of attempts. Returns `true` only if every drained
    /// transaction committed.
    pub fn sequential_commit(&self) -> bool {
        let batch = std::mem::take(&mut *self.pending.lock());
        if batch.is_empty() {
            return true;
        }
        let drained = batch.len();

        let outcomes: Vec<(Transaction, Result<bool, DataError>)> = batch
            .into_par_iter()
            .map(|mut transaction| {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| transaction.commit()))
                    .unwrap_or_else(|payload| Err(commit_panicked(&transaction, payload)));
                (transaction, outcome)
            })
            .collect();

        let mut committed = 0usize;
        for (transaction, outcome) in outcomes {
            match outcome {
                Ok(true) => committed += 1,
                Ok(false) => self.requeue(transaction, None),
                Err(e) => self.requeue(transaction, Some(e)),
            }
        }
        self.counters
            .committed
            .fetch_add(committed as u64, Ordering::Relaxed);

        info!(
            target: "dataaccess::scheduler",
            drained,
            committed,
            failed = drained - committed,
            "Flushed scheduled transactions"
        );
        committed == drained
    }

    /// Same as [`sequential_commit`](Self::sequential_commit)
    ///
    /// Kept as a separate entry point so a grouping strategy (per backend or
    /// per entity) can be introduced without changing callers.
    pub fn grouping_commit(&self) -> bool {
        self.sequential_commit()
    }

    fn requeue(&self, transaction: Transaction, last_error: Option<DataError>) {
        let exhausted = self.max_commit_attempts > 0
            && transaction.commit_attempts() >= self.max_commit_attempts;
        if !exhausted {
            self.counters.requeued.fetch_add(1, Ordering::Relaxed);
            self.pending.lock().push(transaction);
            return;
        }

        let reason = last_error
            .as_ref()
            .map_or_else(|| "write rejected by backend".to_string(), |e| e.to_string());
        error!(
            target: "dataaccess::scheduler",
            txn_id = %transaction.id(),
            attempts = transaction.commit_attempts(),
            actions = transaction.pending_len(),
            reason = %reason,
            "Transaction dead-lettered"
        );
        self.counters.dead_lettered.fetch_add(1, Ordering::Relaxed);
        self.dead_letters.lock().push(DeadLetter {
            transaction,
            last_error,
            failed_at: Utc::now(),
        });
    }

    /// Number of transactions waiting for the next flush
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Ids of the transactions waiting for the next flush
    pub fn pending_ids(&self) -> Vec<Uuid> {
        self.pending.lock().iter().map(Transaction::id).collect()
    }

    /// Remove and return every dead-lettered transaction
    pub fn take_dead_letters(&self) -> Vec<DeadLetter> {
        std::mem::take(&mut *self.dead_letters.lock())
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            pending: self.pending_len(),
            committed: self.counters.committed.load(Ordering::Relaxed),
            requeued: self.counters.requeued.load(Ordering::Relaxed),
            dead_lettered: self.counters.dead_lettered.load(Ordering::Relaxed),
        }
    }
}

/// Turn a panic raised by a backend during commit into a failed attempt
fn commit_panicked(transaction: &Transaction, payload: Box<dyn Any + Send>) -> DataError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "(non-string panic)".to_string());
    error!(
        target: "dataaccess::scheduler",
        txn_id = %transaction.id(),
        panic = %message,
        "Commit panicked"
    );
    DataError::backend(format!("commit panicked: {}", message))
}

impl Default for TransactionScheduler {
    fn default() -> Self {
        Self::new(0)
    }
}

impl std::fmt::Debug for TransactionScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionScheduler")
            .field("pending", &self.pending_len())
            .field("max_commit_attempts", &self.max_commit_attempts)
            .finish()
    }
}
