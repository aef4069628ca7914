//! Deferred transactions
//!
//! A [`Transaction`] queues writes in memory and sends them to the backend as
//! one atomic batch on [`commit`](Transaction::commit). The batch runs inside
//! a single backend scope and is retried as a whole on transient failure. If
//! any write reports a logical failure the scope is abandoned, nothing
//! becomes visible, and the queue is kept for a later attempt.
//!
//! Dropping a transaction that still holds writes runs its exit action:
//! - [`TransactionMode::Immediate`]: commit on the spot
//! - [`TransactionMode::Scheduled`]: hand the writes to a
//!   [`TransactionScheduler`] for a later flush

mod flusher;
mod scheduler;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dataaccess_core::{
    DataError, DataResult, Entity, EntityInfo, EntityRegistry, IsolationLevel, Record,
    TransactionScope, TransactionScopeFactory,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::retry::{retry_on_transient_failure, RetryConfig};

pub use flusher::SchedulerFlusher;
pub use scheduler::{DeadLetter, SchedulerStats, TransactionScheduler};

/// What dropping an uncommitted transaction does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    /// Commit on drop
    Immediate,
    /// Append to the scheduler on drop
    Scheduled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteKind {
    Insert,
    Update,
    Delete,
    InsertMany,
    UpdateMany,
    DeleteMany,
}

/// One queued write with the metadata it was resolved against
#[derive(Debug)]
struct PendingWriteAction {
    kind: WriteKind,
    entity: Arc<EntityInfo>,
    records: Vec<Record>,
}

impl PendingWriteAction {
    fn apply(&self, scope: &mut dyn TransactionScope) -> DataResult<bool> {
        let entity = self.entity.as_ref();
        match (self.kind, self.records.as_slice()) {
            (WriteKind::Insert, [record]) => scope.insert(entity, record),
            (WriteKind::Update, [record]) => scope.update(entity, record),
            (WriteKind::Delete, [record]) => scope.delete(entity, record),
            (WriteKind::InsertMany, records) => scope.insert_many(entity, records),
            (WriteKind::UpdateMany, records) => scope.update_many(entity, records),
            (WriteKind::DeleteMany, records) => scope.delete_many(entity, records),
            (kind, records) => Err(DataError::invalid_state(format!(
                "{:?} queued with {} records",
                kind,
                records.len()
            ))),
        }
    }
}

enum ExitAction {
    Commit,
    Schedule(Arc<TransactionScheduler>),
    Nothing,
}

/// Queue of writes committed atomically against one backend
pub struct Transaction {
    id: Uuid,
    isolation: IsolationLevel,
    factory: Arc<dyn TransactionScopeFactory>,
    entities: Arc<EntityRegistry>,
    retry: RetryConfig,
    queue: Vec<PendingWriteAction>,
    committed: bool,
    commit_attempts: u32,
    created_at: DateTime<Utc>,
    exit: ExitAction,
}

impl Transaction {
    /// Open transaction that commits when dropped
    pub fn new(
        factory: Arc<dyn TransactionScopeFactory>,
        entities: Arc<EntityRegistry>,
        retry: RetryConfig,
        isolation: IsolationLevel,
    ) -> Self {
        let transaction = Self {
            id: Uuid::new_v4(),
            isolation,
            factory,
            entities,
            retry,
            queue: Vec::new(),
            committed: false,
            commit_attempts: 0,
            created_at: Utc::now(),
            exit: ExitAction::Commit,
        };
        debug!(
            target: "dataaccess::txn",
            txn_id = %transaction.id,
            backend = transaction.factory.name(),
            isolation = ?isolation,
            "Transaction started"
        );
        transaction
    }

    /// Hand this transaction to `scheduler` when dropped instead of committing
    pub fn scheduled_on(mut self, scheduler: Arc<TransactionScheduler>) -> Self {
        self.exit = ExitAction::Schedule(scheduler);
        self
    }

    /// Unique identifier, used in logs and dead-letter reports
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Isolation level of every scope this transaction opens
    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    /// What dropping this transaction does
    pub fn mode(&self) -> TransactionMode {
        match self.exit {
            ExitAction::Schedule(_) => TransactionMode::Scheduled,
            ExitAction::Commit | ExitAction::Nothing => TransactionMode::Immediate,
        }
    }

    /// True once a commit succeeded
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Number of queued write actions
    pub fn pending_len(&self) -> usize {
        self.queue.len()
    }

    /// Number of commit calls that reached the backend
    pub fn commit_attempts(&self) -> u32 {
        self.commit_attempts
    }

    /// When the transaction was opened
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Queue an insert of `entity`
    pub fn insert<E: Entity>(&mut self, entity: &E) -> DataResult<()> {
        let info = self.entities.info_for::<E>()?;
        self.enqueue(WriteKind::Insert, info, vec![entity.to_record()])
    }

    /// Queue an update of `entity`
    pub fn update<E: Entity>(&mut self, entity: &E) -> DataResult<()> {
        let info = self.entities.info_for::<E>()?;
        self.enqueue(WriteKind::Update, info, vec![entity.to_record()])
    }

    /// Queue a delete of `entity`
    pub fn delete<E: Entity>(&mut self, entity: &E) -> DataResult<()> {
        let info = self.entities.info_for::<E>()?;
        self.enqueue(WriteKind::Delete, info, vec![entity.to_record()])
    }

    /// Queue one batch insert of every entity in `entities`
    pub fn insert_many<E: Entity>(&mut self, entities: &[E]) -> DataResult<()> {
        let info = self.entities.info_for::<E>()?;
        self.enqueue(WriteKind::InsertMany, info, entities.iter().map(E::to_record).collect())
    }

    /// Queue one batch update of every entity in `entities`
    pub fn update_many<E: Entity>(&mut self, entities: &[E]) -> DataResult<()> {
        let info = self.entities.info_for::<E>()?;
        self.enqueue(WriteKind::UpdateMany, info, entities.iter().map(E::to_record).collect())
    }

    /// Queue one batch delete of every entity in `entities`
    pub fn delete_many<E: Entity>(&mut self, entities: &[E]) -> DataResult<()> {
        let info = self.entities.info_for::<E>()?;
        self.enqueue(WriteKind::DeleteMany, info, entities.iter().map(E::to_record).collect())
    }

    /// Queue an insert of a raw record of an entity registered by name
    pub fn insert_record(&mut self, entity: Arc<EntityInfo>, record: Record) -> DataResult<()> {
        self.enqueue(WriteKind::Insert, entity, vec![record])
    }

    /// Queue an update of a raw record
    pub fn update_record(&mut self, entity: Arc<EntityInfo>, record: Record) -> DataResult<()> {
        self.enqueue(WriteKind::Update, entity, vec![record])
    }

    /// Queue a delete of a raw record
    pub fn delete_record(&mut self, entity: Arc<EntityInfo>, record: Record) -> DataResult<()> {
        self.enqueue(WriteKind::Delete, entity, vec![record])
    }

    fn enqueue(
        &mut self,
        kind: WriteKind,
        entity: Arc<EntityInfo>,
        records: Vec<Record>,
    ) -> DataResult<()> {
        if self.committed {
            return Err(DataError::invalid_state(format!(
                "transaction {} is already committed",
                self.id
            )));
        }
        if entity.repository() != self.factory.name() {
            return Err(DataError::configuration(format!(
                "entity '{}' is stored in '{}', not in '{}'",
                entity.name(),
                entity.repository(),
                self.factory.name()
            )));
        }
        self.queue.push(PendingWriteAction {
            kind,
            entity,
            records,
        });
        Ok(())
    }

    /// Send every queued write to the backend as one atomic batch
    ///
    /// # Returns
    /// * `Ok(true)` - the batch committed, or this transaction already had
    /// * `Ok(false)` - a write reported a logical failure; nothing was
    ///   applied and the queue is kept
    /// * `Err(e)` - non-transient backend error, or transient errors beyond
    ///   the retry bound; the queue is kept
    pub fn commit(&mut self) -> DataResult<bool> {
        if self.committed {
            return Ok(true);
        }
        if self.queue.is_empty() {
            self.committed = true;
            return Ok(true);
        }

        self.commit_attempts += 1;
        let factory = Arc::clone(&self.factory);
        let isolation = self.isolation;
        let queue = &self.queue;
        let outcome = retry_on_transient_failure(
            &self.retry,
            "commit",
            |e| factory.is_transient(e),
            || run_batch(factory.as_ref(), isolation, queue),
        )?;

        match outcome {
            None => {
                info!(
                    target: "dataaccess::txn",
                    txn_id = %self.id,
                    actions = self.queue.len(),
                    attempt = self.commit_attempts,
                    "Transaction committed"
                );
                self.queue.clear();
                self.committed = true;
                Ok(true)
            }
            Some(action) => {
                let failure = DataError::PartialBatchFailure {
                    transaction: self.id,
                    action,
                };
                warn!(
                    target: "dataaccess::txn",
                    txn_id = %self.id,
                    attempt = self.commit_attempts,
                    error = %failure,
                    "Transaction rolled back"
                );
                Ok(false)
            }
        }
    }

    /// Move the queue into a new transaction that does nothing on drop
    fn detach(&mut self) -> Transaction {
        Transaction {
            id: self.id,
            isolation: self.isolation,
            factory: Arc::clone(&self.factory),
            entities: Arc::clone(&self.entities),
            retry: self.retry.clone(),
            queue: std::mem::take(&mut self.queue),
            committed: false,
            commit_attempts: self.commit_attempts,
            created_at: self.created_at,
            exit: ExitAction::Nothing,
        }
    }
}

/// Run one attempt: `Some(index)` of the first write that failed logically
fn run_batch(
    factory: &dyn TransactionScopeFactory,
    isolation: IsolationLevel,
    queue: &[PendingWriteAction],
) -> DataResult<Option<usize>> {
    let mut scope = factory.begin(isolation)?;
    for (index, action) in queue.iter().enumerate() {
        if !action.apply(scope.as_mut())? {
            // Dropping the scope without completing it aborts the batch
            return Ok(Some(index));
        }
    }
    scope.complete()?;
    Ok(None)
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.committed || self.queue.is_empty() {
            return;
        }
        let exit = std::mem::replace(&mut self.exit, ExitAction::Nothing);
        if std::thread::panicking() && !matches!(exit, ExitAction::Nothing) {
            warn!(
                target: "dataaccess::txn",
                txn_id = %self.id,
                actions = self.queue.len(),
                "Discarding transaction dropped during panic"
            );
            return;
        }
        match exit {
            ExitAction::Nothing => {}
            ExitAction::Commit => match self.commit() {
                Ok(true) => {}
                Ok(false) => warn!(
                    target: "dataaccess::txn",
                    txn_id = %self.id,
                    "Transaction dropped without committing"
                ),
                Err(e) => error!(
                    target: "dataaccess::txn",
                    txn_id = %self.id,
                    error = %e,
                    "Commit on drop failed"
                ),
            },
            ExitAction::Schedule(scheduler) => {
                let handoff = self.detach();
                scheduler.append(handoff);
            }
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("backend", &self.factory.name())
            .field("isolation", &self.isolation)
            .field("pending", &self.queue.len())
            .field("committed", &self.committed)
            .field("commit_attempts", &self.commit_attempts)
            .finish()
    }
}
