//! Consumes the subscriber creation queue and persists subscribers.
//!
//! A worker never retries on its own: every failure is handed back to the `TaskQueue`,
//! whose `RetryPolicy` decides between a delayed retry and the dead letter table.

mod pool;

pub use pool::WorkerPool;

use chrono::Utc;
use sqlx::{Acquire, PgConnection};
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::queue::{ClaimedTask, FailureOutcome, QueueError, SubscriberCreationTask, TaskQueue};

/// Result of a single pass over the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    EmptyQueue,
    TaskCompleted,
    TaskFailed(FailureOutcome),
}

/// Claims the next ready task, if any, and handles it.
/// Only infrastructure errors of the queue itself are returned as `Err`.
pub async fn try_execute_task(queue: &TaskQueue) -> WorkerResult<ExecutionOutcome> {
    let Some(claimed) = queue.claim().await? else {
        return Ok(ExecutionOutcome::EmptyQueue);
    };

    let span = tracing::info_span!(
        "subscriber_creation",
        task_id = %claimed.task_id(),
        attempt = claimed.n_attempts() + 1,
    );

    process_claimed(queue, claimed).instrument(span).await
}

async fn process_claimed(
    queue: &TaskQueue,
    mut claimed: ClaimedTask,
) -> WorkerResult<ExecutionOutcome> {
    match handle(&mut claimed).await {
        Ok(subscriber_id) => {
            queue.complete(claimed).await?;
            info!(%subscriber_id, "subscriber persisted");
            Ok(ExecutionOutcome::TaskCompleted)
        }
        Err(er) => {
            warn!(error = %er, "failed to persist subscriber");
            let outcome = queue.fail(claimed, &er).await?;
            Ok(ExecutionOutcome::TaskFailed(outcome))
        }
    }
}

/// Decodes the task and inserts the subscriber inside a savepoint of the claiming
/// transaction, so a failed insert leaves the claim usable for recording the failure.
async fn handle(claimed: &mut ClaimedTask) -> Result<Uuid, PersistenceError> {
    let task = claimed
        .payload()
        .map_err(|er| PersistenceError::MalformedPayload(er.to_string()))?;

    let mut savepoint = claimed.transaction().begin().await?;
    match insert_subscriber(&mut savepoint, &task).await {
        Ok(subscriber_id) => {
            savepoint.commit().await?;
            Ok(subscriber_id)
        }
        Err(er) => {
            savepoint.rollback().await?;
            Err(er)
        }
    }
}

/// Inserts exactly the fields carried by the task.
/// The unique index on `email` is what rejects duplicates.
pub async fn insert_subscriber(
    connection: &mut PgConnection,
    task: &SubscriberCreationTask,
) -> Result<Uuid, PersistenceError> {
    let subscriber_id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO subscribers (id, email, status, created_at)
        VALUES ($1, $2, $3, $4)
    "#,
    )
    .bind(subscriber_id)
    .bind(task.email.as_ref())
    .bind(task.status.as_ref())
    .bind(Utc::now())
    .execute(connection)
    .await?;

    Ok(subscriber_id)
}

// ###################################
// ->   ERROR
// ###################################
pub type WorkerResult<T> = core::result::Result<T, WorkerError>;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
}

/// Why a task could not be turned into a subscriber row.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("a subscriber with this email already exists")]
    Duplicate,
    #[error("task payload could not be decoded: {0}")]
    MalformedPayload(String),
    #[error("storage error: {0}")]
    Storage(sqlx::Error),
}

impl PersistenceError {
    /// Permanent failures will never succeed on a retry.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Duplicate | Self::MalformedPayload(_))
    }
}

impl From<sqlx::Error> for PersistenceError {
    fn from(value: sqlx::Error) -> Self {
        match &value {
            sqlx::Error::Database(er) if er.is_unique_violation() => Self::Duplicate,
            _ => Self::Storage(value),
        }
    }
}
