//! A Postgres backed work queue of pending subscriber creations.
//!
//! Tasks live in `subscriber_creation_tasks` until a worker handles them successfully.
//! Workers claim rows with `FOR UPDATE SKIP LOCKED` inside a transaction, so a claimed task
//! stays owned by one worker until it commits and goes back to the queue if that worker dies.
//! Failed tasks are retried with backoff or moved to `subscriber_creation_dead_letters`
//! according to the `RetryPolicy`.

mod policy;
mod task;

pub use policy::{RetryDecision, RetryPolicy};
pub use task::SubscriberCreationTask;

use std::time::Duration;

use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{info, warn};
use uuid::Uuid;

use crate::worker::PersistenceError;

/// Cheaply cloneable client of the subscriber creation queue.
#[derive(Clone, Debug)]
pub struct TaskQueue {
    db: PgPool,
    retry_policy: RetryPolicy,
}

/// A task owned by one worker for as long as the contained transaction is open.
#[derive(Debug)]
pub struct ClaimedTask {
    task_id: Uuid,
    payload: Value,
    n_attempts: i32,
    transaction: Transaction<'static, Postgres>,
}

/// What happened to a task after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    Retried { attempt: u32, retry_in: Duration },
    DeadLettered { attempt: u32 },
}

impl TaskQueue {
    pub fn new(db: PgPool, retry_policy: RetryPolicy) -> Self {
        Self { db, retry_policy }
    }

    /// Stores the task. It is durable once this returns.
    #[tracing::instrument(name = "Enqueueing subscriber creation", skip_all, err)]
    pub async fn enqueue(&self, task: &SubscriberCreationTask) -> QueueResult<Uuid> {
        let task_id = Uuid::new_v4();
        let payload = serde_json::to_value(task)?;

        sqlx::query(
            r#"
        INSERT INTO subscriber_creation_tasks (task_id, payload)
        VALUES ($1, $2)
    "#,
        )
        .bind(task_id)
        .bind(payload)
        .execute(&self.db)
        .await?;

        Ok(task_id)
    }

    /// Claims the oldest task that is ready to run, skipping rows other workers hold.
    pub async fn claim(&self) -> QueueResult<Option<ClaimedTask>> {
        let mut transaction = self.db.begin().await?;

        let row: Option<(Uuid, Value, i32)> = sqlx::query_as(
            r#"
        SELECT task_id, payload, n_attempts
        FROM subscriber_creation_tasks
        WHERE execute_after <= now()
        ORDER BY enqueued_at
        LIMIT 1
        FOR UPDATE
        SKIP LOCKED
    "#,
        )
        .fetch_optional(&mut *transaction)
        .await?;

        let Some((task_id, payload, n_attempts)) = row else {
            transaction.rollback().await?;
            return Ok(None);
        };

        Ok(Some(ClaimedTask {
            task_id,
            payload,
            n_attempts,
            transaction,
        }))
    }

    /// Removes a successfully handled task from the queue.
    pub async fn complete(&self, claimed: ClaimedTask) -> QueueResult<()> {
        let ClaimedTask {
            task_id,
            mut transaction,
            ..
        } = claimed;

        sqlx::query(r#"DELETE FROM subscriber_creation_tasks WHERE task_id = $1"#)
            .bind(task_id)
            .execute(&mut *transaction)
            .await?;
        transaction.commit().await?;

        Ok(())
    }

    /// Records a failed attempt and either schedules a retry or dead-letters the task.
    pub async fn fail(
        &self,
        claimed: ClaimedTask,
        error: &PersistenceError,
    ) -> QueueResult<FailureOutcome> {
        let ClaimedTask {
            task_id,
            n_attempts,
            mut transaction,
            ..
        } = claimed;
        let attempt = u32::try_from(n_attempts).unwrap_or(0).saturating_add(1);
        let last_error = error.to_string();

        let outcome = match self.retry_policy.decide(attempt, error.is_permanent()) {
            RetryDecision::RetryAfter(retry_in) => {
                sqlx::query(
                    r#"
                UPDATE subscriber_creation_tasks
                SET n_attempts = $2,
                    last_error = $3,
                    execute_after = now() + make_interval(secs => $4)
                WHERE task_id = $1
            "#,
                )
                .bind(task_id)
                .bind(i32::try_from(attempt).unwrap_or(i32::MAX))
                .bind(&last_error)
                .bind(retry_in.as_secs_f64())
                .execute(&mut *transaction)
                .await?;

                info!(%task_id, attempt, ?retry_in, "task scheduled for retry");
                FailureOutcome::Retried { attempt, retry_in }
            }
            RetryDecision::DeadLetter => {
                sqlx::query(
                    r#"
                INSERT INTO subscriber_creation_dead_letters
                    (task_id, payload, n_attempts, last_error, enqueued_at)
                SELECT task_id, payload, $2, $3, enqueued_at
                FROM subscriber_creation_tasks
                WHERE task_id = $1
            "#,
                )
                .bind(task_id)
                .bind(i32::try_from(attempt).unwrap_or(i32::MAX))
                .bind(&last_error)
                .execute(&mut *transaction)
                .await?;
                sqlx::query(r#"DELETE FROM subscriber_creation_tasks WHERE task_id = $1"#)
                    .bind(task_id)
                    .execute(&mut *transaction)
                    .await?;

                warn!(%task_id, attempt, error = %last_error, "task moved to dead letters");
                FailureOutcome::DeadLettered { attempt }
            }
        };
        transaction.commit().await?;

        Ok(outcome)
    }

    /// Number of tasks still in the queue, including ones waiting for a retry.
    pub async fn pending_count(&self) -> QueueResult<i64> {
        let count = sqlx::query_scalar(r#"SELECT COUNT(*) FROM subscriber_creation_tasks"#)
            .fetch_one(&self.db)
            .await?;
        Ok(count)
    }

    pub async fn dead_letter_count(&self) -> QueueResult<i64> {
        let count = sqlx::query_scalar(r#"SELECT COUNT(*) FROM subscriber_creation_dead_letters"#)
            .fetch_one(&self.db)
            .await?;
        Ok(count)
    }

    /// Payloads of all queued tasks in enqueue order.
    pub async fn pending_payloads(&self) -> QueueResult<Vec<Value>> {
        let payloads = sqlx::query_scalar(
            r#"SELECT payload FROM subscriber_creation_tasks ORDER BY enqueued_at"#,
        )
        .fetch_all(&self.db)
        .await?;
        Ok(payloads)
    }

    /// Closes the connections used by this queue. Further calls fail.
    pub async fn close(&self) {
        info!("{:<20} - Closing the task queue", "close_queue");
        self.db.close().await;
    }
}

impl ClaimedTask {
    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    /// Attempts made before this one.
    pub fn n_attempts(&self) -> i32 {
        self.n_attempts
    }

    /// Decodes the payload, validating the fields once more.
    pub fn payload(&self) -> Result<SubscriberCreationTask, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }

    /// The transaction holding the lock on this task. Work done through it commits
    /// together with `TaskQueue::complete`/`TaskQueue::fail`.
    pub fn transaction(&mut self) -> &mut Transaction<'static, Postgres> {
        &mut self.transaction
    }
}

// ###################################
// ->   ERROR
// ###################################
pub type QueueResult<T> = core::result::Result<T, QueueError>;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("failed to serialize the task payload: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}
