use std::time::Duration;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::json;
use subscriber_intake::{
    queue::{FailureOutcome, SubscriberCreationTask},
    worker::{try_execute_task, ExecutionOutcome},
};
use uuid::Uuid;

use crate::helpers::TestApp;

#[tokio::test]
async fn worker_persists_an_accepted_subscriber() -> Result<()> {
    let app = TestApp::spawn().await?;

    let res = app
        .post_subscribers(&json!({ "email": "a@x.com", "status": "subscribed" }))
        .await?;
    assert_eq!(res.status(), StatusCode::ACCEPTED);

    let outcomes = app.drain_queue().await?;

    assert_eq!(outcomes, vec![ExecutionOutcome::TaskCompleted]);
    assert_eq!(
        app.subscribers().await?,
        vec![("a@x.com".to_string(), "subscribed".to_string())]
    );
    assert_eq!(app.task_queue.pending_count().await?, 0);

    Ok(())
}

#[tokio::test]
async fn worker_persists_duplicates_only_once() -> Result<()> {
    let app = TestApp::spawn().await?;
    let body = json!({ "email": "dup@x.com", "status": "subscribed" });

    // Both requests pass the uniqueness check since nothing is persisted yet.
    let (first, second) = tokio::join!(app.post_subscribers(&body), app.post_subscribers(&body));
    assert_eq!(first?.status(), StatusCode::ACCEPTED);
    assert_eq!(second?.status(), StatusCode::ACCEPTED);
    assert_eq!(app.task_queue.pending_count().await?, 2);

    let outcomes = app.drain_queue().await?;

    assert_eq!(
        outcomes,
        vec![
            ExecutionOutcome::TaskCompleted,
            ExecutionOutcome::TaskFailed(FailureOutcome::DeadLettered { attempt: 1 }),
        ]
    );
    assert_eq!(app.subscribers().await?.len(), 1);
    assert_eq!(app.task_queue.pending_count().await?, 0);
    assert_eq!(app.task_queue.dead_letter_count().await?, 1);

    // The worker keeps going after the failure.
    app.post_subscribers(&json!({ "email": "next@x.com", "status": "unsubscribed" }))
        .await?
        .error_for_status()?;
    assert_eq!(app.drain_queue().await?, vec![ExecutionOutcome::TaskCompleted]);
    assert_eq!(app.subscribers().await?.len(), 2);

    Ok(())
}

#[tokio::test]
async fn worker_dead_letters_malformed_payloads() -> Result<()> {
    let app = TestApp::spawn().await?;
    sqlx::query("INSERT INTO subscriber_creation_tasks (task_id, payload) VALUES ($1, $2)")
        .bind(Uuid::new_v4())
        .bind(json!({ "email": "not-an-email", "status": "subscribed" }))
        .execute(app.dm.db())
        .await?;

    let outcomes = app.drain_queue().await?;

    assert_eq!(
        outcomes,
        vec![ExecutionOutcome::TaskFailed(FailureOutcome::DeadLettered { attempt: 1 })]
    );
    assert!(app.subscribers().await?.is_empty());
    assert_eq!(app.task_queue.dead_letter_count().await?, 1);

    Ok(())
}

#[tokio::test]
async fn worker_storage_failures_are_retried_later() -> Result<()> {
    let app = TestApp::spawn().await?;
    app.post_subscribers(&json!({ "email": "retry@x.com", "status": "subscribed" }))
        .await?
        .error_for_status()?;

    // Make the insert fail with something other than a duplicate.
    sqlx::query("ALTER TABLE subscribers RENAME TO subscribers_offline")
        .execute(app.dm.db())
        .await?;

    let outcomes = app.drain_queue().await?;
    let [ExecutionOutcome::TaskFailed(FailureOutcome::Retried { attempt, retry_in })] =
        outcomes.as_slice()
    else {
        panic!("expected a single retried task, got: {outcomes:?}");
    };
    assert_eq!(*attempt, 1);
    assert!(*retry_in > Duration::ZERO);

    // The task waits for its retry and is not handed out before that.
    assert_eq!(app.task_queue.pending_count().await?, 1);
    assert_eq!(
        try_execute_task(&app.task_queue).await?,
        ExecutionOutcome::EmptyQueue
    );
    let (n_attempts, last_error): (i32, Option<String>) =
        sqlx::query_as("SELECT n_attempts, last_error FROM subscriber_creation_tasks")
            .fetch_one(app.dm.db())
            .await?;
    assert_eq!(n_attempts, 1);
    assert!(last_error.is_some());

    // Storage comes back and the retry is due.
    sqlx::query("ALTER TABLE subscribers_offline RENAME TO subscribers")
        .execute(app.dm.db())
        .await?;
    sqlx::query("UPDATE subscriber_creation_tasks SET execute_after = now()")
        .execute(app.dm.db())
        .await?;

    assert_eq!(app.drain_queue().await?, vec![ExecutionOutcome::TaskCompleted]);
    assert_eq!(
        app.subscribers().await?,
        vec![("retry@x.com".to_string(), "subscribed".to_string())]
    );

    Ok(())
}

#[tokio::test]
async fn concurrent_workers_never_handle_the_same_task() -> Result<()> {
    let app = TestApp::spawn().await?;
    app.post_subscribers(&json!({ "email": "once@x.com", "status": "subscribed" }))
        .await?
        .error_for_status()?;

    let (first, second) = tokio::join!(
        try_execute_task(&app.task_queue),
        try_execute_task(&app.task_queue)
    );
    let mut outcomes = vec![first?, second?];
    outcomes.sort_by_key(|outcome| matches!(outcome, ExecutionOutcome::EmptyQueue));

    assert_eq!(
        outcomes,
        vec![ExecutionOutcome::TaskCompleted, ExecutionOutcome::EmptyQueue]
    );
    assert_eq!(app.subscribers().await?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn worker_pool_drains_the_queue_in_the_background() -> Result<()> {
    let app = TestApp::spawn_with_workers(3).await?;

    for i in 0..10 {
        let res = app
            .post_subscribers(&json!({ "email": format!("user{i}@x.com"), "status": "subscribed" }))
            .await?;
        assert_eq!(res.status(), StatusCode::ACCEPTED);
    }

    let subscribers = app
        .wait_for_subscribers(10, Duration::from_secs(10))
        .await?;

    assert_eq!(subscribers.len(), 10);
    assert_eq!(app.task_queue.pending_count().await?, 0);

    Ok(())
}

#[tokio::test]
async fn worker_pool_survives_a_duplicate_failure() -> Result<()> {
    let app = TestApp::spawn_with_workers(2).await?;
    let dup = json!({ "email": "dup@x.com", "status": "subscribed" });

    // Queue both duplicates before any worker can persist the first one.
    let dup: SubscriberCreationTask = serde_json::from_value(dup)?;
    app.task_queue.enqueue(&dup).await?;
    app.task_queue.enqueue(&dup).await?;
    app.post_subscribers(&json!({ "email": "after@x.com", "status": "unsubscribed" }))
        .await?
        .error_for_status()?;

    let subscribers = app.wait_for_subscribers(2, Duration::from_secs(10)).await?;
    assert_eq!(
        subscribers,
        vec![
            ("after@x.com".to_string(), "unsubscribed".to_string()),
            ("dup@x.com".to_string(), "subscribed".to_string()),
        ]
    );

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while app.task_queue.pending_count().await? > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(app.task_queue.pending_count().await?, 0);
    assert_eq!(app.task_queue.dead_letter_count().await?, 1);

    Ok(())
}
