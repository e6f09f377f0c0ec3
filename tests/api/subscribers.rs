use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};
use subscriber_intake::web::routes::{SubscribeResponse, SUBSCRIBE_ACCEPTED_MSG};

use crate::helpers::TestApp;

#[tokio::test]
async fn subscribers_post_valid_data_returns_202_and_queues_one_task() -> Result<()> {
    let app = TestApp::spawn().await?;
    let body = json!({
        "email": "a@x.com",
        "status": "subscribed"
    });

    let res = app.post_subscribers(&body).await?;

    assert_eq!(
        res.status(),
        StatusCode::ACCEPTED,
        "Wrong response StatusCode: {}",
        res.status()
    );
    let res_body: SubscribeResponse = res.json().await?;
    assert_eq!(res_body.message, SUBSCRIBE_ACCEPTED_MSG);

    assert_eq!(app.task_queue.pending_payloads().await?, vec![body]);
    // Accepting does not persist anything on its own.
    assert!(app.subscribers().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn subscribers_post_only_forwards_validated_fields() -> Result<()> {
    let app = TestApp::spawn().await?;
    let body = json!({
        "email": "extra@x.com",
        "status": "unsubscribed",
        "is_admin": true,
        "id": "00000000-0000-0000-0000-000000000000"
    });

    let res = app.post_subscribers(&body).await?;
    assert_eq!(res.status(), StatusCode::ACCEPTED);

    assert_eq!(
        app.task_queue.pending_payloads().await?,
        vec![json!({ "email": "extra@x.com", "status": "unsubscribed" })]
    );

    Ok(())
}

#[tokio::test]
async fn subscribers_post_trims_padded_fields() -> Result<()> {
    let app = TestApp::spawn().await?;

    let res = app
        .post_subscribers(&json!({ "email": " padded@x.com ", "status": " subscribed" }))
        .await?;

    assert_eq!(res.status(), StatusCode::ACCEPTED);
    assert_eq!(
        app.task_queue.pending_payloads().await?,
        vec![json!({ "email": "padded@x.com", "status": "subscribed" })]
    );

    Ok(())
}

#[tokio::test]
async fn subscribers_post_accepts_form_data() -> Result<()> {
    let app = TestApp::spawn().await?;

    let res = app
        .post_subscribers_form("email=form%40x.com&status=subscribed")
        .await?;

    assert_eq!(res.status(), StatusCode::ACCEPTED);
    assert_eq!(
        app.task_queue.pending_payloads().await?,
        vec![json!({ "email": "form@x.com", "status": "subscribed" })]
    );

    Ok(())
}

#[tokio::test]
async fn subscribers_post_invalid_data_returns_422_and_queues_nothing() -> Result<()> {
    let app = TestApp::spawn().await?;

    let cases = [
        (json!({ "status": "subscribed" }), "Missing email"),
        (json!({ "email": "a@x.com" }), "Missing status"),
        (json!({ "email": null, "status": "subscribed" }), "Null email"),
        (
            json!({ "email": "not-an-email", "status": "subscribed" }),
            "Malformed email",
        ),
        (
            json!({ "email": "a@x.com", "status": "pending" }),
            "Status outside the allowed values",
        ),
        (
            json!({ "email": "a@x.com", "status": "Subscribed" }),
            "Status with the wrong case",
        ),
        (json!({}), "Empty json"),
    ];

    for (body, description) in cases {
        let res = app.post_subscribers(&body).await?;
        assert_eq!(
            res.status(),
            StatusCode::UNPROCESSABLE_ENTITY,
            "Wrong response: ({}), Expected: ({}); for request with: {description}",
            res.status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );

        let res_body: Value = res.json().await?;
        assert_eq!(res_body["error"]["message"], "INVALID_INPUT");
        assert!(
            res_body["error"]["data"]["detail"].is_object(),
            "Missing field detail for: {description}"
        );
    }

    assert_eq!(app.task_queue.pending_count().await?, 0);

    Ok(())
}

#[tokio::test]
async fn subscribers_post_existing_email_returns_422() -> Result<()> {
    let app = TestApp::spawn().await?;
    let body = json!({
        "email": "taken@x.com",
        "status": "subscribed"
    });

    app.post_subscribers(&body).await?.error_for_status()?;
    app.drain_queue().await?;
    assert_eq!(app.subscribers().await?.len(), 1);

    let res = app.post_subscribers(&body).await?;

    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let res_body: Value = res.json().await?;
    assert_eq!(
        res_body["error"]["data"]["detail"]["email"],
        json!(["The email has already been taken."])
    );
    assert_eq!(app.task_queue.pending_count().await?, 0);

    Ok(())
}

#[tokio::test]
async fn subscribers_post_same_payload_twice_queues_two_tasks() -> Result<()> {
    let app = TestApp::spawn().await?;
    let body = json!({
        "email": "twice@x.com",
        "status": "subscribed"
    });

    for _ in 0..2 {
        let res = app.post_subscribers(&body).await?;
        assert_eq!(res.status(), StatusCode::ACCEPTED);
    }

    assert_eq!(app.task_queue.pending_count().await?, 2);

    Ok(())
}

#[tokio::test]
async fn subscribers_post_returns_500_when_the_queue_is_gone() -> Result<()> {
    let app = TestApp::spawn().await?;
    sqlx::query("DROP TABLE subscriber_creation_tasks")
        .execute(app.dm.db())
        .await?;

    let res = app
        .post_subscribers(&json!({ "email": "lost@x.com", "status": "subscribed" }))
        .await?;

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let res_body: Value = res.json().await?;
    assert_eq!(res_body["error"]["message"], "SERVICE_ERROR");

    Ok(())
}
