use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::info;

use crate::{
    queue::SubscriberCreationTask,
    web::{
        extract::SubscriberPayload,
        types::{DataParsingError, DeserSubscriber, ValidEmail, ValidSubscriber},
        Error, WebResult,
    },
    AppState,
};

pub const SUBSCRIBE_ACCEPTED_MSG: &str = "Subscriber created successfully";

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubscribeResponse {
    pub message: String,
}

/// Validates the request and queues the subscriber for creation.
/// Answers `202 Accepted` as soon as the task is stored: persisting the subscriber is up to the workers.
#[tracing::instrument(
    name = "Accepting a new subscriber",
    skip(app_state, payload),
    fields(subscriber_email = ?payload.0.email)
)]
pub async fn create_subscriber(
    State(app_state): State<AppState>,
    payload: SubscriberPayload,
) -> WebResult<(StatusCode, Json<SubscribeResponse>)> {
    let SubscriberPayload(payload) = payload;
    let subscriber = validate_subscriber(app_state.database_mgr.db(), payload).await?;

    let task = SubscriberCreationTask::from(subscriber);
    let task_id = app_state.task_queue.enqueue(&task).await?;
    info!(%task_id, "subscriber creation queued");

    Ok((
        StatusCode::ACCEPTED,
        Json(SubscribeResponse {
            message: SUBSCRIBE_ACCEPTED_MSG.to_string(),
        }),
    ))
}

/// Runs every validation rule and reports all failing fields at once.
/// The uniqueness check is a plain read: a concurrent request for the same email can still pass it.
async fn validate_subscriber(db: &PgPool, payload: DeserSubscriber) -> WebResult<ValidSubscriber> {
    let (email, status, mut errors) = payload.validate();

    if let Some(email) = &email {
        if email_exists(db, email).await? {
            errors.push(DataParsingError::EmailTaken);
        }
    }

    match (email, status) {
        (Some(email), Some(status)) if errors.is_empty() => Ok(ValidSubscriber { email, status }),
        _ => Err(Error::Validation(errors)),
    }
}

async fn email_exists(db: &PgPool, email: &ValidEmail) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(r#"SELECT EXISTS(SELECT 1 FROM subscribers WHERE email = $1)"#)
        .bind(email.as_ref())
        .fetch_one(db)
        .await
}
