use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::sync::Arc;
use strum_macros::AsRefStr;

use super::types::FieldErrors;
use crate::queue::QueueError;

pub type WebResult<T> = core::result::Result<T, Error>;

#[derive(Debug, AsRefStr, thiserror::Error)]
pub enum Error {
    #[error("request validation failed: {0}")]
    Validation(FieldErrors),
    #[error("request body rejected ({status}): {message}")]
    BodyRejected { status: StatusCode, message: String },

    #[error("failed to enqueue the subscriber creation task: {0}")]
    Enqueue(#[from] QueueError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

impl Error {
    pub fn status_code_and_client_error(&self) -> (StatusCode, ClientError) {
        use ClientError::*;

        match self {
            Error::Validation(errors) => {
                (StatusCode::UNPROCESSABLE_ENTITY, InvalidInput(errors.clone()))
            }
            Error::BodyRejected { status, message } => (*status, BadRequest(message.clone())),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, ServiceError),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        tracing::debug!("{:<12} - into_response(Error: {self:?})", "INTO_RESP");

        // Construct a response
        let mut res = StatusCode::INTERNAL_SERVER_ERROR.into_response();

        // Insert the Error into response so that it can be retrieved later.
        res.extensions_mut().insert(Arc::new(self));

        res
    }
}

/// The error as the client gets to see it.
/// Serializes to `{"message": "INVALID_INPUT", "detail": {...}}`.
#[derive(Debug, AsRefStr, Serialize)]
#[serde(tag = "message", content = "detail", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientError {
    InvalidInput(FieldErrors),
    BadRequest(String),
    ServiceError,
}
