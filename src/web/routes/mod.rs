//! Contains all the routes that this application can handle.

mod subscribers;

use axum::{
    http::StatusCode,
    routing::{get, post},
    Router,
};

use crate::AppState;

pub use subscribers::{create_subscriber, SubscribeResponse, SUBSCRIBE_ACCEPTED_MSG};

async fn health_check() -> StatusCode {
    StatusCode::OK
}

/// All the routes of the server
pub fn routes(app_state: AppState) -> Router {
    Router::new()
        .route("/subscribers", post(create_subscriber))
        .with_state(app_state)
        .route("/health-check", get(health_check))
}
