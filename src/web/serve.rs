use std::time::Duration;

use axum::{
    body::Body,
    http::{HeaderName, Request, Response},
    middleware, Router,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    classify::{ServerErrorsAsFailures, SharedClassifier},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{MakeSpan, OnRequest, OnResponse, TraceLayer},
};
use tracing::Span;

use crate::AppState;

use super::{midware, routes::routes, WebResult, REQUEST_ID_HEADER};

/// Serves the application on `listener` until `shutdown_token` gets cancelled.
/// Requests in flight are allowed to finish.
pub async fn serve(
    listener: TcpListener,
    app_state: AppState,
    shutdown_token: CancellationToken,
) -> WebResult<()> {
    let app = app_router(app_state);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown_token.cancelled().await })
        .await?;

    Ok(())
}

/// All the routes wrapped in the request id, tracing and response mapping layers.
pub fn app_router(app_state: AppState) -> Router {
    let x_request_id: HeaderName = HeaderName::from_static(REQUEST_ID_HEADER);

    let trace_layer = build_trace_layer();

    Router::new().merge(routes(app_state)).layer(
        ServiceBuilder::new()
            // Clients may send their own id, otherwise a fresh UUID is generated.
            .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
            .layer(trace_layer)
            // The response passes the layers bottom up: the mapper must run after the
            // propagation layer has copied the request id onto the response.
            .layer(middleware::map_response(midware::response_mapper))
            // Innermost, so the id is on the response before the mapper sees it.
            .layer(PropagateRequestIdLayer::new(x_request_id)),
    )
}

/// Builds the `tower_http::TraceLayer`: one span per request, tagged with its request id.
fn build_trace_layer() -> TraceLayer<
    SharedClassifier<ServerErrorsAsFailures>,
    impl MakeSpan<Body> + Clone,
    impl OnRequest<Body> + Clone,
    impl OnResponse<Body> + Clone,
> {
    TraceLayer::new_for_http()
        .make_span_with(|req: &Request<Body>| {
            let req_id = req
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|val| val.to_str().ok())
                .unwrap_or_default()
                .to_string();

            tracing::error_span!(
                "http_request",
                req_id = %req_id,
                method = %req.method(),
                path = req.uri().path()
            )
        })
        .on_request(|_req: &Request<Body>, _s: &Span| tracing::debug!("request started"))
        .on_response(|res: &Response<Body>, latency: Duration, _s: &Span| {
            let status = res.status();

            if status.is_server_error() {
                tracing::error!(?latency, %status, "request failed")
            } else {
                tracing::info!(?latency, %status, "request finished")
            }
        })
}
