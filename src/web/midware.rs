use std::sync::Arc;

use axum::{
    http::{HeaderMap, Method, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, to_value};
use uuid::Uuid;

use crate::web::{log, Error, REQUEST_ID_HEADER};

/// Turns a `web::Error` stashed in the response extensions into the client facing JSON body
/// and logs the request.
pub async fn response_mapper(
    req_method: Method,
    uri: Uri,
    headers: HeaderMap,
    resp: Response,
) -> Response {
    let uuid = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|id| id.to_str().ok())
        .and_then(|id| Uuid::parse_str(id).ok())
        .unwrap_or_else(Uuid::new_v4);

    let web_error = resp.extensions().get::<Arc<Error>>().map(Arc::as_ref);
    let client_status_and_error = web_error.map(Error::status_code_and_client_error);

    let err_resp = client_status_and_error.as_ref().map(|(status, cl_err)| {
        let client_error = to_value(cl_err).ok();
        let message = client_error.as_ref().and_then(|v| v.get("message"));
        let detail = client_error.as_ref().and_then(|v| v.get("detail"));

        let client_error_body = json!({
            "error": {
                "message": message,
                "data": {
                    "req_id": uuid.to_string(),
                    "detail": detail,
                }
            }
        });

        let mut err_resp = (*status, Json(client_error_body)).into_response();
        // Keep the request id set by the inner layers.
        if let Some(req_id) = resp.headers().get(REQUEST_ID_HEADER) {
            err_resp
                .headers_mut()
                .insert(REQUEST_ID_HEADER, req_id.clone());
        }
        err_resp
    });

    log::log_request(
        uuid,
        &req_method,
        &uri,
        resp.status(),
        web_error,
        client_status_and_error.as_ref(),
    );

    err_resp.unwrap_or(resp)
}
