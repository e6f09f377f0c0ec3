use axum::{
    extract::{FromRequest, Request},
    http::header::CONTENT_TYPE,
    Form, Json,
};

use super::{types::DeserSubscriber, Error};

/// Extracts a `DeserSubscriber` from either a form-encoded or a JSON body,
/// depending on the `Content-Type` header.
#[derive(Debug)]
pub struct SubscriberPayload(pub DeserSubscriber);

impl<S> FromRequest<S> for SubscriberPayload
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));

        if is_form {
            let Form(payload) = Form::<DeserSubscriber>::from_request(req, state)
                .await
                .map_err(|rej| Error::BodyRejected {
                    status: rej.status(),
                    message: rej.body_text(),
                })?;
            Ok(Self(payload))
        } else {
            let Json(payload) = Json::<DeserSubscriber>::from_request(req, state)
                .await
                .map_err(|rej| Error::BodyRejected {
                    status: rej.status(),
                    message: rej.body_text(),
                })?;
            Ok(Self(payload))
        }
    }
}
