use serde::{Deserialize, Serialize};

use crate::web::types::{SubscriberStatus, ValidEmail, ValidSubscriber};

/// A unit of deferred work: "insert this subscriber".
/// Carries exactly the validated fields of the request, never the raw body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberCreationTask {
    pub email: ValidEmail,
    pub status: SubscriberStatus,
}

impl From<ValidSubscriber> for SubscriberCreationTask {
    fn from(value: ValidSubscriber) -> Self {
        Self {
            email: value.email,
            status: value.status,
        }
    }
}
