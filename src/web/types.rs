//! The structs received by the `web` module and their validation.
//! Includes the raw request body, the validated subscriber, the field-level error report and tests for those.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use strum_macros::AsRefStr;
use unicode_segmentation::UnicodeSegmentation;
use validator::ValidateEmail;

// ###################################
// ->   STRUCTS
// ###################################
/// Deserializable Subscriber
/// The raw body of a subscriber creation request. Every field may be missing or invalid.
/// Fields other than `email` and `status` are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct DeserSubscriber {
    #[serde(default, deserialize_with = "lenient_string")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: Option<String>,
}

impl DeserSubscriber {
    pub fn new(email: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            status: Some(status.into()),
        }
    }

    /// Validates both fields, collecting every failure instead of stopping at the first one.
    pub fn validate(self) -> (Option<ValidEmail>, Option<SubscriberStatus>, FieldErrors) {
        let mut errors = FieldErrors::default();

        let email = required(self.email, DataParsingError::EmailMissing)
            .and_then(ValidEmail::parse)
            .map_err(|er| errors.push(er))
            .ok();
        let status = required(self.status, DataParsingError::StatusMissing)
            .and_then(SubscriberStatus::parse)
            .map_err(|er| errors.push(er))
            .ok();

        (email, status, errors)
    }
}

/// Validated Subscriber
/// A Subscriber with all the fields validated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidSubscriber {
    pub email: ValidEmail,
    pub status: SubscriberStatus,
}

/// Validated only on its own: it says nothing about whether the email is already taken.
impl TryFrom<DeserSubscriber> for ValidSubscriber {
    type Error = FieldErrors;

    fn try_from(deser_sub: DeserSubscriber) -> Result<Self, Self::Error> {
        match deser_sub.validate() {
            (Some(email), Some(status), errors) if errors.is_empty() => {
                Ok(ValidSubscriber { email, status })
            }
            (_, _, errors) => Err(errors),
        }
    }
}

/// Validated Subscriber Email
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ValidEmail(String);

impl AsRef<str> for ValidEmail {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl ValidEmail {
    pub fn parse<S>(value: S) -> Result<Self, DataParsingError>
    where
        S: AsRef<str>,
    {
        let value = value.as_ref();

        if value.graphemes(true).count() > 256 {
            return Err(DataParsingError::EmailTooLong);
        }

        if value.validate_email() {
            Ok(ValidEmail(value.to_owned()))
        } else {
            Err(DataParsingError::EmailInvalid)
        }
    }
}

impl TryFrom<String> for ValidEmail {
    type Error = DataParsingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ValidEmail> for String {
    fn from(value: ValidEmail) -> Self {
        value.0
    }
}

/// Subscription status of a subscriber, stored as lowercase text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SubscriberStatus {
    Subscribed,
    Unsubscribed,
}

impl SubscriberStatus {
    /// Case sensitive: only the exact lowercase literals are accepted.
    pub fn parse<S>(value: S) -> Result<Self, DataParsingError>
    where
        S: AsRef<str>,
    {
        match value.as_ref() {
            "subscribed" => Ok(Self::Subscribed),
            "unsubscribed" => Ok(Self::Unsubscribed),
            other => Err(DataParsingError::StatusInvalid(other.to_string())),
        }
    }
}

/// Field name -> list of messages describing why the field was rejected.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct FieldErrors(BTreeMap<&'static str, Vec<String>>);

impl FieldErrors {
    pub fn push(&mut self, error: DataParsingError) {
        self.0
            .entry(error.field())
            .or_default()
            .push(error.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.0.keys().copied()
    }
}

impl From<DataParsingError> for FieldErrors {
    fn from(value: DataParsingError) -> Self {
        let mut errors = Self::default();
        errors.push(value);
        errors
    }
}

impl core::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let fields = self.fields().collect::<Vec<_>>().join(", ");
        write!(f, "invalid fields: [{fields}]")
    }
}

// ###################################
// ->   HELPERS
// ###################################
/// Trims the value. A missing, `null` or blank value counts as missing.
fn required(value: Option<String>, missing: DataParsingError) -> Result<String, DataParsingError> {
    match value.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value.to_owned()),
        _ => Err(missing),
    }
}

/// Accepts any JSON value: strings pass through, `null` becomes `None` and anything else
/// is kept in its JSON text form so that it fails validation with a useful message.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

// ###################################
// ->   ERROR
// ###################################
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataParsingError {
    #[error("The email field is required.")]
    EmailMissing,
    #[error("The email field must be a valid email address.")]
    EmailInvalid,
    #[error("The email field must not be longer than 256 characters.")]
    EmailTooLong,
    #[error("The email has already been taken.")]
    EmailTaken,

    #[error("The status field is required.")]
    StatusMissing,
    #[error("The selected status is invalid: '{0}'. Expected 'subscribed' or 'unsubscribed'.")]
    StatusInvalid(String),
}

impl DataParsingError {
    /// The request field this error belongs to.
    pub fn field(&self) -> &'static str {
        use DataParsingError::*;

        match self {
            EmailMissing | EmailInvalid | EmailTooLong | EmailTaken => "email",
            StatusMissing | StatusInvalid(_) => "status",
        }
    }
}
