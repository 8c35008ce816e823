//! Error responses of the storage API.
//!
//! Every failure leaves the API as
//! `{"error": {"code": "QUOTA_EXCEEDED", "message": "..."}}` with the
//! status implied by the code. Validation failures from request DTOs also
//! carry the offending `fields`.

use std::collections::BTreeMap;
use std::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::StashError;

/// Machine-readable failure kind sent to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed request: bad multipart, oversized upload, bad address.
    BadRequest,
    /// A storage limit would be crossed.
    QuotaExceeded,
    /// The tree refuses the operation, such as moving a directory into itself.
    InvalidOperation,
    /// Missing or invalid token.
    Unauthorized,
    /// Access level too low for the operation.
    Forbidden,
    /// Storage or entity does not exist.
    NotFound,
    /// A name, size or request field failed validation.
    ValidationFailed,
    /// Anything the client cannot act on. Details only go to the log.
    Internal,
}

impl ErrorCode {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorCode::BadRequest | ErrorCode::QuotaExceeded | ErrorCode::InvalidOperation => {
                StatusCode::BAD_REQUEST
            }
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::ValidationFailed => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error returned by handlers and middleware.
#[derive(Debug)]
pub struct ApiError {
    code: ErrorCode,
    message: String,
    fields: Option<BTreeMap<String, Vec<String>>>,
}

#[derive(Serialize)]
struct Envelope<'a> {
    error: Payload<'a>,
}

#[derive(Serialize)]
struct Payload<'a> {
    code: ErrorCode,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<&'a BTreeMap<String, Vec<String>>>,
}

impl ApiError {
    fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            fields: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    /// The message is fixed so nothing internal reaches the client; log
    /// the cause before calling this.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    /// Collect `validator` failures per field, in field order.
    pub fn from_validation_errors(errors: validator::ValidationErrors) -> Self {
        let fields = errors
            .field_errors()
            .into_iter()
            .map(|(field, failures)| {
                let messages = failures
                    .iter()
                    .map(|failure| match &failure.message {
                        Some(message) => message.to_string(),
                        None => format!("invalid {}", field),
                    })
                    .collect();
                (field.to_string(), messages)
            })
            .collect();

        Self {
            code: ErrorCode::ValidationFailed,
            message: "request validation failed".to_string(),
            fields: Some(fields),
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<StashError> for ApiError {
    fn from(err: StashError) -> Self {
        let code = match &err {
            StashError::NotFound(_) => ErrorCode::NotFound,
            StashError::QuotaExceeded(_) => ErrorCode::QuotaExceeded,
            StashError::InvalidOperation(_) => ErrorCode::InvalidOperation,
            StashError::Auth(_) => ErrorCode::Unauthorized,
            StashError::Permission(_) => ErrorCode::Forbidden,
            StashError::Validation(msg) => return Self::new(ErrorCode::ValidationFailed, msg.clone()),
            _ => {
                error!(error = %err, "request failed");
                return Self::internal("an internal error occurred");
            }
        };
        Self::new(code, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Envelope {
            error: Payload {
                code: self.code,
                message: &self.message,
                fields: self.fields.as_ref(),
            },
        };
        (self.code.status(), Json(body)).into_response()
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}
