use crate::{orchestrator, store, types::InvalidConfig};
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

#[derive(Serialize)]
struct Success<T> {
    code: u16,
    data: T,
}

#[derive(Serialize)]
struct Message<'a> {
    code: u16,
    message: &'a str,
}

/// A `200 OK` reply wrapping `data` in the `{code, data}` envelope.
pub struct Reply<T>(pub T);

impl<T: Serialize> IntoResponse for Reply<T> {
    fn into_response(self) -> Response {
        let body = Success {
            code: StatusCode::OK.as_u16(),
            data: self.0,
        };
        (StatusCode::OK, Json(body)).into_response()
    }
}

/// A failed request, rendered as `{code, message}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub status: StatusCode,
    pub message: String,
}

impl Failure {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "invalid api key")
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
    }
}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        let body = Message {
            code: self.status.as_u16(),
            message: &self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for Failure {
    fn from(rejection: JsonRejection) -> Self {
        Self::unprocessable(rejection.body_text())
    }
}

impl From<InvalidConfig> for Failure {
    fn from(err: InvalidConfig) -> Self {
        Self::unprocessable(err.to_string())
    }
}

impl From<store::Error> for Failure {
    fn from(err: store::Error) -> Self {
        match err {
            store::Error::ValidatorExists(_)
            | store::Error::ValidatorMissing(_)
            | store::Error::PendingBoost(_)
            | store::Error::RecordMissing(_)
            | store::Error::DuplicateRecord(_) => Self::bad_request(err.to_string()),
            store::Error::Io(_) | store::Error::Serde(_) => {
                error!(error = ?err, "store failure");
                Self::internal()
            }
        }
    }
}

impl From<orchestrator::Error> for Failure {
    fn from(err: orchestrator::Error) -> Self {
        match err {
            orchestrator::Error::TickInProgress => Self::new(StatusCode::CONFLICT, err.to_string()),
            err => Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        }
    }
}
