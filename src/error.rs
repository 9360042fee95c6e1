use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::dao::storage::StorageError;

/// Failures surfaced by the quiz, leaderboard and job services.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The store rejected or failed the call.
    #[error("storage error: {0}")]
    Unavailable(#[source] StorageError),
    /// No store is installed; the supervisor is reconnecting.
    #[error("running without storage")]
    Degraded,
    /// The call did not finish within the storage timeout, queueing included.
    #[error("storage call timed out")]
    Timeout,
    /// The storage pool has been closed.
    #[error("shutting down")]
    ShuttingDown,
    /// Caller lacks the admin token.
    #[error("{0}")]
    Unauthorized(String),
    /// Caller input that no retry can fix.
    #[error("{0}")]
    InvalidInput(String),
    /// No such question, user, job or closed period.
    #[error("{0}")]
    NotFound(String),
}

impl ServiceError {
    /// Transient storage trouble; the same call may succeed later.
    pub fn is_storage_unavailable(&self) -> bool {
        match self {
            ServiceError::Degraded | ServiceError::Timeout => true,
            ServiceError::Unavailable(err) => err.is_unavailable(),
            _ => false,
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

/// Errors returned by handlers, rendered as `{"message": ...}`.
#[derive(Debug, Error)]
pub enum AppError {
    /// Rejected input; 400.
    #[error("{0}")]
    BadRequest(String),
    /// Missing or wrong admin token; 401.
    #[error("{0}")]
    Unauthorized(String),
    /// 404.
    #[error("{0}")]
    NotFound(String),
    /// Clashes with stored state; 409.
    #[error("{0}")]
    Conflict(String),
    /// Storage trouble the client should retry.
    #[error("{0}")]
    ServiceUnavailable(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        AppError::BadRequest(format!("invalid request: {errors}"))
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let retry = |what: String| AppError::ServiceUnavailable(format!("{what}; try again"));
        match err {
            ServiceError::Unavailable(StorageError::AlreadyExists { what }) => {
                AppError::Conflict(format!("{what} already exists"))
            }
            ServiceError::Unavailable(source) => retry(source.to_string()),
            ServiceError::Degraded | ServiceError::Timeout => retry(err.to_string()),
            ServiceError::ShuttingDown => AppError::ServiceUnavailable(err.to_string()),
            ServiceError::Unauthorized(message) => AppError::Unauthorized(message),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
        }
    }
}

#[derive(Serialize)]
struct Message {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(Message { message: self.to_string() })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_trouble_asks_the_client_to_retry() {
        for err in [ServiceError::Timeout, ServiceError::Degraded] {
            let app: AppError = err.into();
            assert!(app.to_string().ends_with("try again"));
            assert_eq!(app.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
        }
    }

    #[test]
    fn duplicate_close_is_a_conflict() {
        let err = ServiceError::from(StorageError::AlreadyExists {
            what: "weekly ceremony".into(),
        });
        assert!(!err.is_storage_unavailable());

        let app: AppError = err.into();
        assert_eq!(app.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn client_errors_keep_their_status() {
        let err: AppError = ServiceError::NotFound("question 9 does not exist".into()).into();
        assert_eq!(err.to_string(), "question 9 does not exist");
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);

        let err: AppError = ServiceError::InvalidInput("bad option".into()).into();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
