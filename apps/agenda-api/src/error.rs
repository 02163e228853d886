use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use core_lib::CoreError;
use serde::Serialize;
use tracing::{error, warn};

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthenticated() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthenticated")
    }

    pub fn forbidden() -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden")
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, format!("{} not found", what.into()))
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(msg) | CoreError::InvalidOperation(msg) => {
                ApiError::bad_request(msg)
            }
            CoreError::Unauthenticated(msg) => {
                warn!("rejected credentials: {}", msg);
                ApiError::unauthenticated()
            }
            CoreError::Unauthorized(msg) => ApiError::new(StatusCode::FORBIDDEN, msg),
            CoreError::NotFound(what) => ApiError::not_found(what),
            CoreError::AlreadyExists(msg) => ApiError::new(StatusCode::CONFLICT, msg),
            CoreError::Concurrency(msg) => {
                warn!("giving up after repeated conflicts: {}", msg);
                ApiError::new(StatusCode::CONFLICT, "conflicting update, try again")
            }
            other => {
                error!("request failed: {:?}", other);
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_core_errors_to_statuses() {
        let cases = [
            (CoreError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (CoreError::InvalidOperation("x".into()), StatusCode::BAD_REQUEST),
            (CoreError::Unauthenticated("x".into()), StatusCode::UNAUTHORIZED),
            (CoreError::Unauthorized("x".into()), StatusCode::FORBIDDEN),
            (CoreError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (CoreError::AlreadyExists("x".into()), StatusCode::CONFLICT),
            (CoreError::Concurrency("x".into()), StatusCode::CONFLICT),
            (CoreError::Decryption("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (CoreError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let err = ApiError::from(CoreError::Configuration("postgres password wrong".into()));
        assert_eq!(err.message, "internal server error");
    }
}
