use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use social_types::Error;

use crate::registration::RegistrationError;

/// Transport-level error: a status code plus a short public message.
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

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized")
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::NotFound => StatusCode::NOT_FOUND,
        Error::DuplicateName | Error::DuplicateEmail => StatusCode::CONFLICT,
        Error::TokenInvalidOrExpired => StatusCode::BAD_REQUEST,
        Error::VersionConflict => StatusCode::CONFLICT,
        Error::Forbidden => StatusCode::FORBIDDEN,
        Error::RoleNotFound => StatusCode::INTERNAL_SERVER_ERROR,
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::StorageUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        Error::Storage => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self::new(status_for(&err), err.to_string())
    }
}

impl From<RegistrationError> for ApiError {
    fn from(err: RegistrationError) -> Self {
        match err {
            RegistrationError::Store(e) => e.into(),
            RegistrationError::Delivery { .. } | RegistrationError::Undelivered(_) => {
                Self::new(StatusCode::BAD_GATEWAY, err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_status_codes() {
        assert_eq!(status_for(&Error::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&Error::DuplicateEmail), StatusCode::CONFLICT);
        assert_eq!(status_for(&Error::VersionConflict), StatusCode::CONFLICT);
        assert_eq!(status_for(&Error::TokenInvalidOrExpired), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&Error::StorageUnavailable), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_for(&Error::Forbidden), StatusCode::FORBIDDEN);
    }
}
