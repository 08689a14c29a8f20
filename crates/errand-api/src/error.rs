//! API error type. Every handler returns `Result<_, ApiError>`; the body is
//! always `{"error": "..."}` and storage details never reach the client.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{debug, error};

use errand_db::StoreError;
use errand_token::TokenError;
use errand_types::api::ErrorBody;
use errand_types::pricing::PricingError;
use errand_types::week::WeekKeyError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// No credential, or a failed login.
    #[error("{0}")]
    Unauthenticated(&'static str),

    /// A credential was supplied but did not verify.
    #[error("invalid token: {0}")]
    InvalidToken(#[from] TokenError),

    /// Authenticated, but the role or participation check failed.
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("storage failure: {0}")]
    Storage(#[source] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated(_) | Self::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            Self::Unauthorized(_) => StatusCode::FORBIDDEN,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Storage(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::NotFound(format!("{what} not found")),
            StoreError::Conflict(msg) => Self::Conflict(msg),
            StoreError::Invalid(msg) => Self::Validation(msg),
            StoreError::Forbidden(msg) => Self::Unauthorized(msg),
            other => Self::Storage(other),
        }
    }
}

impl From<PricingError> for ApiError {
    fn from(err: PricingError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<WeekKeyError> for ApiError {
    fn from(err: WeekKeyError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = match &self {
            Self::Storage(_) | Self::Internal(_) => {
                error!(error = %self, "Request failed");
                "Internal server error".to_string()
            }
            Self::InvalidToken(reason) => {
                debug!(%reason, "Rejected bearer token");
                "Invalid token".to_string()
            }
            _ => self.to_string(),
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_to_statuses() {
        let cases = [
            (StoreError::NotFound("errand"), StatusCode::NOT_FOUND),
            (StoreError::conflict("taken"), StatusCode::CONFLICT),
            (StoreError::invalid("bad"), StatusCode::BAD_REQUEST),
            (StoreError::Forbidden("no".into()), StatusCode::FORBIDDEN),
            (StoreError::LockPoisoned, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (store, expected) in cases {
            assert_eq!(ApiError::from(store).status(), expected);
        }
    }

    #[test]
    fn test_not_found_message_names_the_entity() {
        let err = ApiError::from(StoreError::NotFound("channel"));
        assert_eq!(err.to_string(), "channel not found");
    }

    #[test]
    fn test_token_errors_are_401() {
        assert_eq!(ApiError::from(TokenError::Expired).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Unauthenticated("x").status(), StatusCode::UNAUTHORIZED);
    }
}
