use service_core::axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use service_core::error::{AppError, ErrorBody};
use thiserror::Error;

use super::store::StoreError;
use crate::utils::FieldErrors;

/// Domain error taxonomy. Each variant maps to one stable `error` kind.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Validation failed: {0}")]
    Validation(FieldErrors),

    #[error("Invalid email or password.")]
    InvalidCredentials,

    #[error("This account is disabled.")]
    AccountDisabled,

    #[error("Email address has not been verified.")]
    EmailUnverified,

    #[error("Invalid or already used token.")]
    TokenInvalid,

    #[error("Token has expired.")]
    TokenExpired,

    #[error("Authentication required: {0}")]
    Unauthorized(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        ServiceError::Validation(FieldErrors::single(field, message))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "validation_error",
            ServiceError::InvalidCredentials => "invalid_credentials",
            ServiceError::AccountDisabled => "account_disabled",
            ServiceError::EmailUnverified => "email_unverified",
            ServiceError::TokenInvalid => "token_invalid",
            ServiceError::TokenExpired => "token_expired",
            ServiceError::Unauthorized(_) => "unauthorized",
            ServiceError::Conflict(_) => "conflict",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::Forbidden(_) => "forbidden",
            ServiceError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_)
            | ServiceError::TokenInvalid
            | ServiceError::TokenExpired => StatusCode::BAD_REQUEST,
            ServiceError::InvalidCredentials | ServiceError::Unauthorized(_) => {
                StatusCode::UNAUTHORIZED
            }
            ServiceError::AccountDisabled
            | ServiceError::EmailUnverified
            | ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ServiceError::NotFound("Not found.".to_string()),
            StoreError::UniqueViolation { constraint } => {
                ServiceError::Conflict(format!("Duplicate value violates {}", constraint))
            }
            StoreError::Backend(e) => ServiceError::Internal(e),
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Internal(e) => AppError::InternalError(e),
            ServiceError::NotFound(m) => AppError::NotFound(anyhow::anyhow!(m)),
            ServiceError::Conflict(m) => AppError::Conflict(anyhow::anyhow!(m)),
            ServiceError::Forbidden(m) => AppError::Forbidden(anyhow::anyhow!(m)),
            ServiceError::Unauthorized(m) => AppError::Unauthorized(anyhow::anyhow!(m)),
            ServiceError::InvalidCredentials => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid email or password."))
            }
            other => AppError::BadRequest(anyhow::anyhow!(other.to_string())),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ServiceError::Validation(fields) => {
                ErrorBody::new("validation_error", "Validation failed.")
                    .with_fields(fields.into_map())
            }
            ServiceError::Internal(ref e) => {
                tracing::error!(error = %e, "Internal error");
                ErrorBody::new(self.kind(), "Internal server error")
            }
            ref other => ErrorBody::new(other.kind(), other.to_string()),
        };
        body.into_response_with(status)
    }
}
