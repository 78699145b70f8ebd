use service_core::axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::{
    dtos::{EmailRequest, ErrorResponse, MessageResponse, RegisterRequest, RegisterResponse},
    services::ServiceError,
    utils::JsonBody,
    AppState,
};

/// Register a new patient or doctor
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered, verification email sent", body = RegisterResponse),
        (status = 400, description = "Validation error (including duplicate email)", body = ErrorResponse),
        (status = 429, description = "Too many requests", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn register(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let res = state.auth_service.register(req).await?;
    Ok((StatusCode::CREATED, Json(res)))
}

/// Verify an email address with the token from the verification link
#[utoipa::path(
    get,
    path = "/auth/verify-email/{token}",
    params(
        ("token" = String, Path, description = "Verification token")
    ),
    responses(
        (status = 200, description = "Email verified", body = MessageResponse),
        (status = 400, description = "Token invalid or expired", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn verify_email(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<MessageResponse>, ServiceError> {
    Ok(Json(state.auth_service.verify_email(&token).await?))
}

/// Re-send the verification email
#[utoipa::path(
    post,
    path = "/auth/verify-email/resend",
    request_body = EmailRequest,
    responses(
        (status = 200, description = "Same answer whether or not the account exists", body = MessageResponse),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 429, description = "Too many requests", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn resend_verification(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<EmailRequest>,
) -> Result<Json<MessageResponse>, ServiceError> {
    Ok(Json(state.auth_service.resend_verification(req).await?))
}
