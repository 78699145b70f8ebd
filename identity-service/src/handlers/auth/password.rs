use service_core::axum::{
    extract::{Path, State},
    Json,
};

use crate::{
    dtos::{
        ChangePasswordRequest, DeleteAccountRequest, EmailRequest, ErrorResponse,
        MessageResponse, PasswordResetConfirmRequest,
    },
    middleware::AuthContext,
    services::ServiceError,
    utils::JsonBody,
    AppState,
};

/// Request a password reset email
#[utoipa::path(
    post,
    path = "/auth/password-reset",
    request_body = EmailRequest,
    responses(
        (status = 200, description = "Same answer whether or not the account exists", body = MessageResponse),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 429, description = "Too many requests", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn request_password_reset(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<EmailRequest>,
) -> Result<Json<MessageResponse>, ServiceError> {
    Ok(Json(state.auth_service.request_password_reset(req).await?))
}

/// Set a new password with the token from the reset link
#[utoipa::path(
    post,
    path = "/auth/password-reset/confirm/{token}",
    params(
        ("token" = String, Path, description = "Password reset token")
    ),
    request_body = PasswordResetConfirmRequest,
    responses(
        (status = 200, description = "Password reset, all sessions ended", body = MessageResponse),
        (status = 400, description = "Token invalid or expired, or validation error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Path(token): Path<String>,
    JsonBody(req): JsonBody<PasswordResetConfirmRequest>,
) -> Result<Json<MessageResponse>, ServiceError> {
    Ok(Json(
        state
            .auth_service
            .confirm_password_reset(&token, req)
            .await?,
    ))
}

/// Change the caller's password
#[utoipa::path(
    post,
    path = "/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 401, description = "Wrong current password or not authenticated", body = ErrorResponse)
    ),
    tag = "Account",
    security(("bearer_auth" = []))
)]
pub async fn change_password(
    State(state): State<AppState>,
    ctx: AuthContext,
    JsonBody(req): JsonBody<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, ServiceError> {
    Ok(Json(
        state.auth_service.change_password(&ctx.user, req).await?,
    ))
}

/// Soft-delete the caller's account and end every session
#[utoipa::path(
    post,
    path = "/auth/delete-account",
    request_body = DeleteAccountRequest,
    responses(
        (status = 200, description = "Account deleted", body = MessageResponse),
        (status = 401, description = "Wrong password or not authenticated", body = ErrorResponse)
    ),
    tag = "Account",
    security(("bearer_auth" = []))
)]
pub async fn delete_account(
    State(state): State<AppState>,
    ctx: AuthContext,
    JsonBody(req): JsonBody<DeleteAccountRequest>,
) -> Result<Json<MessageResponse>, ServiceError> {
    Ok(Json(
        state.auth_service.delete_account(&ctx.user, req).await?,
    ))
}
