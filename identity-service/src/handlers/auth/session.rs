use service_core::axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::{
    dtos::{ErrorResponse, LoginRequest, LoginResponse, MessageResponse, RefreshRequest, TokenResponse},
    middleware::AuthContext,
    models::SessionInfo,
    services::{ClientInfo, ServiceError},
    utils::JsonBody,
    AppState,
};

/// Login with email and password
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 403, description = "Account disabled or email not verified", body = ErrorResponse),
        (status = 429, description = "Too many requests", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<AppState>,
    client: ClientInfo,
    JsonBody(req): JsonBody<LoginRequest>,
) -> Result<Json<LoginResponse>, ServiceError> {
    Ok(Json(state.auth_service.login(req, client).await?))
}

/// End the current session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(("bearer_auth" = []))
)]
pub async fn logout(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> Result<Json<MessageResponse>, ServiceError> {
    Ok(Json(
        state.auth_service.logout(&ctx.user, ctx.session_id).await?,
    ))
}

/// Exchange a refresh token for a new token pair
#[utoipa::path(
    post,
    path = "/auth/token/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Tokens refreshed", body = TokenResponse),
        (status = 400, description = "Token invalid or expired", body = ErrorResponse),
        (status = 403, description = "Account disabled", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn refresh(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RefreshRequest>,
) -> Result<Json<TokenResponse>, ServiceError> {
    Ok(Json(state.auth_service.refresh(req).await?))
}

/// Revoke the session a refresh token belongs to
#[utoipa::path(
    post,
    path = "/auth/token/revoke",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Token revoked", body = MessageResponse),
        (status = 400, description = "Token invalid or already revoked", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn revoke(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RefreshRequest>,
) -> Result<Json<MessageResponse>, ServiceError> {
    Ok(Json(state.auth_service.revoke(req).await?))
}

/// List the caller's live sessions
#[utoipa::path(
    get,
    path = "/auth/sessions",
    responses(
        (status = 200, description = "Live sessions, newest first", body = [SessionInfo]),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    ),
    tag = "Sessions",
    security(("bearer_auth" = []))
)]
pub async fn list_sessions(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> Result<Json<Vec<SessionInfo>>, ServiceError> {
    let sessions = state
        .auth_service
        .sessions()
        .list(ctx.user.user_id, Some(ctx.session_id))
        .await?;
    Ok(Json(sessions))
}

/// Terminate one of the caller's sessions
#[utoipa::path(
    delete,
    path = "/auth/sessions/{session_id}",
    params(
        ("session_id" = Uuid, Path, description = "Session to terminate")
    ),
    responses(
        (status = 200, description = "Session terminated", body = MessageResponse),
        (status = 403, description = "Session belongs to another user", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    tag = "Sessions",
    security(("bearer_auth" = []))
)]
pub async fn terminate_session(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(session_id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ServiceError> {
    Ok(Json(
        state
            .auth_service
            .terminate_session(&ctx.user, session_id)
            .await?,
    ))
}
