use service_core::axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::{
    dtos::{AssignRoleRequest, CreateAdminUserRequest, ErrorResponse},
    middleware::AuthContext,
    models::UserResponse,
    services::ServiceError,
    utils::JsonBody,
    AppState,
};

/// Create a verified admin account
#[utoipa::path(
    post,
    path = "/admin/users",
    request_body = CreateAdminUserRequest,
    responses(
        (status = 201, description = "Admin user created", body = UserResponse),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 403, description = "Caller is not a superuser", body = ErrorResponse)
    ),
    tag = "Admin",
    security(("bearer_auth" = []))
)]
pub async fn create_admin_user(
    State(state): State<AppState>,
    ctx: AuthContext,
    JsonBody(req): JsonBody<CreateAdminUserRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let user = state
        .admin_service
        .create_admin_user(&ctx.user, req)
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// Change a user's primary role
#[utoipa::path(
    put,
    path = "/admin/users/{user_id}/role",
    params(
        ("user_id" = Uuid, Path, description = "Target user ID")
    ),
    request_body = AssignRoleRequest,
    responses(
        (status = 200, description = "Role assigned", body = UserResponse),
        (status = 400, description = "Invalid role", body = ErrorResponse),
        (status = 403, description = "Missing capability", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    tag = "Admin",
    security(("bearer_auth" = []))
)]
pub async fn assign_role(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(user_id): Path<Uuid>,
    JsonBody(req): JsonBody<AssignRoleRequest>,
) -> Result<Json<UserResponse>, ServiceError> {
    Ok(Json(
        state
            .admin_service
            .assign_role(&ctx.user, user_id, req)
            .await?,
    ))
}
