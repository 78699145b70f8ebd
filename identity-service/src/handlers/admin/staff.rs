use service_core::axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::{
    dtos::{AssignStaffRoleRequest, CapabilitiesResponse, ErrorResponse, MessageResponse},
    middleware::AuthContext,
    models::StaffProfile,
    services::ServiceError,
    utils::JsonBody,
    AppState,
};

/// Set or replace a user's staff sub-role
#[utoipa::path(
    put,
    path = "/admin/users/{user_id}/staff-role",
    params(
        ("user_id" = Uuid, Path, description = "Target user ID")
    ),
    request_body = AssignStaffRoleRequest,
    responses(
        (status = 200, description = "Staff role assigned", body = StaffProfile),
        (status = 403, description = "Missing capability", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    tag = "Admin",
    security(("bearer_auth" = []))
)]
pub async fn assign_staff_role(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(user_id): Path<Uuid>,
    JsonBody(req): JsonBody<AssignStaffRoleRequest>,
) -> Result<Json<StaffProfile>, ServiceError> {
    Ok(Json(
        state
            .profile_registry
            .assign_staff_role(&ctx.user, user_id, req.staff_role)
            .await?,
    ))
}

#[utoipa::path(
    delete,
    path = "/admin/users/{user_id}/staff-role",
    params(
        ("user_id" = Uuid, Path, description = "Target user ID")
    ),
    responses(
        (status = 200, description = "Staff role removed", body = MessageResponse),
        (status = 404, description = "User has no staff role", body = ErrorResponse)
    ),
    tag = "Admin",
    security(("bearer_auth" = []))
)]
pub async fn remove_staff_role(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(user_id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ServiceError> {
    state
        .profile_registry
        .remove_staff_role(&ctx.user, user_id)
        .await?;
    Ok(Json(MessageResponse::new("Staff role removed.")))
}

/// Effective capabilities of any user
#[utoipa::path(
    get,
    path = "/admin/users/{user_id}/capabilities",
    params(
        ("user_id" = Uuid, Path, description = "Target user ID")
    ),
    responses(
        (status = 200, description = "Capabilities", body = CapabilitiesResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    tag = "Admin",
    security(("bearer_auth" = []))
)]
pub async fn get_capabilities(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<CapabilitiesResponse>, ServiceError> {
    Ok(Json(state.admin_service.user_capabilities(user_id).await?))
}
