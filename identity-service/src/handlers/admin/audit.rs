use service_core::axum::{
    extract::{Query, State},
    Json,
};

use crate::{
    dtos::{AuditEventListResponse, AuditEventsQuery, ErrorResponse},
    services::ServiceError,
    AppState,
};

/// Audit events, newest first
#[utoipa::path(
    get,
    path = "/admin/audit-events",
    params(AuditEventsQuery),
    responses(
        (status = 200, description = "Page of audit events", body = AuditEventListResponse),
        (status = 403, description = "Missing capability", body = ErrorResponse)
    ),
    tag = "Admin",
    security(("bearer_auth" = []))
)]
pub async fn list_audit_events(
    State(state): State<AppState>,
    Query(query): Query<AuditEventsQuery>,
) -> Result<Json<AuditEventListResponse>, ServiceError> {
    Ok(Json(state.admin_service.list_audit_events(query).await?))
}
