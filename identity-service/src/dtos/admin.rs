use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::models::{AuditEventResponse, Capability, Role, StaffRole};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateAdminUserRequest {
    #[validate(email(message = "Enter a valid email address."))]
    #[schema(example = "ops@example.com")]
    pub email: String,

    pub password: String,

    #[serde(alias = "confirm_password")]
    pub password_confirm: String,

    #[validate(length(min = 1, max = 150, message = "Must be between 1 and 150 characters."))]
    pub first_name: String,

    #[validate(length(min = 1, max = 150, message = "Must be between 1 and 150 characters."))]
    pub last_name: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AssignRoleRequest {
    #[schema(example = "doctor")]
    pub role: String,

    /// Used when the new role is `doctor` and no doctor profile exists yet.
    #[validate(length(max = 50, message = "Ensure this field has no more than 50 characters."))]
    pub license_number: Option<String>,

    #[validate(length(max = 100, message = "Ensure this field has no more than 100 characters."))]
    pub specialty: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignStaffRoleRequest {
    pub staff_role: StaffRole,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CapabilitiesResponse {
    pub user_id: Uuid,
    pub role: Role,
    pub staff_role: Option<StaffRole>,
    pub capabilities: Vec<Capability>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuditEventsQuery {
    /// Only events by this actor.
    pub actor_user_id: Option<Uuid>,
    /// Only events with this action code.
    #[param(example = "login_failed")]
    pub action: Option<String>,
    #[param(example = 50)]
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuditEventListResponse {
    pub events: Vec<AuditEventResponse>,
    pub limit: i64,
    pub offset: i64,
}
