//! Audit event model - append-only security log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Security-relevant actions recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    UserRegistered,
    Login,
    LoginFailed,
    Logout,
    EmailVerified,
    VerificationResent,
    PasswordResetRequested,
    PasswordResetCompleted,
    PasswordChanged,
    AccountDeleted,
    SessionTerminated,
    TokenRefreshed,
    TokenRevoked,
    RoleAssigned,
    StaffRoleAssigned,
    StaffRoleRemoved,
    AdminUserCreated,
    PatientProfileUpdated,
    DoctorProfileUpdated,
    PrimaryPhoneChanged,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::UserRegistered => "user_registered",
            AuditAction::Login => "login",
            AuditAction::LoginFailed => "login_failed",
            AuditAction::Logout => "logout",
            AuditAction::EmailVerified => "email_verified",
            AuditAction::VerificationResent => "verification_resent",
            AuditAction::PasswordResetRequested => "password_reset_requested",
            AuditAction::PasswordResetCompleted => "password_reset_completed",
            AuditAction::PasswordChanged => "password_changed",
            AuditAction::AccountDeleted => "account_deleted",
            AuditAction::SessionTerminated => "session_terminated",
            AuditAction::TokenRefreshed => "token_refreshed",
            AuditAction::TokenRevoked => "token_revoked",
            AuditAction::RoleAssigned => "role_assigned",
            AuditAction::StaffRoleAssigned => "staff_role_assigned",
            AuditAction::StaffRoleRemoved => "staff_role_removed",
            AuditAction::AdminUserCreated => "admin_user_created",
            AuditAction::PatientProfileUpdated => "patient_profile_updated",
            AuditAction::DoctorProfileUpdated => "doctor_profile_updated",
            AuditAction::PrimaryPhoneChanged => "primary_phone_changed",
        }
    }
}

/// Audit event entity. Never updated or deleted once written.
#[derive(Debug, Clone, FromRow)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub actor_user_id: Option<Uuid>,
    pub action_code: String,
    pub detail: serde_json::Value,
    pub created_utc: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(actor_user_id: Option<Uuid>, action: AuditAction, detail: serde_json::Value) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            actor_user_id,
            action_code: action.as_str().to_string(),
            detail,
            created_utc: Utc::now(),
        }
    }
}

/// Audit event response for API.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuditEventResponse {
    pub event_id: Uuid,
    pub actor_user_id: Option<Uuid>,
    #[schema(example = "login_failed")]
    pub action: String,
    #[schema(value_type = Object)]
    pub detail: serde_json::Value,
    pub created_utc: DateTime<Utc>,
}

impl From<AuditEvent> for AuditEventResponse {
    fn from(e: AuditEvent) -> Self {
        Self {
            event_id: e.event_id,
            actor_user_id: e.actor_user_id,
            action: e.action_code,
            detail: e.detail,
            created_utc: e.created_utc,
        }
    }
}
