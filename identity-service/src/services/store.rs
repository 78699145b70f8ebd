//! Storage seam for the identity core.
//!
//! Every method is one atomic unit of work. The races that matter (duplicate
//! email, token single-use, primary-phone exclusivity) are closed inside the
//! implementations with unique constraints, row locks and compare-and-set
//! updates, never by the callers checking first and writing afterwards.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    AuditEvent, DoctorProfile, PatientProfile, PhoneNumber, RefreshSession, Role, RoleProfile,
    StaffProfile, StaffRole, TokenEffect, TokenKind, User, VerificationToken,
};

/// Unique constraint on `users.email`.
pub const EMAIL_UNIQUE: &str = "users_email_key";
/// Unique constraint on `doctor_profiles.license_number`.
pub const LICENSE_UNIQUE: &str = "doctor_profiles_license_number_key";
/// A profile of the same kind already exists for the user.
pub const PROFILE_EXISTS: &str = "profile_exists";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    #[error("Record not found")]
    NotFound,

    #[error("Storage backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    pub fn unique(constraint: &str) -> Self {
        StoreError::UniqueViolation {
            constraint: constraint.to_string(),
        }
    }

    pub fn is_unique_violation_of(&self, name: &str) -> bool {
        matches!(self, StoreError::UniqueViolation { constraint } if constraint == name)
    }
}

/// Result of an atomic token consumption.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsumeOutcome {
    /// Effect applied and token deleted. `revoked_sessions` lists grants
    /// ended as part of the effect.
    Consumed {
        user_id: Uuid,
        revoked_sessions: Vec<Uuid>,
    },
    /// Unknown value, wrong kind, or already consumed.
    Invalid,
    /// `now >= expiry`; nothing was changed.
    Expired,
}

#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub actor_user_id: Option<Uuid>,
    pub action_code: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn health_check(&self) -> Result<(), StoreError>;

    // ==================== Users ====================

    /// Insert a user together with its role profile. Fails with
    /// `UniqueViolation(EMAIL_UNIQUE)` when the email is taken.
    async fn create_account(
        &self,
        user: &User,
        profile: Option<&RoleProfile>,
    ) -> Result<(), StoreError>;

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError>;

    /// Lookup by normalized email.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn update_password_hash(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), StoreError>;

    /// Mark inactive + deleted and revoke every live session. Returns the
    /// revoked session ids.
    async fn soft_delete_user(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, StoreError>;

    /// Change the role and create `profile` if none of that kind exists yet.
    async fn assign_role(
        &self,
        user_id: Uuid,
        role: Role,
        profile: Option<&RoleProfile>,
    ) -> Result<User, StoreError>;

    // ==================== Role profiles ====================

    /// Fails with `UniqueViolation(PROFILE_EXISTS)` if the user already has
    /// a profile of that kind.
    async fn insert_profile(&self, profile: &RoleProfile) -> Result<(), StoreError>;

    async fn find_patient_profile(
        &self,
        user_id: Uuid,
    ) -> Result<Option<PatientProfile>, StoreError>;

    async fn find_doctor_profile(&self, user_id: Uuid)
        -> Result<Option<DoctorProfile>, StoreError>;

    async fn find_staff_profile(&self, user_id: Uuid) -> Result<Option<StaffProfile>, StoreError>;

    async fn update_patient_profile(&self, profile: &PatientProfile) -> Result<(), StoreError>;

    async fn update_doctor_profile(&self, profile: &DoctorProfile) -> Result<(), StoreError>;

    /// Create or replace the staff profile and set `is_staff` in one step.
    async fn upsert_staff_profile(
        &self,
        user_id: Uuid,
        staff_role: StaffRole,
    ) -> Result<StaffProfile, StoreError>;

    /// Delete the staff profile and clear `is_staff` (admins keep it) in one
    /// step. Returns false when there was no staff profile.
    async fn delete_staff_profile(&self, user_id: Uuid) -> Result<bool, StoreError>;

    // ==================== Phone numbers ====================

    /// Insert a phone. It becomes primary, clearing any other primary, when
    /// flagged so or when it is the user's first phone.
    async fn insert_phone(&self, phone: &PhoneNumber) -> Result<PhoneNumber, StoreError>;

    async fn list_phones(&self, user_id: Uuid) -> Result<Vec<PhoneNumber>, StoreError>;

    /// Clear the user's primary and set `phone_id` as primary atomically.
    async fn set_primary_phone(
        &self,
        user_id: Uuid,
        phone_id: Uuid,
    ) -> Result<PhoneNumber, StoreError>;

    async fn delete_phone(&self, user_id: Uuid, phone_id: Uuid) -> Result<bool, StoreError>;

    // ==================== Tokens ====================

    /// Delete the user's outstanding tokens of the same kind and insert
    /// `token`.
    async fn replace_token(&self, token: &VerificationToken) -> Result<(), StoreError>;

    async fn find_token(
        &self,
        token_hash: &str,
        kind: TokenKind,
    ) -> Result<Option<VerificationToken>, StoreError>;

    /// Read, check expiry, apply `effect` and delete the token as one unit.
    async fn consume_token(
        &self,
        token_hash: &str,
        effect: &TokenEffect,
        now: DateTime<Utc>,
    ) -> Result<ConsumeOutcome, StoreError>;

    // ==================== Sessions ====================

    async fn insert_session(&self, session: &RefreshSession) -> Result<(), StoreError>;

    async fn find_session(&self, session_id: Uuid) -> Result<Option<RefreshSession>, StoreError>;

    /// Unrevoked, unexpired sessions of the user, newest first.
    async fn list_live_sessions(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshSession>, StoreError>;

    /// Compare-and-set the stored refresh digest. Returns false if the
    /// session is revoked, expired, or the digest no longer matches.
    async fn rotate_session_token(
        &self,
        session_id: Uuid,
        expected_hash: &str,
        new_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Returns true only for the call that moved the session to revoked.
    async fn revoke_session(&self, session_id: Uuid, now: DateTime<Utc>)
        -> Result<bool, StoreError>;

    async fn revoke_all_sessions(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, StoreError>;

    // ==================== Audit ====================

    async fn append_audit_event(&self, event: &AuditEvent) -> Result<(), StoreError>;

    /// Newest first.
    async fn list_audit_events(&self, query: &AuditQuery) -> Result<Vec<AuditEvent>, StoreError>;
}
