//! User model - the identity record behind every login.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use super::ProfileKind;

/// Closed set of user roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Patient,
    Doctor,
    Staff,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Doctor => "doctor",
            Role::Staff => "staff",
            Role::Admin => "admin",
        }
    }

    /// Roles a visitor may pick for themselves at registration.
    pub fn is_self_assignable(&self) -> bool {
        matches!(self, Role::Patient | Role::Doctor)
    }

    /// The role profile a user of this role carries, if any.
    ///
    /// Staff profiles are attached through staff-role assignment rather than
    /// by role, so `Staff` has no profile of its own here.
    pub fn profile_kind(&self) -> Option<ProfileKind> {
        match self {
            Role::Patient => Some(ProfileKind::Patient),
            Role::Doctor => Some(ProfileKind::Doctor),
            Role::Staff | Role::Admin => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "patient" => Ok(Role::Patient),
            "doctor" => Ok(Role::Doctor),
            "staff" => Ok(Role::Staff),
            "admin" => Ok(Role::Admin),
            other => Err(format!("Invalid role: {}", other)),
        }
    }
}

/// User entity.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub user_id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub email_verified: bool,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub deleted_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl User {
    /// Create a new, unverified, active user.
    pub fn new(
        email: &str,
        password_hash: String,
        first_name: String,
        last_name: String,
        role: Role,
    ) -> Self {
        let now = Utc::now();
        Self {
            user_id: Uuid::new_v4(),
            email: normalize_email(email),
            password_hash,
            first_name,
            last_name,
            role,
            email_verified: false,
            is_active: true,
            is_staff: role == Role::Admin,
            is_superuser: false,
            deleted_utc: None,
            created_utc: now,
            updated_utc: now,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_utc.is_some()
    }

    /// Inactive and soft-deleted users may not authenticate.
    pub fn can_authenticate(&self) -> bool {
        self.is_active && !self.is_deleted()
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    pub fn sanitized(&self) -> UserResponse {
        UserResponse::from(self)
    }
}

/// Emails are compared trimmed and lower-cased everywhere.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// User response for API (without sensitive fields).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub user_id: Uuid,
    #[schema(example = "jane.doe@example.com")]
    pub email: String,
    #[schema(example = "Jane")]
    pub first_name: String,
    #[schema(example = "Doe")]
    pub last_name: String,
    pub role: Role,
    pub email_verified: bool,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub created_utc: DateTime<Utc>,
}

impl From<&User> for UserResponse {
    fn from(u: &User) -> Self {
        Self {
            user_id: u.user_id,
            email: u.email.clone(),
            first_name: u.first_name.clone(),
            last_name: u.last_name.clone(),
            role: u.role,
            email_verified: u.email_verified,
            is_active: u.is_active,
            is_staff: u.is_staff,
            is_superuser: u.is_superuser,
            created_utc: u.created_utc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_normalizes_email() {
        let user = User::new(
            "  Jane.Doe@Example.COM ",
            "hash".to_string(),
            "Jane".to_string(),
            "Doe".to_string(),
            Role::Patient,
        );
        assert_eq!(user.email, "jane.doe@example.com");
        assert!(!user.email_verified);
        assert!(user.can_authenticate());
        assert!(!user.is_staff);
    }

    #[test]
    fn test_deleted_or_inactive_user_cannot_authenticate() {
        let mut user = User::new(
            "a@example.com",
            "hash".to_string(),
            "A".to_string(),
            "B".to_string(),
            Role::Doctor,
        );
        user.is_active = false;
        assert!(!user.can_authenticate());

        user.is_active = true;
        user.deleted_utc = Some(Utc::now());
        assert!(!user.can_authenticate());
    }

    #[test]
    fn test_only_patient_and_doctor_are_self_assignable() {
        assert!(Role::Patient.is_self_assignable());
        assert!(Role::Doctor.is_self_assignable());
        assert!(!Role::Staff.is_self_assignable());
        assert!(!Role::Admin.is_self_assignable());
        assert_eq!("ADMIN".parse::<Role>(), Ok(Role::Admin));
        assert!("superuser".parse::<Role>().is_err());
    }
}
