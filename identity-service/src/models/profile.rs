//! Role profiles - per-role extension records owned by a user.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProfileKind {
    Patient,
    Doctor,
    Staff,
}

impl ProfileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileKind::Patient => "patient",
            ProfileKind::Doctor => "doctor",
            ProfileKind::Staff => "staff",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "gender", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
}

/// Staff sub-roles. Each maps to a fixed capability set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "staff_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StaffRole {
    Receptionist,
    Nurse,
    LabTechnician,
    Pharmacist,
    BillingClerk,
    Manager,
}

impl StaffRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            StaffRole::Receptionist => "receptionist",
            StaffRole::Nurse => "nurse",
            StaffRole::LabTechnician => "lab_technician",
            StaffRole::Pharmacist => "pharmacist",
            StaffRole::BillingClerk => "billing_clerk",
            StaffRole::Manager => "manager",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct PatientProfile {
    pub user_id: Uuid,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub address: Option<String>,
    #[schema(value_type = Object)]
    pub medical_history: serde_json::Value,
    pub bio: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl PatientProfile {
    pub fn new(user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            date_of_birth: None,
            gender: None,
            address: None,
            medical_history: serde_json::json!({}),
            bio: None,
            created_utc: now,
            updated_utc: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct DoctorProfile {
    pub user_id: Uuid,
    #[schema(example = "MD-12345")]
    pub license_number: Option<String>,
    #[schema(example = "Cardiology")]
    pub specialty: Option<String>,
    pub years_experience: i32,
    pub hospital_affiliation: Option<String>,
    pub bio: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl DoctorProfile {
    pub fn new(user_id: Uuid, license_number: Option<String>, specialty: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            license_number,
            specialty,
            years_experience: 0,
            hospital_affiliation: None,
            bio: None,
            created_utc: now,
            updated_utc: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct StaffProfile {
    pub user_id: Uuid,
    pub staff_role: StaffRole,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl StaffProfile {
    pub fn new(user_id: Uuid, staff_role: StaffRole) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            staff_role,
            created_utc: now,
            updated_utc: now,
        }
    }
}

/// A role-specific profile, one variant per profile kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoleProfile {
    Patient(PatientProfile),
    Doctor(DoctorProfile),
    Staff(StaffProfile),
}

impl RoleProfile {
    pub fn user_id(&self) -> Uuid {
        match self {
            RoleProfile::Patient(p) => p.user_id,
            RoleProfile::Doctor(p) => p.user_id,
            RoleProfile::Staff(p) => p.user_id,
        }
    }

    pub fn kind(&self) -> ProfileKind {
        match self {
            RoleProfile::Patient(_) => ProfileKind::Patient,
            RoleProfile::Doctor(_) => ProfileKind::Doctor,
            RoleProfile::Staff(_) => ProfileKind::Staff,
        }
    }
}
