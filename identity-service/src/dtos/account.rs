use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::{Capability, Gender, PhoneKind, StaffRole, UserResponse};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MeResponse {
    pub user: UserResponse,
    pub staff_role: Option<StaffRole>,
    pub capabilities: Vec<Capability>,
}

/// Fields left out are unchanged.
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdatePatientProfileRequest {
    #[schema(value_type = Option<String>, format = "date", example = "1990-04-12")]
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<Gender>,
    #[validate(length(max = 500, message = "Ensure this field has no more than 500 characters."))]
    pub address: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub medical_history: Option<serde_json::Value>,
    #[validate(length(max = 2000, message = "Ensure this field has no more than 2000 characters."))]
    pub bio: Option<String>,
}

/// Fields left out are unchanged.
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateDoctorProfileRequest {
    #[validate(length(min = 1, max = 50, message = "Must be between 1 and 50 characters."))]
    #[schema(example = "MD-12345")]
    pub license_number: Option<String>,
    #[validate(length(max = 100, message = "Ensure this field has no more than 100 characters."))]
    pub specialty: Option<String>,
    #[validate(range(min = 0, max = 80, message = "Must be between 0 and 80."))]
    pub years_experience: Option<i32>,
    #[validate(length(max = 200, message = "Ensure this field has no more than 200 characters."))]
    pub hospital_affiliation: Option<String>,
    #[validate(length(max = 2000, message = "Ensure this field has no more than 2000 characters."))]
    pub bio: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AddPhoneRequest {
    #[schema(example = "+1 555-123-4567")]
    pub number: String,
    #[serde(default = "default_phone_kind")]
    pub phone_kind: PhoneKind,
    #[serde(default)]
    pub is_primary: bool,
}

fn default_phone_kind() -> PhoneKind {
    PhoneKind::Mobile
}
