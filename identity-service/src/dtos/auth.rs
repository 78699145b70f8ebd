use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::UserResponse;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(email(message = "Enter a valid email address."))]
    #[schema(example = "jane.doe@example.com")]
    pub email: String,

    #[schema(example = "s3cure-Passphrase")]
    pub password: String,

    #[serde(alias = "confirm_password")]
    #[schema(example = "s3cure-Passphrase")]
    pub password_confirm: String,

    #[validate(length(min = 1, max = 150, message = "Must be between 1 and 150 characters."))]
    #[schema(example = "Jane")]
    pub first_name: String,

    #[validate(length(min = 1, max = 150, message = "Must be between 1 and 150 characters."))]
    #[schema(example = "Doe")]
    pub last_name: String,

    #[schema(example = "patient")]
    pub role: String,

    /// Doctors only.
    #[validate(length(max = 50, message = "Ensure this field has no more than 50 characters."))]
    #[schema(example = "MD-12345")]
    pub license_number: Option<String>,

    /// Doctors only.
    #[validate(length(max = 100, message = "Ensure this field has no more than 100 characters."))]
    #[schema(example = "Cardiology")]
    pub specialty: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RegisterResponse {
    pub user: UserResponse,
    #[schema(example = "Registration successful. Please check your email to verify your account.")]
    pub message: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "This field may not be blank."))]
    #[schema(example = "jane.doe@example.com")]
    pub email: String,

    #[validate(length(min = 1, message = "This field may not be blank."))]
    #[schema(example = "s3cure-Passphrase")]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[schema(example = "Bearer")]
    pub token_type: String,
    /// Access token lifetime in seconds.
    #[schema(example = 900)]
    pub expires_in: i64,
    pub session_id: uuid::Uuid,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub user: UserResponse,
    pub tokens: TokenResponse,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "This field may not be blank."))]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct EmailRequest {
    #[validate(email(message = "Enter a valid email address."))]
    #[schema(example = "jane.doe@example.com")]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PasswordResetConfirmRequest {
    pub new_password: String,
    #[serde(alias = "confirm_password")]
    pub new_password_confirm: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "This field may not be blank."))]
    pub old_password: String,
    pub new_password: String,
    #[serde(alias = "confirm_password")]
    pub new_password_confirm: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct DeleteAccountRequest {
    #[validate(length(min = 1, message = "This field may not be blank."))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    #[schema(example = "Logged out successfully")]
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
