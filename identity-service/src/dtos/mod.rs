pub mod account;
pub mod admin;
pub mod auth;

pub use account::*;
pub use admin::*;
pub use auth::*;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Documentation mirror of `service_core::error::ErrorBody`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    #[schema(example = "invalid_credentials")]
    pub error: String,
    #[schema(example = "Invalid email or password.")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<BTreeMap<String, Vec<String>>>,
}
