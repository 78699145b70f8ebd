use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "phone_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PhoneKind {
    Mobile,
    Home,
    Work,
}

/// A phone number owned by exactly one user. At most one per user is primary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct PhoneNumber {
    pub phone_id: Uuid,
    pub user_id: Uuid,
    #[schema(example = "+15551234567")]
    pub number: String,
    pub phone_kind: PhoneKind,
    pub is_primary: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl PhoneNumber {
    pub fn new(user_id: Uuid, number: &str, phone_kind: PhoneKind, is_primary: bool) -> Self {
        let now = Utc::now();
        Self {
            phone_id: Uuid::new_v4(),
            user_id,
            number: normalize_phone_number(number),
            phone_kind,
            is_primary,
            created_utc: now,
            updated_utc: now,
        }
    }
}

/// Strip separators, keeping a leading `+`.
pub fn normalize_phone_number(number: &str) -> String {
    let trimmed = number.trim();
    let mut out = String::with_capacity(trimmed.len());
    for (i, c) in trimmed.chars().enumerate() {
        if c.is_ascii_digit() || (i == 0 && c == '+') {
            out.push(c);
        }
    }
    out
}

/// Accepts an optional leading `+` followed by 7-15 digits; spaces and
/// dashes are allowed as separators.
pub fn is_valid_phone_number(number: &str) -> bool {
    let trimmed = number.trim();
    let digits = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if digits.is_empty()
        || !digits
            .chars()
            .all(|c| c.is_ascii_digit() || c == ' ' || c == '-')
    {
        return false;
    }
    let count = digits.chars().filter(|c| c.is_ascii_digit()).count();
    (7..=15).contains(&count)
}
