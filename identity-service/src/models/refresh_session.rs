//! Refresh session model - one row per issued grant.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Refresh session entity.
///
/// `session_id` is the `sid` claim carried by both halves of the grant.
#[derive(Debug, Clone, FromRow)]
pub struct RefreshSession {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub token_hash_text: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub expiry_utc: DateTime<Utc>,
    pub revoked_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
    pub last_used_utc: DateTime<Utc>,
}

impl RefreshSession {
    /// Create a new refresh session. The token hash is filled in once the
    /// refresh credential, which embeds the session id, has been signed.
    pub fn new(user_id: Uuid, lifetime: Duration) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            user_id,
            token_hash_text: String::new(),
            user_agent: None,
            ip_address: None,
            expiry_utc: now + lifetime,
            revoked_utc: None,
            created_utc: now,
            last_used_utc: now,
        }
    }

    /// Check if session is valid (not expired, not revoked).
    pub fn is_valid(&self) -> bool {
        !self.is_revoked() && !self.is_expired()
    }

    /// Check if session is expired.
    pub fn is_expired(&self) -> bool {
        self.expiry_utc <= Utc::now()
    }

    /// Check if session is revoked.
    pub fn is_revoked(&self) -> bool {
        self.revoked_utc.is_some()
    }
}

/// Session info for API responses.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub last_used_utc: DateTime<Utc>,
    pub expiry_utc: DateTime<Utc>,
    pub is_current: bool,
}

impl SessionInfo {
    pub fn from_session(s: &RefreshSession, current: Option<Uuid>) -> Self {
        Self {
            session_id: s.session_id,
            user_agent: s.user_agent.clone(),
            ip_address: s.ip_address.clone(),
            created_utc: s.created_utc,
            last_used_utc: s.last_used_utc,
            expiry_utc: s.expiry_utc,
            is_current: current == Some(s.session_id),
        }
    }
}
