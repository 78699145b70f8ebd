use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "token_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    EmailVerification,
    PasswordReset,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::EmailVerification => "email_verification",
            TokenKind::PasswordReset => "password_reset",
        }
    }
}

/// Single-use, time-bounded token. Only the SHA-256 digest of the value
/// handed to the user is stored.
#[derive(Debug, Clone, FromRow)]
pub struct VerificationToken {
    pub token_id: Uuid,
    pub token_hash: String,
    pub user_id: Uuid,
    pub token_kind: TokenKind,
    pub expiry_utc: DateTime<Utc>,
    pub created_utc: DateTime<Utc>,
}

impl VerificationToken {
    pub fn new(user_id: Uuid, token_hash: String, token_kind: TokenKind, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            token_id: Uuid::new_v4(),
            token_hash,
            user_id,
            token_kind,
            expiry_utc: now + ttl,
            created_utc: now,
        }
    }

    /// A token is valid only while `now < expiry`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry_utc
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// State change authorized by consuming a token.
#[derive(Debug, Clone)]
pub enum TokenEffect {
    MarkEmailVerified,
    /// Replace the password hash and revoke every session of the user.
    SetPasswordHash(String),
}

impl TokenEffect {
    pub fn kind(&self) -> TokenKind {
        match self {
            TokenEffect::MarkEmailVerified => TokenKind::EmailVerification,
            TokenEffect::SetPasswordHash(_) => TokenKind::PasswordReset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_expires_at_boundary() {
        let token = VerificationToken::new(
            Uuid::new_v4(),
            "digest".to_string(),
            TokenKind::PasswordReset,
            Duration::hours(1),
        );

        assert!(!token.is_expired());
        assert!(!token.is_expired_at(token.expiry_utc - Duration::seconds(1)));
        assert!(token.is_expired_at(token.expiry_utc));
    }

    #[test]
    fn test_effect_kind_matches_token_kind() {
        assert_eq!(
            TokenEffect::MarkEmailVerified.kind(),
            TokenKind::EmailVerification
        );
        assert_eq!(
            TokenEffect::SetPasswordHash("h".to_string()).kind(),
            TokenKind::PasswordReset
        );
    }
}
