//! Token lifecycle: issued -> valid while now < expiry -> consumed | expired.
//!
//! Only the SHA-256 of a value is stored. Issuing a token replaces any
//! outstanding token of the same kind for the user.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use super::store::{ConsumeOutcome, IdentityStore};
use super::{EmailProvider, ServiceError};
use crate::config::TokenConfig;
use crate::models::{TokenEffect, TokenKind, User, VerificationToken};
use crate::utils::{generate_token_value, hash_token_value};

/// Result of a successful consumption.
#[derive(Debug, Clone, PartialEq)]
pub struct Consumed {
    pub user_id: Uuid,
    pub revoked_sessions: Vec<Uuid>,
}

#[derive(Clone)]
pub struct TokenLifecycle {
    store: Arc<dyn IdentityStore>,
    email: Arc<dyn EmailProvider>,
    frontend_url: String,
    verification_ttl: Duration,
    reset_ttl: Duration,
}

impl TokenLifecycle {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        email: Arc<dyn EmailProvider>,
        frontend_url: &str,
        ttls: &TokenConfig,
    ) -> Self {
        Self {
            store,
            email,
            frontend_url: frontend_url.trim_end_matches('/').to_string(),
            verification_ttl: Duration::hours(ttls.email_verification_ttl_hours),
            reset_ttl: Duration::hours(ttls.password_reset_ttl_hours),
        }
    }

    fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::EmailVerification => self.verification_ttl,
            TokenKind::PasswordReset => self.reset_ttl,
        }
    }

    /// Persist a fresh token and return the plaintext value for delivery.
    pub async fn issue(&self, user_id: Uuid, kind: TokenKind) -> Result<String, ServiceError> {
        let value = generate_token_value();
        let token = VerificationToken::new(user_id, hash_token_value(&value), kind, self.ttl(kind));
        self.store.replace_token(&token).await?;

        tracing::info!(
            user_id = %user_id,
            kind = kind.as_str(),
            expiry_utc = %token.expiry_utc,
            "Token issued"
        );
        Ok(value)
    }

    pub fn verification_link(&self, value: &str) -> String {
        format!("{}/verify-email/{}", self.frontend_url, value)
    }

    pub fn reset_link(&self, value: &str) -> String {
        format!("{}/password-reset/confirm/{}", self.frontend_url, value)
    }

    /// Issue a verification token and mail it. A delivery failure is logged
    /// and leaves the token in place so it can be re-sent.
    pub async fn send_verification(&self, user: &User) -> Result<(), ServiceError> {
        let value = self.issue(user.user_id, TokenKind::EmailVerification).await?;
        let link = self.verification_link(&value);

        if let Err(e) = self
            .email
            .send_verification_email(&user.email, &user.full_name(), &link)
            .await
        {
            tracing::warn!(error = %e, user_id = %user.user_id, "Verification email not delivered");
        }
        Ok(())
    }

    /// Issue a reset token and mail it. Same delivery semantics as
    /// [`send_verification`](Self::send_verification).
    pub async fn send_password_reset(&self, user: &User) -> Result<(), ServiceError> {
        let value = self.issue(user.user_id, TokenKind::PasswordReset).await?;
        let link = self.reset_link(&value);

        if let Err(e) = self
            .email
            .send_password_reset_email(&user.email, &user.full_name(), &link)
            .await
        {
            tracing::warn!(error = %e, user_id = %user.user_id, "Password reset email not delivered");
        }
        Ok(())
    }

    /// Look a value up without consuming it.
    pub async fn find_valid(
        &self,
        value: &str,
        kind: TokenKind,
    ) -> Result<VerificationToken, ServiceError> {
        let token = self
            .store
            .find_token(&hash_token_value(value), kind)
            .await?
            .ok_or(ServiceError::TokenInvalid)?;

        if token.is_expired() {
            return Err(ServiceError::TokenExpired);
        }
        Ok(token)
    }

    /// Apply `effect` and delete the token as one unit. At most one caller
    /// succeeds per value.
    pub async fn consume(&self, value: &str, effect: TokenEffect) -> Result<Consumed, ServiceError> {
        let kind = effect.kind();
        let outcome = self
            .store
            .consume_token(&hash_token_value(value), &effect, Utc::now())
            .await?;

        let label = match &outcome {
            ConsumeOutcome::Consumed { .. } => "consumed",
            ConsumeOutcome::Invalid => "invalid",
            ConsumeOutcome::Expired => "expired",
        };
        metrics::counter!(
            "identity_tokens_consumed_total",
            "kind" => kind.as_str(),
            "outcome" => label
        )
        .increment(1);

        match outcome {
            ConsumeOutcome::Consumed {
                user_id,
                revoked_sessions,
            } => {
                tracing::info!(user_id = %user_id, kind = kind.as_str(), "Token consumed");
                Ok(Consumed {
                    user_id,
                    revoked_sessions,
                })
            }
            ConsumeOutcome::Invalid => Err(ServiceError::TokenInvalid),
            ConsumeOutcome::Expired => Err(ServiceError::TokenExpired),
        }
    }
}
