//! Session/access manager: RS256 access + refresh grants backed by a
//! server-held session row per grant.
//!
//! The row stores the SHA-256 of the current refresh token. Refresh rotates
//! it with a compare-and-set; revocation marks the row and blacklists the
//! session id so its access tokens stop working immediately.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use super::jwt::{JwtError, RefreshTokenClaims};
use super::store::IdentityStore;
use super::{JwtService, ServiceError, TokenBlacklist};
use crate::dtos::TokenResponse;
use crate::models::{RefreshSession, SessionInfo, User};
use crate::utils::hash_token_value;
use crate::utils::tokens::digests_match;

const TOKEN_TYPE: &str = "Bearer";

/// Request metadata stored alongside a session.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn IdentityStore>,
    jwt: JwtService,
    blacklist: Arc<dyn TokenBlacklist>,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        jwt: JwtService,
        blacklist: Arc<dyn TokenBlacklist>,
    ) -> Self {
        Self {
            store,
            jwt,
            blacklist,
        }
    }

    pub fn jwt(&self) -> &JwtService {
        &self.jwt
    }

    /// Open a new session for `user` and sign its first token pair.
    pub async fn issue_grant(
        &self,
        user: &User,
        client: ClientInfo,
    ) -> Result<TokenResponse, ServiceError> {
        let mut session = RefreshSession::new(user.user_id, self.jwt.refresh_lifetime());
        session.user_agent = client.user_agent;
        session.ip_address = client.ip_address;

        let refresh_token =
            self.jwt
                .generate_refresh_token(user.user_id, session.session_id, session.expiry_utc)?;
        session.token_hash_text = hash_token_value(&refresh_token);
        let access_token = self.jwt.generate_access_token(user, session.session_id)?;

        self.store.insert_session(&session).await?;

        tracing::info!(
            user_id = %user.user_id,
            session_id = %session.session_id,
            "Session issued"
        );

        Ok(TokenResponse {
            access_token,
            refresh_token,
            token_type: TOKEN_TYPE.to_string(),
            expires_in: self.jwt.access_token_expiry_seconds(),
            session_id: session.session_id,
        })
    }

    fn decode_refresh(&self, refresh_token: &str) -> Result<RefreshTokenClaims, ServiceError> {
        self.jwt
            .validate_refresh_token(refresh_token)
            .map_err(|e| match e {
                JwtError::Expired => ServiceError::TokenExpired,
                JwtError::Invalid(reason) => {
                    tracing::debug!(reason = %reason, "Rejected refresh token");
                    ServiceError::TokenInvalid
                }
            })
    }

    /// Load the session a refresh token points at and check it is still
    /// live and still holds this exact token.
    async fn live_session_for(
        &self,
        claims: &RefreshTokenClaims,
        token_hash: &str,
    ) -> Result<RefreshSession, ServiceError> {
        let session = self
            .store
            .find_session(claims.sid)
            .await?
            .ok_or(ServiceError::TokenInvalid)?;

        if session.user_id.to_string() != claims.sub || session.is_revoked() {
            return Err(ServiceError::TokenInvalid);
        }
        if session.is_expired() {
            return Err(ServiceError::TokenExpired);
        }
        if !digests_match(&session.token_hash_text, token_hash) {
            return Err(ServiceError::TokenInvalid);
        }
        Ok(session)
    }

    /// Rotate the refresh token and sign a new access token. The session id
    /// and its expiry are unchanged.
    pub async fn refresh(&self, refresh_token: &str) -> Result<(User, TokenResponse), ServiceError> {
        let claims = self.decode_refresh(refresh_token)?;
        let presented_hash = hash_token_value(refresh_token);
        let session = self.live_session_for(&claims, &presented_hash).await?;

        let user = self
            .store
            .find_user_by_id(session.user_id)
            .await?
            .ok_or(ServiceError::TokenInvalid)?;
        if !user.can_authenticate() {
            return Err(ServiceError::AccountDisabled);
        }

        let new_refresh =
            self.jwt
                .generate_refresh_token(user.user_id, session.session_id, session.expiry_utc)?;
        let rotated = self
            .store
            .rotate_session_token(
                session.session_id,
                &presented_hash,
                &hash_token_value(&new_refresh),
                Utc::now(),
            )
            .await?;
        if !rotated {
            tracing::warn!(
                session_id = %session.session_id,
                "Refresh token lost rotation race or was replayed"
            );
            return Err(ServiceError::TokenInvalid);
        }

        let access_token = self.jwt.generate_access_token(&user, session.session_id)?;

        tracing::debug!(session_id = %session.session_id, "Session refreshed");

        Ok((
            user,
            TokenResponse {
                access_token,
                refresh_token: new_refresh,
                token_type: TOKEN_TYPE.to_string(),
                expires_in: self.jwt.access_token_expiry_seconds(),
                session_id: session.session_id,
            },
        ))
    }

    /// Revoke the grant a refresh token belongs to. Any failure to match a
    /// live grant, including an already revoked one, is `TokenInvalid`.
    pub async fn revoke(&self, refresh_token: &str) -> Result<RefreshSession, ServiceError> {
        let claims = self
            .jwt
            .validate_refresh_token(refresh_token)
            .map_err(|_| ServiceError::TokenInvalid)?;
        let session = self
            .live_session_for(&claims, &hash_token_value(refresh_token))
            .await
            .map_err(|e| match e {
                ServiceError::TokenExpired => ServiceError::TokenInvalid,
                other => other,
            })?;

        if !self.end(session.session_id).await? {
            return Err(ServiceError::TokenInvalid);
        }
        Ok(session)
    }

    /// Revoke one session and blacklist its id. Returns false when it was
    /// already revoked.
    pub async fn end(&self, session_id: Uuid) -> Result<bool, ServiceError> {
        let revoked = self.store.revoke_session(session_id, Utc::now()).await?;
        if revoked {
            self.blacklist_sessions(&[session_id]).await;
            tracing::info!(session_id = %session_id, "Session revoked");
        }
        Ok(revoked)
    }

    /// Record already-revoked sessions in the blacklist. The session rows
    /// are the durable record, so a blacklist failure is logged only.
    pub async fn blacklist_sessions(&self, session_ids: &[Uuid]) {
        let ttl = self.jwt.access_token_expiry_seconds();
        for session_id in session_ids {
            if let Err(e) = self.blacklist.revoke_session(*session_id, ttl).await {
                tracing::error!(
                    error = %e,
                    session_id = %session_id,
                    "Failed to blacklist revoked session"
                );
            }
        }
    }

    /// Live sessions of `user_id`, newest first, flagging the caller's own.
    pub async fn list(
        &self,
        user_id: Uuid,
        current_session_id: Option<Uuid>,
    ) -> Result<Vec<SessionInfo>, ServiceError> {
        let sessions = self.store.list_live_sessions(user_id, Utc::now()).await?;
        Ok(sessions
            .iter()
            .map(|s| SessionInfo::from_session(s, current_session_id))
            .collect())
    }

    /// Terminate one of the caller's sessions. Absent, expired and revoked
    /// sessions are `NotFound`; another user's session is `Forbidden`.
    pub async fn terminate(&self, user_id: Uuid, session_id: Uuid) -> Result<(), ServiceError> {
        let session = self
            .store
            .find_session(session_id)
            .await?
            .filter(|s| s.is_valid())
            .ok_or_else(|| ServiceError::NotFound("Session not found.".to_string()))?;

        if session.user_id != user_id {
            tracing::warn!(
                user_id = %user_id,
                session_id = %session_id,
                "Attempt to terminate another user's session"
            );
            return Err(ServiceError::Forbidden(
                "You do not have permission to terminate this session.".to_string(),
            ));
        }

        if !self.end(session_id).await? {
            return Err(ServiceError::NotFound("Session not found.".to_string()));
        }
        Ok(())
    }

    /// Whether access tokens of `session_id` must be rejected.
    pub async fn is_revoked(&self, session_id: Uuid) -> Result<bool, ServiceError> {
        self.blacklist
            .is_session_revoked(session_id)
            .await
            .map_err(ServiceError::Internal)
    }
}
