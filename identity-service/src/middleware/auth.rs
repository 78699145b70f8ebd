use std::collections::BTreeSet;

use service_core::axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::models::{Capability, StaffRole, User};
use crate::services::permissions::capabilities_for;
use crate::services::{AccessTokenClaims, ServiceError};
use crate::AppState;

/// Identity of the caller, resolved once per request by [`auth_middleware`]
/// and handed to handlers explicitly.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user: User,
    pub session_id: Uuid,
    pub claims: AccessTokenClaims,
    pub staff_role: Option<StaffRole>,
}

impl AuthContext {
    pub fn capabilities(&self) -> BTreeSet<Capability> {
        capabilities_for(&self.user, self.staff_role)
    }

    pub fn require(&self, capability: Capability) -> Result<(), ServiceError> {
        if self.capabilities().contains(&capability) {
            return Ok(());
        }
        tracing::warn!(
            user_id = %self.user.user_id,
            capability = %capability,
            "Capability check failed"
        );
        Err(ServiceError::Forbidden(format!(
            "Missing capability: {}",
            capability
        )))
    }
}

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Require a valid access token whose session is not revoked and whose user
/// can still authenticate.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let token = bearer_token(&req).ok_or_else(|| {
        ServiceError::Unauthorized("Missing or invalid Authorization header".to_string())
    })?;

    let claims = state
        .jwt
        .validate_access_token(token)
        .map_err(|_| ServiceError::Unauthorized("Invalid or expired token".to_string()))?;

    // Fail closed: a blacklist outage rejects the request.
    let revoked = state
        .auth_service
        .sessions()
        .is_revoked(claims.sid)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Revocation check failed");
            e
        })?;
    if revoked {
        return Err(ServiceError::Unauthorized(
            "Session has been revoked".to_string(),
        ));
    }

    let user_id = claims
        .user_id()
        .map_err(|_| ServiceError::Unauthorized("Invalid or expired token".to_string()))?;
    let user = state
        .store
        .find_user_by_id(user_id)
        .await?
        .filter(User::can_authenticate)
        .ok_or_else(|| ServiceError::Unauthorized("User is inactive or deleted".to_string()))?;

    let staff_role = if user.is_staff {
        state.profile_registry.get_staff_role(user.user_id).await?
    } else {
        None
    };

    tracing::debug!(user_id = %user.user_id, session_id = %claims.sid, "Request authenticated");

    req.extensions_mut().insert(AuthContext {
        user,
        session_id: claims.sid,
        claims,
        staff_role,
    });

    Ok(next.run(req).await)
}

#[service_core::axum::async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<AuthContext>().cloned().ok_or_else(|| {
            ServiceError::Internal(anyhow::anyhow!(
                "Auth context missing from request extensions"
            ))
        })
    }
}
