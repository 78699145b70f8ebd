use service_core::axum::{extract::Request, middleware::Next, response::Response};

use super::AuthContext;
use crate::models::Capability;
use crate::services::ServiceError;

/// Route layer admitting only callers holding `capability`. Must run inside
/// [`auth_middleware`](super::auth_middleware).
pub async fn require_capability(
    capability: Capability,
    req: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let ctx = req.extensions().get::<AuthContext>().ok_or_else(|| {
        ServiceError::Internal(anyhow::anyhow!(
            "Auth context missing from request extensions"
        ))
    })?;

    ctx.require(capability)?;
    Ok(next.run(req).await)
}
