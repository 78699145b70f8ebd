//! Audit recorder: append-only trail of security-relevant actions.
//!
//! Writes are spawned off the request path. A failed write is logged and
//! never surfaces to the caller.

use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use super::store::{AuditQuery, IdentityStore};
use super::ServiceError;
use crate::models::{AuditAction, AuditEvent};

pub const MAX_PAGE_SIZE: i64 = 200;

#[derive(Clone)]
pub struct AuditRecorder {
    store: Arc<dyn IdentityStore>,
}

impl AuditRecorder {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }

    /// Fire-and-forget append.
    pub fn record(&self, actor_user_id: Option<Uuid>, action: AuditAction, detail: Value) {
        let event = AuditEvent::new(actor_user_id, action, detail);
        let store = self.store.clone();

        tracing::info!(
            action = %event.action_code,
            actor_user_id = ?event.actor_user_id,
            "Audit event"
        );

        tokio::spawn(async move {
            if let Err(e) = store.append_audit_event(&event).await {
                tracing::error!(
                    error = %e,
                    action = %event.action_code,
                    "Failed to write audit event"
                );
            }
        });
    }

    /// Newest first; `limit` is clamped to 1..=200.
    pub async fn list_events(
        &self,
        actor_user_id: Option<Uuid>,
        action_code: Option<String>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AuditEvent>, ServiceError> {
        let query = AuditQuery {
            actor_user_id,
            action_code,
            limit: limit.clamp(1, MAX_PAGE_SIZE),
            offset: offset.max(0),
        };
        Ok(self.store.list_audit_events(&query).await?)
    }
}
