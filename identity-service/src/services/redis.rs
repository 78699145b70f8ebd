use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client};
use uuid::Uuid;

/// Revoked session ids, consulted on every authenticated request so a
/// revoked grant's access token stops working before it expires.
#[async_trait]
pub trait TokenBlacklist: Send + Sync {
    async fn revoke_session(&self, session_id: Uuid, ttl_seconds: i64)
        -> Result<(), anyhow::Error>;
    async fn is_session_revoked(&self, session_id: Uuid) -> Result<bool, anyhow::Error>;
    async fn health_check(&self) -> Result<(), anyhow::Error>;
}

fn session_key(session_id: Uuid) -> String {
    format!("revoked_session:{}", session_id)
}

#[derive(Clone)]
pub struct RedisService {
    _client: Client,
    manager: ConnectionManager,
}

impl RedisService {
    pub async fn new(config: &crate::config::RedisConfig) -> Result<Self, anyhow::Error> {
        tracing::info!("Connecting to Redis");
        let client = Client::open(config.url.clone())?;

        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!("Failed to get Redis connection manager: {}", e);
            anyhow::anyhow!("Failed to connect to Redis: {}", e)
        })?;

        tracing::info!("Successfully connected to Redis");

        Ok(Self {
            _client: client,
            manager,
        })
    }
}

#[async_trait]
impl TokenBlacklist for RedisService {
    async fn health_check(&self) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Redis health check failed: {}", e))
    }

    async fn revoke_session(
        &self,
        session_id: Uuid,
        ttl_seconds: i64,
    ) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();

        redis::cmd("SET")
            .arg(session_key(session_id))
            .arg("revoked")
            .arg("EX")
            .arg(ttl_seconds.max(1))
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to record revoked session: {}", e))
    }

    async fn is_session_revoked(&self, session_id: Uuid) -> Result<bool, anyhow::Error> {
        let mut conn = self.manager.clone();

        let exists: bool = redis::cmd("EXISTS")
            .arg(session_key(session_id))
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to check revoked session: {}", e))?;

        Ok(exists)
    }
}

#[derive(Default)]
pub struct MockBlacklist {
    pub revoked_sessions: std::sync::Mutex<std::collections::HashSet<Uuid>>,
    failing: std::sync::atomic::AtomicBool,
}

impl MockBlacklist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a cache outage: every call errors until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing
            .store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), anyhow::Error> {
        if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
            anyhow::bail!("Mock blacklist unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl TokenBlacklist for MockBlacklist {
    async fn health_check(&self) -> Result<(), anyhow::Error> {
        self.check_available()
    }

    async fn revoke_session(
        &self,
        session_id: Uuid,
        _ttl_seconds: i64,
    ) -> Result<(), anyhow::Error> {
        self.check_available()?;
        self.revoked_sessions
            .lock()
            .map_err(|e| anyhow::anyhow!("Mock blacklist mutex poisoned: {}", e))?
            .insert(session_id);
        Ok(())
    }

    async fn is_session_revoked(&self, session_id: Uuid) -> Result<bool, anyhow::Error> {
        self.check_available()?;
        let contains = self
            .revoked_sessions
            .lock()
            .map_err(|e| anyhow::anyhow!("Mock blacklist mutex poisoned: {}", e))?
            .contains(&session_id);
        Ok(contains)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_blacklist_tracks_sessions() {
        let blacklist = MockBlacklist::new();
        let revoked = Uuid::new_v4();
        let other = Uuid::new_v4();

        blacklist.revoke_session(revoked, 900).await.unwrap();

        assert!(blacklist.is_session_revoked(revoked).await.unwrap());
        assert!(!blacklist.is_session_revoked(other).await.unwrap());
    }

    #[test]
    fn test_session_key_format() {
        let id = Uuid::nil();
        assert_eq!(
            session_key(id),
            "revoked_session:00000000-0000-0000-0000-000000000000"
        );
    }
}
