//! Shared harness for the identity-service integration tests.
//!
//! Runs the full router over the in-memory store, the mock blacklist and the
//! mock mailer, so no Postgres, Redis or SMTP server is needed.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use identity_service::{
    build_router,
    config::{
        AccountPolicyConfig, DatabaseConfig, Environment, IdentityConfig, JwtConfig, RateLimit,
        RateLimitConfig, RedisConfig, SecurityConfig, SmtpConfig, SwaggerConfig, SwaggerMode,
        TokenConfig,
    },
    models::AuditEvent,
    services::{
        email::EmailKind, store::AuditQuery, IdentityStore, InMemoryStore, JwtService,
        MockBlacklist, MockEmailService,
    },
    AppState,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

pub const PRIVATE_KEY: &str = include_str!("../fixtures/jwt_private.pem");
pub const PUBLIC_KEY: &str = include_str!("../fixtures/jwt_public.pem");

pub const PASSWORD: &str = "Tr1cky-Lantern";
pub const ADMIN_PASSWORD: &str = "Qu1et-Harbor-Admin";

fn generous(attempts: u32) -> RateLimit {
    RateLimit {
        attempts,
        window_seconds: 60,
    }
}

pub fn test_config() -> IdentityConfig {
    IdentityConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "identity-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: "postgres://localhost/identity_test".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        redis: RedisConfig {
            url: "redis://127.0.0.1:6379".to_string(),
        },
        jwt: JwtConfig {
            private_key_path: "tests/fixtures/jwt_private.pem".to_string(),
            public_key_path: "tests/fixtures/jwt_public.pem".to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 1,
        },
        smtp: SmtpConfig {
            host: "localhost".to_string(),
            port: 1025,
            user: String::new(),
            password: String::new(),
            from_email: "no-reply@localhost".to_string(),
        },
        frontend_url: "http://localhost:3000".to_string(),
        tokens: TokenConfig {
            email_verification_ttl_hours: 24,
            password_reset_ttl_hours: 24,
        },
        accounts: AccountPolicyConfig {
            require_email_verification: true,
            password_min_length: 8,
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
        swagger: SwaggerConfig {
            enabled: SwaggerMode::Public,
        },
        rate_limit: RateLimitConfig {
            login: generous(1000),
            register: generous(1000),
            password_reset: generous(1000),
            verification_resend: generous(1000),
            global_ip: generous(10_000),
        },
        bootstrap_admin: None,
    }
}

/// A signed-in user as seen by the tests.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: Uuid,
    pub email: String,
    pub access_token: String,
    pub refresh_token: String,
    pub session_id: Uuid,
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<InMemoryStore>,
    pub email: Arc<MockEmailService>,
    pub blacklist: Arc<MockBlacklist>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(test_config()).await
    }

    pub async fn spawn_with(config: IdentityConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let email = Arc::new(MockEmailService::new());
        let blacklist = Arc::new(MockBlacklist::new());
        let jwt = JwtService::from_pem(
            PRIVATE_KEY,
            PUBLIC_KEY,
            config.jwt.access_token_expiry_minutes,
            config.jwt.refresh_token_expiry_days,
        )
        .expect("fixture keys load");

        let state = AppState::new(
            config,
            store.clone(),
            blacklist.clone(),
            email.clone(),
            jwt,
            None,
        );
        let router = build_router(state.clone()).await.expect("router builds");

        TestApp {
            router,
            state,
            store,
            email,
            blacklist,
        }
    }

    /// Send one request through the router and decode the JSON body
    /// (`Value::Null` when the body is empty or not JSON).
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        bearer: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("Content-Type", "application/json")
            .header("User-Agent", "identity-tests/1.0")
            .extension(axum::extract::ConnectInfo(SocketAddr::from((
                [127, 0, 0, 1],
                8080,
            ))));
        if let Some(token) = bearer {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }

        let body = match body {
            Some(v) => Body::from(v.to_string()),
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, Some(body), None).await
    }

    pub async fn get_auth(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.send(Method::GET, uri, None, Some(token)).await
    }

    pub async fn post_auth(&self, uri: &str, body: Value, token: &str) -> (StatusCode, Value) {
        self.send(Method::POST, uri, Some(body), Some(token)).await
    }

    pub async fn register(&self, email: &str, role: &str) -> (StatusCode, Value) {
        self.post(
            "/auth/register",
            json!({
                "email": email,
                "password": PASSWORD,
                "password_confirm": PASSWORD,
                "first_name": "Maya",
                "last_name": "Okafor",
                "role": role,
            }),
        )
        .await
    }

    pub fn last_token(&self, email: &str, kind: EmailKind) -> String {
        self.email
            .last_to(email, kind)
            .unwrap_or_else(|| panic!("no {:?} email sent to {}", kind, email))
            .token()
            .to_string()
    }

    pub async fn verify(&self, email: &str) {
        let token = self.last_token(email, EmailKind::Verification);
        let (status, body) = self
            .send(
                Method::GET,
                &format!("/auth/verify-email/{}", token),
                None,
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK, "verify failed: {}", body);
    }

    pub async fn login(&self, email: &str, password: &str) -> (StatusCode, Value) {
        self.post(
            "/auth/login",
            json!({ "email": email, "password": password }),
        )
        .await
    }

    pub async fn login_session(&self, email: &str, password: &str) -> Session {
        let (status, body) = self.login(email, password).await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        session_from(&body)
    }

    /// Register, verify and log in.
    pub async fn signed_in(&self, email: &str, role: &str) -> Session {
        let (status, body) = self.register(email, role).await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
        self.verify(email).await;
        self.login_session(email, PASSWORD).await
    }

    /// Provision a superuser through the bootstrap path and log in.
    pub async fn superuser(&self, email: &str) -> Session {
        let created = self
            .state
            .admin_service
            .ensure_bootstrap_superuser(email, ADMIN_PASSWORD)
            .await
            .expect("bootstrap superuser");
        assert!(created);
        self.login_session(email, ADMIN_PASSWORD).await
    }

    /// Audit appends are fire-and-forget; poll until `count` events with
    /// `action` are visible.
    pub async fn wait_for_audit(&self, action: &str, count: usize) -> Vec<AuditEvent> {
        let query = AuditQuery {
            actor_user_id: None,
            action_code: Some(action.to_string()),
            limit: 200,
            offset: 0,
        };
        for _ in 0..100 {
            let events = self.store.list_audit_events(&query).await.unwrap();
            if events.len() >= count {
                return events;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} '{}' audit events", count, action);
    }
}

pub fn session_from(login_body: &Value) -> Session {
    let uuid = |v: &Value| Uuid::parse_str(v.as_str().expect("uuid string")).expect("uuid");
    Session {
        user_id: uuid(&login_body["user"]["user_id"]),
        email: login_body["user"]["email"].as_str().unwrap().to_string(),
        access_token: login_body["tokens"]["access_token"]
            .as_str()
            .unwrap()
            .to_string(),
        refresh_token: login_body["tokens"]["refresh_token"]
            .as_str()
            .unwrap()
            .to_string(),
        session_id: uuid(&login_body["tokens"]["session_id"]),
    }
}
