pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use service_core::axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state, Next},
    routing::{delete, get, post, put},
    Json, Router,
};
use service_core::middleware::{
    metrics::metrics_middleware,
    rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimiter},
    security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{openapi::security::SecurityScheme, Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::{Environment, IdentityConfig, RateLimit, SwaggerMode};
use crate::models::Capability;
use crate::services::{
    AdminService, AuditRecorder, AuthService, EmailProvider, IdentityStore, JwtService,
    PolicyService, ProfileRegistry, SessionManager, TokenBlacklist, TokenLifecycle,
};
use service_core::error::AppError;
use std::sync::Arc;

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::auth::registration::register,
        handlers::auth::registration::verify_email,
        handlers::auth::registration::resend_verification,
        handlers::auth::session::login,
        handlers::auth::session::logout,
        handlers::auth::session::refresh,
        handlers::auth::session::revoke,
        handlers::auth::session::list_sessions,
        handlers::auth::session::terminate_session,
        handlers::auth::password::request_password_reset,
        handlers::auth::password::confirm_password_reset,
        handlers::auth::password::change_password,
        handlers::auth::password::delete_account,
        handlers::account::get_me,
        handlers::account::create_profile,
        handlers::account::get_patient_profile,
        handlers::account::update_patient_profile,
        handlers::account::get_doctor_profile,
        handlers::account::update_doctor_profile,
        handlers::account::list_phones,
        handlers::account::add_phone,
        handlers::account::set_primary_phone,
        handlers::account::delete_phone,
        handlers::admin::users::create_admin_user,
        handlers::admin::users::assign_role,
        handlers::admin::staff::assign_staff_role,
        handlers::admin::staff::remove_staff_role,
        handlers::admin::staff::get_capabilities,
        handlers::admin::audit::list_audit_events,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::auth::RegisterRequest,
            dtos::auth::RegisterResponse,
            dtos::auth::LoginRequest,
            dtos::auth::LoginResponse,
            dtos::auth::TokenResponse,
            dtos::auth::RefreshRequest,
            dtos::auth::EmailRequest,
            dtos::auth::PasswordResetConfirmRequest,
            dtos::auth::ChangePasswordRequest,
            dtos::auth::DeleteAccountRequest,
            dtos::auth::MessageResponse,
            dtos::account::MeResponse,
            dtos::account::UpdatePatientProfileRequest,
            dtos::account::UpdateDoctorProfileRequest,
            dtos::account::AddPhoneRequest,
            dtos::admin::CreateAdminUserRequest,
            dtos::admin::AssignRoleRequest,
            dtos::admin::AssignStaffRoleRequest,
            dtos::admin::CapabilitiesResponse,
            dtos::admin::AuditEventListResponse,
            models::UserResponse,
            models::Role,
            models::StaffRole,
            models::Gender,
            models::PhoneKind,
            models::Capability,
            models::PatientProfile,
            models::DoctorProfile,
            models::StaffProfile,
            models::PhoneNumber,
            models::SessionInfo,
            models::AuditEventResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Registration, login, tokens and password recovery"),
        (name = "Sessions", description = "Refresh sessions of the current user"),
        (name = "Account", description = "The authenticated user's own account"),
        (name = "Profiles", description = "Role profiles and phone numbers"),
        (name = "Admin", description = "Role, staff and audit administration"),
        (name = "Observability", description = "Service health and monitoring"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    utoipa::openapi::security::HttpBuilder::new()
                        .scheme(utoipa::openapi::security::HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: IdentityConfig,
    pub store: Arc<dyn IdentityStore>,
    pub blacklist: Arc<dyn TokenBlacklist>,
    pub jwt: JwtService,
    pub auth_service: AuthService,
    pub profile_registry: ProfileRegistry,
    pub admin_service: AdminService,
    pub metrics: Option<PrometheusHandle>,
    pub login_rate_limiter: IpRateLimiter,
    pub register_rate_limiter: IpRateLimiter,
    pub password_reset_rate_limiter: IpRateLimiter,
    pub verification_resend_rate_limiter: IpRateLimiter,
    pub ip_rate_limiter: IpRateLimiter,
}

impl AppState {
    /// Wire the services on top of the given backends.
    pub fn new(
        config: IdentityConfig,
        store: Arc<dyn IdentityStore>,
        blacklist: Arc<dyn TokenBlacklist>,
        email: Arc<dyn EmailProvider>,
        jwt: JwtService,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        let audit = AuditRecorder::new(store.clone());
        let policy = PolicyService::new(config.accounts.password_min_length);
        let sessions = SessionManager::new(store.clone(), jwt.clone(), blacklist.clone());
        let tokens = TokenLifecycle::new(
            store.clone(),
            email,
            &config.frontend_url,
            &config.tokens,
        );
        let profile_registry = ProfileRegistry::new(store.clone(), audit.clone());

        let auth_service = AuthService::new(
            store.clone(),
            sessions,
            tokens,
            policy.clone(),
            audit.clone(),
            config.accounts.require_email_verification,
        );
        let admin_service =
            AdminService::new(store.clone(), profile_registry.clone(), policy, audit);

        let limiter = |l: RateLimit| create_ip_rate_limiter(l.attempts, l.window_seconds);
        let limits = config.rate_limit.clone();

        Self {
            login_rate_limiter: limiter(limits.login),
            register_rate_limiter: limiter(limits.register),
            password_reset_rate_limiter: limiter(limits.password_reset),
            verification_resend_rate_limiter: limiter(limits.verification_resend),
            ip_rate_limiter: limiter(limits.global_ip),
            config,
            store,
            blacklist,
            jwt,
            auth_service,
            profile_registry,
            admin_service,
            metrics,
        }
    }
}

fn capability_routes(capability: Capability, routes: Router<AppState>) -> Router<AppState> {
    routes.route_layer(from_fn(move |req: Request, next: Next| {
        middleware::require_capability(capability, req, next)
    }))
}

fn rate_limited(limiter: IpRateLimiter, routes: Router<AppState>) -> Router<AppState> {
    routes.layer(from_fn_with_state(limiter, ip_rate_limit_middleware))
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    // Public routes with their own per-IP limits
    let limited_routes = Router::new()
        .merge(rate_limited(
            state.register_rate_limiter.clone(),
            Router::new().route("/auth/register", post(handlers::auth::register)),
        ))
        .merge(rate_limited(
            state.login_rate_limiter.clone(),
            Router::new().route("/auth/login", post(handlers::auth::login)),
        ))
        .merge(rate_limited(
            state.password_reset_rate_limiter.clone(),
            Router::new().route(
                "/auth/password-reset",
                post(handlers::auth::request_password_reset),
            ),
        ))
        .merge(rate_limited(
            state.verification_resend_rate_limiter.clone(),
            Router::new().route(
                "/auth/verify-email/resend",
                post(handlers::auth::resend_verification),
            ),
        ));

    let admin_routes = Router::new()
        .merge(capability_routes(
            Capability::ManageUsers,
            Router::new()
                .route("/admin/users", post(handlers::admin::create_admin_user))
                .route("/admin/users/:user_id/role", put(handlers::admin::assign_role)),
        ))
        .merge(capability_routes(
            Capability::ManageStaff,
            Router::new()
                .route(
                    "/admin/users/:user_id/staff-role",
                    put(handlers::admin::assign_staff_role)
                        .delete(handlers::admin::remove_staff_role),
                )
                .route(
                    "/admin/users/:user_id/capabilities",
                    get(handlers::admin::get_capabilities),
                ),
        ))
        .merge(capability_routes(
            Capability::ViewAuditLog,
            Router::new().route("/admin/audit-events", get(handlers::admin::list_audit_events)),
        ));

    let authenticated_routes = Router::new()
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/sessions", get(handlers::auth::list_sessions))
        .route(
            "/auth/sessions/:session_id",
            delete(handlers::auth::terminate_session),
        )
        .route("/auth/change-password", post(handlers::auth::change_password))
        .route("/auth/delete-account", post(handlers::auth::delete_account))
        .route("/users/me", get(handlers::account::get_me))
        .route("/users/me/profile", post(handlers::account::create_profile))
        .route(
            "/users/me/profile/patient",
            get(handlers::account::get_patient_profile)
                .patch(handlers::account::update_patient_profile),
        )
        .route(
            "/users/me/profile/doctor",
            get(handlers::account::get_doctor_profile)
                .patch(handlers::account::update_doctor_profile),
        )
        .route(
            "/users/me/phones",
            get(handlers::account::list_phones).post(handlers::account::add_phone),
        )
        .route(
            "/users/me/phones/:phone_id/primary",
            post(handlers::account::set_primary_phone),
        )
        .route(
            "/users/me/phones/:phone_id",
            delete(handlers::account::delete_phone),
        )
        .merge(admin_routes)
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let mut app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(handlers::metrics::metrics));

    let swagger_enabled = match state.config.environment {
        Environment::Dev => true,
        Environment::Prod => state.config.swagger.enabled != SwaggerMode::Disabled,
    };

    if swagger_enabled {
        app =
            app.merge(SwaggerUi::new("/docs").url("/.well-known/openapi.json", ApiDoc::openapi()));
    } else {
        app = app.route(
            "/.well-known/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        );
    }

    let allowed_origins = state
        .config
        .security
        .allowed_origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::error!("Invalid CORS origin '{}': {}. Skipping.", o, e);
                None
            }
        })
        .collect::<Vec<HeaderValue>>();

    let app = app
        .route("/auth/verify-email/:token", get(handlers::auth::verify_email))
        .route("/auth/token/refresh", post(handlers::auth::refresh))
        .route("/auth/token/revoke", post(handlers::auth::revoke))
        .route(
            "/auth/password-reset/confirm/:token",
            post(handlers::auth::confirm_password_reset),
        )
        .merge(limited_routes)
        .merge(authenticated_routes)
        .with_state(state.clone())
        // Global IP rate limiting
        .layer(from_fn_with_state(
            state.ip_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ))
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &service_core::axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(allowed_origins)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
        );

    Ok(app)
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 500, description = "A dependency is down")
    ),
    tag = "Observability"
)]
pub async fn health_check(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    state.store.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Postgres health check failed");
        AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
    })?;

    state.blacklist.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Redis health check failed");
        AppError::CacheError(e)
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "postgres": "up",
            "redis": "up"
        }
    })))
}
