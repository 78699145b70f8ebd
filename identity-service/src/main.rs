use identity_service::{
    build_router,
    config::IdentityConfig,
    db,
    services::{EmailService, JwtService, PgStore, RedisService},
    AppState,
};
use service_core::error::AppError;
use service_core::observability::{init_tracing, install_prometheus_recorder};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Load configuration - fail fast if invalid
    let config = IdentityConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    )?;
    let metrics = install_prometheus_recorder()?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting identity service"
    );

    let pool = db::create_pool(&config.database).await?;
    db::run_migrations(&pool).await?;
    let store = Arc::new(PgStore::new(pool));

    let redis = RedisService::new(&config.redis)
        .await
        .map_err(AppError::CacheError)?;
    tracing::info!("Redis service initialized");

    let email = Arc::new(EmailService::new(&config.smtp)?);

    let jwt = JwtService::new(&config.jwt).map_err(AppError::ConfigError)?;

    let state = AppState::new(
        config.clone(),
        store,
        Arc::new(redis),
        email,
        jwt,
        Some(metrics),
    );
    tracing::info!("Services and rate limiters initialized");

    if let Some(bootstrap) = &config.bootstrap_admin {
        let created = state
            .admin_service
            .ensure_bootstrap_superuser(&bootstrap.email, &bootstrap.password)
            .await?;
        if created {
            tracing::info!("Bootstrap superuser provisioned");
        }
    }

    let app = build_router(state).await?;

    let addr = config.common.socket_addr();

    let service_span = tracing::info_span!(
        "service",
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
    );
    let _guard = service_span.enter();

    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    service_core::axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
