use rootcause::Report;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wg_portal_access::{AuthenticatorRegistry, MemorySessionStore, SessionStore};
use wg_portal_server::{
    app,
    auth::{
        AppState, ProviderFactory,
        db::{PgSessionStore, PgUserBackend},
    },
    config::{ServerConfig, SessionBackend},
    error::StartupError,
    session::SessionLayer,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(err) = run().await {
        tracing::error!(error = %err, "server stopped");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Report<StartupError>> {
    let config = ServerConfig::load().map_err(|e| {
        tracing::error!(error = %e, "invalid configuration");
        StartupError::Configuration
    })?;
    let cookie_key = config
        .core
        .cookie_key()
        .map_err(|e| e.context(StartupError::Configuration))?;
    tracing::info!("Loaded configuration");

    // Create database connection pool
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to connect to database");
            StartupError::Database
        })?;

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to run migrations");
            StartupError::Database
        })?;

    let sessions: Arc<dyn SessionStore> = match config.session.backend {
        SessionBackend::Memory => Arc::new(MemorySessionStore::new(config.session.lifetime())),
        SessionBackend::Database => Arc::new(PgSessionStore::new(
            db_pool.clone(),
            chrono::Duration::minutes(config.session.duration_minutes),
        )),
    };
    spawn_session_cleanup(sessions.clone(), config.session.cleanup_interval());

    tracing::info!("Setting up authentication providers...");
    let factory = ProviderFactory::new().map_err(|e| e.context(StartupError::Authentication))?;
    let registry = AuthenticatorRegistry::setup(&config.auth, &config.core.external_url, &factory)
        .await
        .map_err(|e| e.context(StartupError::Authentication))?;

    let backend = Arc::new(PgUserBackend::new(db_pool));
    let state = Arc::new(AppState::new(registry, backend, config.web));
    let session_layer = SessionLayer::new(sessions, cookie_key, &config.session);
    let router = app::router(state, session_layer);

    let addr = config.core.listening_address;
    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
        tracing::error!(error = %e, "failed to bind to address");
        StartupError::Serve {
            address: addr.clone(),
        }
    })?;

    tracing::info!("listening on http://{}", addr);

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "server error");
            StartupError::Serve { address: addr }
        })?;

    Ok(())
}

/// Periodically removes expired sessions from the store.
fn spawn_session_cleanup(store: Arc<dyn SessionStore>, period: std::time::Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            match store.delete_expired().await {
                Ok(count) if count > 0 => {
                    tracing::debug!(deleted_sessions = count, "Periodic session cleanup");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to cleanup expired sessions");
                }
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
