use oidc_gate_access::{MemorySessionStore, SessionStore};
use oidc_gate_server::{app, auth::AppState, config::ServerConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = ServerConfig::from_env().expect("failed to load configuration");
    tracing::info!("Loaded configuration");

    let http_client = reqwest::Client::builder()
        .timeout(config.http_timeout())
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("failed to create HTTP client");

    let sessions: Arc<dyn SessionStore> = match config.session.max_sessions {
        Some(limit) => Arc::new(MemorySessionStore::with_capacity_limit(limit)),
        None => Arc::new(MemorySessionStore::new()),
    };

    // Spawn periodic session cleanup task
    app::spawn_session_purge(
        Arc::clone(&sessions),
        config.session.idle_timeout(),
        Duration::from_secs(config.session.cleanup_interval_seconds),
    );

    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(config, http_client, sessions).expect("invalid configuration");

    // Discovery is retried on first login if the provider is down now
    tracing::info!("Discovering OIDC provider...");
    match state.oidc_client.metadata().await {
        Ok(metadata) => {
            tracing::info!(issuer = metadata.issuer().as_str(), "OIDC provider ready")
        }
        Err(e) => {
            tracing::warn!(error = %e.current_context(), "OIDC discovery failed; login unavailable until it succeeds");
        }
    }

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("failed to bind to address");

    tracing::info!("listening on http://{}", bind_addr);

    axum::serve(listener, app::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
