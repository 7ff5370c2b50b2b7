//! Router assembly and background tasks.

use axum::{Router, middleware, routing::get};
use oidc_gate_access::SessionStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use crate::auth::{self, AppState};
use crate::content;

/// Builds the application router.
///
/// Every route except `/health` runs inside the session layer. The
/// `/api/private*` routes additionally sit behind the access gate layer;
/// `/private` is gated by its extractor.
pub fn router(state: AppState) -> Router {
    let protected_api = Router::new()
        .route("/api/private", get(content::api_private))
        .route("/api/private-scoped", get(content::api_private_scoped))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    Router::new()
        .route("/", get(content::home))
        .route("/public", get(content::public))
        .route("/private", get(content::private))
        .route("/api/public", get(content::api_public))
        .route("/auth/login", get(auth::login))
        .route(
            "/auth/callback",
            get(auth::callback).post(auth::callback_form),
        )
        .route("/auth/logout", get(auth::logout))
        .merge(protected_api)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::ensure_session,
        ))
        .route("/health", get(content::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Periodically removes idle sessions from the store.
pub fn spawn_session_purge(
    sessions: Arc<dyn SessionStore>,
    idle_timeout: chrono::Duration,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            match sessions.purge_idle(idle_timeout).await {
                Ok(count) if count > 0 => {
                    tracing::debug!(purged_sessions = count, "Periodic session cleanup");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e.current_context(), "Failed to purge idle sessions");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use oidc_gate_access::{MemorySessionStore, Session, SessionId};

    #[tokio::test]
    async fn purge_task_removes_idle_sessions() {
        let store = Arc::new(MemorySessionStore::new());
        let mut stale = Session::new(SessionId::generate().expect("generate"));
        stale.touch(chrono::Utc::now() - chrono::Duration::hours(1));
        let fresh = Session::new(SessionId::generate().expect("generate"));
        store.save(&stale).await.expect("save");
        store.save(&fresh).await.expect("save");

        let handle = spawn_session_purge(
            store.clone(),
            chrono::Duration::minutes(30),
            Duration::from_millis(10),
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        assert!(store.load(stale.id()).await.expect("load").is_none());
        assert!(store.load(fresh.id()).await.expect("load").is_some());
    }
}
