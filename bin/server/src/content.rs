//! Application content: home, public and private pages, and the downstream
//! API proxy routes.

use axum::{
    Extension, Json,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use oidc_gate_access::AuthenticatedSession;
use rootcause::Report;
use serde::Serialize;

use crate::auth::{AppState, AuthRejection, CurrentSession, RequireAuth};
use crate::downstream::{DownstreamError, DownstreamResponse};
use crate::error::AppError;

/// Display fields of the signed-in user. Token material is never included.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct UserSummary {
    pub name: Option<String>,
    pub email: Option<String>,
    pub picture: Option<String>,
}

/// Home page payload.
#[derive(Debug, Serialize)]
pub struct HomeView {
    pub authenticated: bool,
    pub user: Option<UserSummary>,
}

impl UserSummary {
    fn from_session(auth: &AuthenticatedSession) -> Self {
        let tokens = auth.tokens();
        Self {
            name: auth.display_name().map(str::to_string),
            email: tokens.claim_str("email").map(str::to_string),
            picture: tokens.claim_str("picture").map(str::to_string),
        }
    }
}

/// Shows whether the browser is logged in.
pub async fn home(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
) -> Json<HomeView> {
    let auth = state.gate.evaluate(Some(&session));
    let user = auth.authenticated().map(UserSummary::from_session);
    Json(HomeView {
        authenticated: user.is_some(),
        user,
    })
}

/// Content anyone can see.
pub async fn public() -> &'static str {
    "Hello from a public endpoint! You don't need to be authenticated to see this."
}

/// Content only a logged-in browser can see.
pub async fn private(RequireAuth(auth): RequireAuth) -> String {
    let name = auth.display_name().unwrap_or("there");
    format!("Hello, {name}! You need to be authenticated to see this.")
}

/// Proxies the downstream public endpoint without credentials.
pub async fn api_public(State(state): State<AppState>) -> Response {
    proxy(state.downstream.get_public("/api/public").await)
}

/// Proxies the downstream private endpoint with the session's bearer token.
pub async fn api_private(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedSession>,
) -> Response {
    proxy(
        state
            .downstream
            .get(Some(auth.tokens()), "/api/private")
            .await,
    )
}

/// Proxies the downstream scoped endpoint with the session's bearer token.
pub async fn api_private_scoped(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedSession>,
) -> Response {
    proxy(
        state
            .downstream
            .get(Some(auth.tokens()), "/api/private-scoped")
            .await,
    )
}

/// Liveness check.
pub async fn health() -> &'static str {
    "ok"
}

fn proxy(result: Result<DownstreamResponse, Report<DownstreamError>>) -> Response {
    match result {
        Ok(downstream) => {
            let mut response = (downstream.status, downstream.body).into_response();
            if let Some(content_type) = downstream.content_type {
                response
                    .headers_mut()
                    .insert(header::CONTENT_TYPE, content_type);
            }
            response
        }
        Err(e) => match e.current_context() {
            DownstreamError::Unauthorized(_) => AuthRejection::LoginRequired.into_response(),
            other => AppError::Downstream {
                details: other.to_string(),
            }
            .into_response(),
        },
    }
}
