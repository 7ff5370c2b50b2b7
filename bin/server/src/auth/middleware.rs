//! Session and authentication middleware and extractors for Axum.
//!
//! [`ensure_session`] wraps every browser-facing route: it loads the session
//! named by the encrypted `session` cookie and threads it to handlers as
//! [`CurrentSession`]. Browsers without a stored session get a transient
//! anonymous one that is neither stored nor given a cookie; only a completed
//! login puts a session in the store. Protected
//! routes then pass through the access gate, either via the
//! [`require_auth`] layer or the [`RequireAuth`] extractor.

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{StatusCode, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::{
    PrivateCookieJar,
    cookie::{Cookie, SameSite},
};
use chrono::Utc;
use oidc_gate_access::{AuthenticatedSession, GateOutcome, Session, SessionId};

use super::AppState;
use crate::error::AppError;

/// Session cookie name.
pub const SESSION_COOKIE: &str = "session";

/// Where unauthenticated browsers are sent.
pub const LOGIN_PATH: &str = "/auth/login";

/// The session attached to the current request.
#[derive(Debug, Clone)]
pub struct CurrentSession(pub Session);

impl<S> FromRequestParts<S> for CurrentSession
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentSession>()
            .cloned()
            .ok_or_else(|| AppError::Storage {
                details: "session layer is not installed".to_string(),
            })
    }
}

/// Instruction from a handler to replace or drop the session cookie.
///
/// Handlers return it as `Extension(SessionCookie::...)`; [`ensure_session`]
/// applies it after the handler runs.
#[derive(Debug, Clone)]
pub enum SessionCookie {
    /// Point the cookie at a different session.
    Set(SessionId),
    /// Remove the cookie.
    Clear,
}

/// Builds a 302 redirect.
pub fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

fn session_cookie(id: &SessionId, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, id.as_str().to_string()))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

/// Loads the browser session for every request.
///
/// A missing, undecryptable or unknown cookie, an idle session, or a failed
/// storage read all yield a transient unauthenticated session. Activity on a
/// stored session is recorded with [`SessionStore::touch`], so a request
/// racing a logout cannot write the removed session back.
///
/// [`SessionStore::touch`]: oidc_gate_access::SessionStore::touch
pub async fn ensure_session(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let now = Utc::now();
    let cookie_id = jar
        .get(SESSION_COOKIE)
        .and_then(|cookie| cookie.value().parse::<SessionId>().ok());

    let loaded = match &cookie_id {
        Some(id) => match state.sessions.load(id).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(session = ?id, error = %e.current_context(), "session lookup failed");
                None
            }
        },
        None => None,
    };

    let loaded = match loaded {
        Some(session) if session.is_idle(state.gate.idle_timeout(), now) => {
            tracing::debug!(session = ?session.id(), "discarding idle session");
            if let Err(e) = state.sessions.remove(session.id()).await {
                tracing::warn!(error = %e.current_context(), "failed to remove idle session");
            }
            None
        }
        other => other,
    };

    let active = match loaded {
        Some(mut session) => match state.sessions.touch(session.id(), now).await {
            Ok(true) => {
                session.touch(now);
                Some(session)
            }
            Ok(false) => {
                tracing::debug!(session = ?session.id(), "session ended by a concurrent request");
                None
            }
            Err(e) => {
                tracing::warn!(session = ?session.id(), error = %e.current_context(), "session touch failed");
                session.touch(now);
                Some(session)
            }
        },
        None => None,
    };

    let stale_cookie = cookie_id.is_some() && active.is_none();
    let session = match active {
        Some(session) => session,
        None => match SessionId::generate() {
            Ok(id) => Session::new(id),
            Err(e) => {
                return AppError::Storage {
                    details: e.to_string(),
                }
                .into_response();
            }
        },
    };
    request.extensions_mut().insert(CurrentSession(session));

    let mut response = next.run(request).await;

    let secure = state.config.session.secure_cookies;
    let jar = match response.extensions_mut().remove::<SessionCookie>() {
        Some(SessionCookie::Set(id)) => jar.add(session_cookie(&id, secure)),
        Some(SessionCookie::Clear) => jar.remove(Cookie::build(SESSION_COOKIE).path("/")),
        None if stale_cookie => jar.remove(Cookie::build(SESSION_COOKIE).path("/")),
        None => return response,
    };
    (jar, response).into_response()
}

/// Gate layer for protected routers.
///
/// Unauthenticated requests are redirected to login without reaching the
/// inner handler. Authenticated requests carry an [`AuthenticatedSession`]
/// extension.
pub async fn require_auth(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    mut request: Request,
    next: Next,
) -> Response {
    let outcome = state
        .gate
        .guard_async(Some(&session), |auth| async move {
            request.extensions_mut().insert(auth);
            next.run(request).await
        })
        .await;

    match outcome {
        GateOutcome::Allowed(response) => response,
        GateOutcome::LoginRequired(_) => AuthRejection::LoginRequired.into_response(),
    }
}

/// Extractor for requiring an authenticated session.
///
/// If the session is not authenticated, the browser is redirected to login.
pub struct RequireAuth(pub AuthenticatedSession);

impl<S> FromRequestParts<S> for RequireAuth
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        let session = parts
            .extensions
            .get::<CurrentSession>()
            .map(|current| &current.0);

        app_state
            .gate
            .evaluate(session)
            .require()
            .map(RequireAuth)
            .map_err(|e| {
                tracing::debug!(reason = %e, "authentication required");
                AuthRejection::LoginRequired
            })
    }
}

/// Rejection type for authentication extractors.
#[derive(Debug)]
pub enum AuthRejection {
    LoginRequired,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::LoginRequired => found(LOGIN_PATH),
        }
    }
}
