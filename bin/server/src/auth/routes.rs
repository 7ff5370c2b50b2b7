//! Authentication routes for login, callback, and logout.

use axum::{
    Extension, Form,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::{
    PrivateCookieJar,
    cookie::{Cookie, SameSite},
};
use oidc_gate_access::{
    AuthorizationRequest, Session, SessionId, TokenExchangeError, build_authorization_url,
};
use serde::Deserialize;
use time::Duration as TimeDuration;

use super::{
    AppState,
    middleware::{CurrentSession, SessionCookie, found},
};
use crate::error::AppError;

/// Auth state cookie name (carries the pending login attempt).
const AUTH_STATE_COOKIE: &str = "auth_state";

/// Parameters the provider sends to the callback, by query or form post.
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Initiates the OIDC login flow by redirecting to the identity provider.
pub async fn login(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
) -> Result<impl IntoResponse, AppError> {
    let metadata = state
        .oidc_client
        .metadata()
        .await
        .map_err(|e| AppError::Discovery {
            details: e.current_context().to_string(),
        })?;

    let config = state.oidc_client.config();
    let request = AuthorizationRequest::new(config);
    let auth_url = build_authorization_url(
        config,
        metadata.authorization_endpoint().as_str(),
        &request,
    )
    .map_err(|e| AppError::Config {
            details: e.current_context().to_string(),
        })?;

    let pending = serde_json::to_string(&request).map_err(|e| AppError::LoginFailed {
        details: format!("failed to encode login state: {e}"),
    })?;
    let cookie = auth_state_cookie(pending, state.config.session.secure_cookies);

    tracing::debug!("redirecting to identity provider");
    Ok((jar.add(cookie), found(auth_url.as_str())))
}

/// Builds the cookie carrying a pending login attempt.
///
/// A `form_post` callback is a cross-site POST, which browsers only send
/// `SameSite=None` cookies with, and `None` is only honored on Secure
/// cookies. Plain-HTTP deployments fall back to `Lax` and support query
/// callbacks only.
fn auth_state_cookie(pending: String, secure: bool) -> Cookie<'static> {
    let same_site = if secure { SameSite::None } else { SameSite::Lax };
    Cookie::build((AUTH_STATE_COOKIE, pending))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(same_site)
        .max_age(TimeDuration::minutes(10))
        .build()
}

/// Handles the OIDC callback delivered as a query string.
pub async fn callback(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    jar: PrivateCookieJar,
    Query(params): Query<CallbackParams>,
) -> Response {
    finish_login(state, session, jar, params).await
}

/// Handles the OIDC callback delivered as a form post.
pub async fn callback_form(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    jar: PrivateCookieJar,
    Form(params): Form<CallbackParams>,
) -> Response {
    finish_login(state, session, jar, params).await
}

/// Consumes the pending login attempt and completes it.
///
/// The `auth_state` cookie is removed whatever the outcome, so a callback
/// can be processed at most once.
async fn finish_login(
    state: AppState,
    session: Session,
    jar: PrivateCookieJar,
    params: CallbackParams,
) -> Response {
    let pending = jar.get(AUTH_STATE_COOKIE);
    let jar = jar.remove(Cookie::build(AUTH_STATE_COOKIE).path("/"));

    match complete_login(&state, session, pending, params).await {
        Ok(response) => (jar, response).into_response(),
        Err(e) => (jar, e).into_response(),
    }
}

async fn complete_login(
    state: &AppState,
    session: Session,
    pending: Option<Cookie<'static>>,
    params: CallbackParams,
) -> Result<Response, AppError> {
    if let Some(error) = params.error {
        tracing::warn!(
            error = %error,
            has_description = params.error_description.is_some(),
            "identity provider returned an error"
        );
        return Err(AppError::LoginFailed {
            details: format!("provider error: {error}"),
        });
    }

    let request: AuthorizationRequest = pending
        .and_then(|cookie| serde_json::from_str(cookie.value()).ok())
        .ok_or(AppError::MissingAuthState)?;

    if !request.matches_state(params.state.as_deref().unwrap_or_default()) {
        return Err(AppError::StateMismatch);
    }

    let code = params
        .code
        .filter(|code| !code.is_empty())
        .ok_or_else(|| AppError::LoginFailed {
            details: "missing authorization code".to_string(),
        })?;

    let tokens = state
        .oidc_client
        .exchange_code(&code, &request)
        .await
        .map_err(|e| match e.current_context() {
            TokenExchangeError::ProviderUnavailable { reason } => AppError::Discovery {
                details: reason.clone(),
            },
            other => AppError::LoginFailed {
                details: other.to_string(),
            },
        })?;

    // The pre-login session ID is never reused once tokens are attached.
    let new_id = SessionId::generate().map_err(|e| AppError::Storage {
        details: e.to_string(),
    })?;
    let mut authenticated = Session::new(new_id.clone());
    authenticated.materialize(tokens);
    state
        .sessions
        .save(&authenticated)
        .await
        .map_err(|e| AppError::Storage {
            details: e.current_context().to_string(),
        })?;
    if let Err(e) = state.sessions.remove(session.id()).await {
        tracing::warn!(error = %e.current_context(), "failed to remove pre-login session");
    }

    tracing::info!(session = ?new_id, "login completed");
    Ok((Extension(SessionCookie::Set(new_id)), Redirect::to("/")).into_response())
}

/// Logs out: clears the local session, then redirects to the provider's
/// logout endpoint.
pub async fn logout(
    State(state): State<AppState>,
    CurrentSession(mut session): CurrentSession,
) -> Result<Response, AppError> {
    let logout_url = oidc_gate_access::logout(
        &mut session,
        state.oidc_client.config(),
        &state.config.logout_return_url(),
    );

    if let Err(e) = state.sessions.remove(session.id()).await {
        tracing::warn!(error = %e.current_context(), "failed to remove session; storing it cleared");
        if let Err(e) = state.sessions.save(&session).await {
            tracing::error!(error = %e.current_context(), "failed to clear session");
        }
    }

    let logout_url = logout_url.map_err(|e| AppError::Config {
        details: e.current_context().to_string(),
    })?;
    Ok((
        Extension(SessionCookie::Clear),
        found(logout_url.as_str()),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_state_cookie_survives_cross_site_post_when_secure() {
        let cookie = auth_state_cookie("pending".to_string(), true);

        assert_eq!(cookie.same_site(), Some(SameSite::None));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.http_only(), Some(true));
    }

    #[test]
    fn auth_state_cookie_stays_lax_without_https() {
        let cookie = auth_state_cookie("pending".to_string(), false);

        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.secure(), Some(false));
    }
}
