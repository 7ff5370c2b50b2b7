//! The access control gate.
//!
//! The gate decides, from the current session alone, whether a protected
//! operation may run. There are two states:
//!
//! - `UNAUTHENTICATED`: no usable token bundle. The operation is not
//!   invoked and the caller must send the browser to login. A bundle whose
//!   `expires_at` has passed counts as unusable, so a session stops being
//!   authenticated when the provider-issued access token expires even if
//!   the browser stays active.
//! - `AUTHENTICATED`: the operation is invoked with read access to the
//!   session's token bundle.
//!
//! The gate is fail-closed: a missing session, an idle or expired session,
//! or a malformed bundle all evaluate to `UNAUTHENTICATED`.

use chrono::{DateTime, Duration, Utc};
use oidc_gate_core::SessionId;
use std::fmt;
use std::future::Future;

use crate::error::UnauthorizedError;
use crate::session::Session;
use crate::token::TokenBundle;

/// Read-only view of an authenticated session handed to protected operations.
#[derive(Debug, Clone)]
pub struct AuthenticatedSession {
    session_id: SessionId,
    tokens: TokenBundle,
}

impl AuthenticatedSession {
    /// Returns the session ID.
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Returns the session's token bundle.
    #[must_use]
    pub fn tokens(&self) -> &TokenBundle {
        &self.tokens
    }

    /// Returns a human-readable name for the subject, if the claims carry one.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.tokens.display_name()
    }
}

/// Why a session is not authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnauthenticatedReason {
    /// No session accompanied the request.
    NoSession,
    /// The session has never completed a login (or has logged out).
    NoTokens,
    /// The session has been idle past the configured timeout.
    IdleExpired,
    /// The access token has expired.
    TokenExpired,
    /// The token bundle cannot be presented as a credential.
    MalformedToken,
}

impl fmt::Display for UnauthenticatedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::NoSession => "no session",
            Self::NoTokens => "no tokens",
            Self::IdleExpired => "session idle timeout",
            Self::TokenExpired => "access token expired",
            Self::MalformedToken => "malformed token bundle",
        };
        f.write_str(reason)
    }
}

/// Result of evaluating a session.
#[derive(Debug, Clone)]
pub enum Authentication {
    /// The session holds a usable token bundle.
    Authenticated(Box<AuthenticatedSession>),
    /// The session must log in before accessing protected resources.
    Unauthenticated(UnauthenticatedReason),
}

impl Authentication {
    /// Returns the authenticated view, if any.
    #[must_use]
    pub fn authenticated(&self) -> Option<&AuthenticatedSession> {
        match self {
            Self::Authenticated(session) => Some(session.as_ref()),
            Self::Unauthenticated(_) => None,
        }
    }

    /// Converts into the authenticated view or an `UnauthorizedError`.
    ///
    /// # Errors
    ///
    /// Returns `UnauthorizedError` if the session is not authenticated.
    pub fn require(self) -> Result<AuthenticatedSession, UnauthorizedError> {
        match self {
            Self::Authenticated(session) => Ok(*session),
            Self::Unauthenticated(UnauthenticatedReason::MalformedToken) => {
                Err(UnauthorizedError::MalformedToken {
                    reason: UnauthenticatedReason::MalformedToken.to_string(),
                })
            }
            Self::Unauthenticated(_) => Err(UnauthorizedError::NotAuthenticated),
        }
    }
}

/// Outcome of a guarded operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome<T> {
    /// The operation ran and produced a value.
    Allowed(T),
    /// The operation did not run; the browser must log in.
    LoginRequired(UnauthenticatedReason),
}

/// Decides whether sessions may access protected operations.
///
/// A session is authenticated only while it holds tokens, has not been
/// idle for the configured timeout, and its access token has not reached
/// `expires_at`. Expiry yields [`UnauthenticatedReason::TokenExpired`];
/// there is no refresh, the browser logs in again.
#[derive(Debug, Clone)]
pub struct AccessGate {
    idle_timeout: Duration,
}

impl AccessGate {
    /// Creates a gate that rejects sessions idle for `idle_timeout` or longer.
    #[must_use]
    pub fn new(idle_timeout: Duration) -> Self {
        Self { idle_timeout }
    }

    /// Returns the idle timeout.
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Evaluates a session at the current time.
    #[must_use]
    pub fn evaluate(&self, session: Option<&Session>) -> Authentication {
        self.evaluate_at(session, Utc::now())
    }

    /// Evaluates a session at `now`.
    #[must_use]
    pub fn evaluate_at(&self, session: Option<&Session>, now: DateTime<Utc>) -> Authentication {
        let Some(session) = session else {
            return Authentication::Unauthenticated(UnauthenticatedReason::NoSession);
        };
        let Some(tokens) = session.tokens() else {
            return Authentication::Unauthenticated(UnauthenticatedReason::NoTokens);
        };
        if session.is_idle(self.idle_timeout, now) {
            return Authentication::Unauthenticated(UnauthenticatedReason::IdleExpired);
        }
        if tokens.is_expired_at(now) {
            return Authentication::Unauthenticated(UnauthenticatedReason::TokenExpired);
        }
        if tokens.check_well_formed().is_err() {
            return Authentication::Unauthenticated(UnauthenticatedReason::MalformedToken);
        }

        Authentication::Authenticated(Box::new(AuthenticatedSession {
            session_id: session.id().clone(),
            tokens: tokens.clone(),
        }))
    }

    /// Runs `operation` only if the session is authenticated.
    pub fn guard<T, F>(&self, session: Option<&Session>, operation: F) -> GateOutcome<T>
    where
        F: FnOnce(&AuthenticatedSession) -> T,
    {
        match self.evaluate(session) {
            Authentication::Authenticated(auth) => GateOutcome::Allowed(operation(auth.as_ref())),
            Authentication::Unauthenticated(reason) => {
                tracing::debug!(%reason, "gate denied protected operation");
                GateOutcome::LoginRequired(reason)
            }
        }
    }

    /// Runs the asynchronous `operation` only if the session is authenticated.
    pub async fn guard_async<T, F, Fut>(
        &self,
        session: Option<&Session>,
        operation: F,
    ) -> GateOutcome<T>
    where
        F: FnOnce(AuthenticatedSession) -> Fut,
        Fut: Future<Output = T>,
    {
        match self.evaluate(session) {
            Authentication::Authenticated(auth) => GateOutcome::Allowed(operation(*auth).await),
            Authentication::Unauthenticated(reason) => {
                tracing::debug!(%reason, "gate denied protected operation");
                GateOutcome::LoginRequired(reason)
            }
        }
    }
}
