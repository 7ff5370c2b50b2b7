//! Server-side browser sessions.
//!
//! A session is created empty when a browser first connects and is keyed
//! by an opaque [`SessionId`] carried in an encrypted cookie. It is either
//! unauthenticated (no tokens) or holds exactly one complete
//! [`TokenBundle`]; there is no intermediate state.

use chrono::{DateTime, Duration, Utc};
use oidc_gate_core::SessionId;

use crate::token::TokenBundle;

/// A browser session.
#[derive(Debug, Clone)]
pub struct Session {
    /// Unique identifier for this session.
    id: SessionId,
    /// Tokens from the last successful login, if any.
    tokens: Option<TokenBundle>,
    /// When the session was created.
    created_at: DateTime<Utc>,
    /// When the session was last used by a request.
    last_seen_at: DateTime<Utc>,
}

impl Session {
    /// Creates a new, unauthenticated session.
    #[must_use]
    pub fn new(id: SessionId) -> Self {
        let now = Utc::now();
        Self {
            id,
            tokens: None,
            created_at: now,
            last_seen_at: now,
        }
    }

    /// Returns the session ID.
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Returns the token bundle, if the session is authenticated.
    #[must_use]
    pub fn tokens(&self) -> Option<&TokenBundle> {
        self.tokens.as_ref()
    }

    /// Returns true if the session holds a token bundle.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.tokens.is_some()
    }

    /// Returns when the session was created.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns when the session was last used.
    #[must_use]
    pub fn last_seen_at(&self) -> DateTime<Utc> {
        self.last_seen_at
    }

    /// Stores a token bundle, replacing any previous one.
    pub fn materialize(&mut self, tokens: TokenBundle) {
        self.tokens = Some(tokens);
    }

    /// Drops the token bundle, returning the session to unauthenticated.
    pub fn clear(&mut self) {
        self.tokens = None;
    }

    /// Records activity at `now`.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_seen_at = now;
    }

    /// Returns true if the session has been idle for at least `idle_timeout`.
    #[must_use]
    pub fn is_idle(&self, idle_timeout: Duration, now: DateTime<Utc>) -> bool {
        now - self.last_seen_at >= idle_timeout
    }
}
