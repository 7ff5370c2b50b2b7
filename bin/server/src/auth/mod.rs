//! Authentication for the oidc-gate server.
//!
//! This module provides:
//! - Provider discovery, token exchange and ID token verification
//! - Encrypted-cookie browser sessions backed by a [`SessionStore`]
//! - Authentication middleware/extractors for Axum routes
//!
//! # Session Model
//!
//! The browser holds only an opaque session ID in a private (encrypted and
//! authenticated) cookie. Tokens stay server-side in the session store and
//! are never sent to the browser. Browsers that have not logged in get a
//! transient session that is never stored; a completed login stores a fresh
//! session holding the token bundle and points the cookie at it.

pub mod discovery;
pub mod id_token;
pub mod middleware;
pub mod oidc;
pub mod routes;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use oidc_gate_access::{AccessGate, ConfigError, SessionStore};
use rootcause::Report;
use std::sync::Arc;

use crate::config::ServerConfig;
use crate::downstream::DownstreamClient;

pub use discovery::ProviderMetadataResolver;
pub use middleware::{
    AuthRejection, CurrentSession, RequireAuth, SessionCookie, ensure_session, require_auth,
};
pub use oidc::OidcClient;
pub use routes::{callback, callback_form, login, logout};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// OIDC client for authentication.
    pub oidc_client: Arc<OidcClient>,
    /// Session storage.
    pub sessions: Arc<dyn SessionStore>,
    /// Access control gate.
    pub gate: AccessGate,
    /// Client for the downstream API.
    pub downstream: Arc<DownstreamClient>,
    cookie_key: Key,
}

impl AppState {
    /// Creates a new application state.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the cookie key or downstream URL is invalid.
    pub fn new(
        config: ServerConfig,
        http: reqwest::Client,
        sessions: Arc<dyn SessionStore>,
    ) -> Result<Self, Report<ConfigError>> {
        let cookie_key = config.cookie_key()?;
        let downstream = DownstreamClient::new(http.clone(), &config.downstream)?;
        let oidc_client = OidcClient::new(config.oidc.clone(), http);
        let gate = AccessGate::new(config.session.idle_timeout());

        Ok(Self {
            config: Arc::new(config),
            oidc_client: Arc::new(oidc_client),
            sessions,
            gate,
            downstream: Arc::new(downstream),
            cookie_key,
        })
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}
