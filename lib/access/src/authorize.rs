//! Authorization request construction.
//!
//! An [`AuthorizationRequest`] captures everything the relying party needs
//! to remember between redirecting the browser to the provider and handling
//! the callback: the CSRF `state`, the ID token `nonce`, and the PKCE
//! verifier. It is never stored server-side; the web layer round-trips it
//! through an encrypted, short-lived cookie.

use oauth2::{CsrfToken, PkceCodeChallenge, PkceCodeVerifier};
use openidconnect::Nonce;
use rootcause::Report;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::ProviderConfig;
use crate::error::ConfigError;

/// The only response type this relying party requests.
pub const RESPONSE_TYPE_CODE: &str = "code";

/// Per-attempt state of an authorization code login.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    redirect_uri: String,
    scopes: Vec<String>,
    audience: Option<String>,
    csrf_state: String,
    nonce: String,
    pkce_verifier: String,
}

impl AuthorizationRequest {
    /// Starts a new login attempt using the provider configuration.
    ///
    /// Generates fresh random `state`, `nonce` and PKCE verifier values.
    #[must_use]
    pub fn new(config: &ProviderConfig) -> Self {
        let (_, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        Self {
            redirect_uri: config.redirect_uri().to_string(),
            scopes: config.scopes().into_iter().map(str::to_string).collect(),
            audience: config.audience().map(str::to_string),
            csrf_state: CsrfToken::new_random().secret().clone(),
            nonce: Nonce::new_random().secret().clone(),
            pkce_verifier: pkce_verifier.secret().clone(),
        }
    }

    /// Returns the redirect URI the provider will call back.
    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Returns the requested scopes.
    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Returns the requested audience, if any.
    #[must_use]
    pub fn audience(&self) -> Option<&str> {
        self.audience.as_deref()
    }

    /// Returns the response type, always `code`.
    #[must_use]
    pub fn response_type(&self) -> &'static str {
        RESPONSE_TYPE_CODE
    }

    /// Returns the CSRF `state` value sent to the provider.
    #[must_use]
    pub fn csrf_state(&self) -> &str {
        &self.csrf_state
    }

    /// Returns the nonce the ID token must echo.
    #[must_use]
    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    /// Returns the PKCE verifier to present at the token endpoint.
    #[must_use]
    pub fn pkce_verifier(&self) -> &str {
        &self.pkce_verifier
    }

    /// Returns true if the callback `state` matches this request.
    #[must_use]
    pub fn matches_state(&self, state: &str) -> bool {
        let expected = self.csrf_state.as_bytes();
        let actual = state.as_bytes();
        expected.len() == actual.len()
            && expected
                .iter()
                .zip(actual)
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    }

    fn pkce_challenge(&self) -> PkceCodeChallenge {
        PkceCodeChallenge::from_code_verifier_sha256(&PkceCodeVerifier::new(
            self.pkce_verifier.clone(),
        ))
    }
}

impl std::fmt::Debug for AuthorizationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationRequest")
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("audience", &self.audience)
            .finish_non_exhaustive()
    }
}

/// Builds the provider authorization URL for a login attempt.
///
/// Appends `response_type`, `client_id`, `redirect_uri`, `scope`, the
/// optional `audience` and `response_mode`, `state`, `nonce` and the PKCE
/// challenge to the
/// authorize endpoint, preserving any query it already carries.
///
/// # Errors
///
/// Returns a `ConfigError` if the client ID or redirect URI is empty, or the
/// authorize endpoint is not an absolute URL.
pub fn build_authorization_url(
    config: &ProviderConfig,
    authorize_endpoint: &str,
    request: &AuthorizationRequest,
) -> Result<Url, Report<ConfigError>> {
    if config.client_id().is_empty() {
        return Err(ConfigError::Missing { field: "client_id" }.into());
    }
    if request.redirect_uri().is_empty() {
        return Err(ConfigError::Missing {
            field: "redirect_uri",
        }
        .into());
    }

    let mut url = Url::parse(authorize_endpoint).map_err(|e| ConfigError::Invalid {
        field: "authorization_endpoint",
        reason: e.to_string(),
    })?;

    let challenge = request.pkce_challenge();
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("response_type", request.response_type());
        query.append_pair("client_id", config.client_id());
        query.append_pair("redirect_uri", request.redirect_uri());
        query.append_pair("scope", &request.scopes().join(" "));
        if let Some(audience) = request.audience() {
            query.append_pair("audience", audience);
        }
        if let Some(mode) = config.response_mode() {
            query.append_pair("response_mode", mode);
        }
        query.append_pair("state", request.csrf_state());
        query.append_pair("nonce", request.nonce());
        query.append_pair("code_challenge", challenge.as_str());
        query.append_pair("code_challenge_method", "S256");
    }

    Ok(url)
}
