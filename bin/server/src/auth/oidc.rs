//! OIDC client implementation using the openidconnect crate.

use chrono::Utc;
use oidc_gate_access::{
    AuthorizationRequest, DiscoveryError, ProviderConfig, TokenBundle, TokenExchangeError,
};
use openidconnect::core::{
    CoreClient, CoreErrorResponseType, CoreProviderMetadata, CoreTokenResponse, CoreTokenType,
};
use openidconnect::{
    AuthType, AuthorizationCode, ClientId, OAuth2TokenResponse, PkceCodeVerifier, RedirectUrl,
    RequestTokenError, StandardErrorResponse, TokenResponse,
};
use rootcause::Report;
use std::sync::Arc;
use tracing::instrument;

use super::discovery::ProviderMetadataResolver;
use super::id_token::verify_id_token;

/// OIDC client for authenticating users.
#[derive(Debug)]
pub struct OidcClient {
    config: ProviderConfig,
    http: reqwest::Client,
    resolver: ProviderMetadataResolver,
}

impl OidcClient {
    /// Creates a client; provider metadata is resolved lazily on first use.
    #[must_use]
    pub fn new(config: ProviderConfig, http: reqwest::Client) -> Self {
        let resolver = ProviderMetadataResolver::new(http.clone(), config.issuer_url());
        Self {
            config,
            http,
            resolver,
        }
    }

    /// Returns the provider configuration.
    #[must_use]
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Returns the provider metadata, fetching it on first use.
    ///
    /// # Errors
    ///
    /// Returns a `DiscoveryError` if the provider cannot be discovered.
    pub async fn metadata(&self) -> Result<Arc<CoreProviderMetadata>, Report<DiscoveryError>> {
        self.resolver.resolve().await
    }

    /// Exchanges an authorization code for a token bundle.
    ///
    /// Sends the PKCE verifier from `request` and verifies any returned ID
    /// token against the request's nonce. Not retried on failure.
    ///
    /// # Errors
    ///
    /// Returns a `TokenExchangeError` if the provider is unavailable, rejects
    /// the code, or returns a malformed or unverifiable response.
    #[instrument(skip_all)]
    pub async fn exchange_code(
        &self,
        code: &str,
        request: &AuthorizationRequest,
    ) -> Result<TokenBundle, Report<TokenExchangeError>> {
        let metadata = self
            .resolver
            .resolve()
            .await
            .map_err(|e| TokenExchangeError::ProviderUnavailable {
                reason: e.current_context().to_string(),
            })?;

        let redirect_url = RedirectUrl::new(request.redirect_uri().to_string()).map_err(|e| {
            TokenExchangeError::RequestFailed {
                reason: format!("invalid redirect URI: {e}"),
            }
        })?;
        let client = CoreClient::from_provider_metadata(
            metadata.as_ref().clone(),
            ClientId::new(self.config.client_id().to_string()),
            Some(self.config.client_secret().clone()),
        )
        .set_auth_type(AuthType::RequestBody)
        .set_redirect_uri(redirect_url);

        let token_request = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .map_err(|_| TokenExchangeError::MissingField {
                field: "token_endpoint",
            })?;

        let token_response = token_request
            .set_pkce_verifier(PkceCodeVerifier::new(request.pkce_verifier().to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| {
                let err = exchange_error(e);
                tracing::warn!(error = %err, "token exchange failed");
                err
            })?;

        let access_token = token_response.access_token().secret();
        if access_token.is_empty() {
            return Err(TokenExchangeError::MissingField {
                field: "access_token",
            }
            .into());
        }
        let expires_at = expires_at(&token_response)?;

        let userinfo = match token_response.id_token() {
            Some(id_token) => {
                verify_id_token(id_token, request.nonce(), &self.config, &self.resolver).await?
            }
            None => Default::default(),
        };

        tracing::info!(
            has_id_token = token_response.id_token().is_some(),
            has_refresh_token = token_response.refresh_token().is_some(),
            expires_in = token_response.expires_in().map(|d| d.as_secs()),
            "token exchange succeeded"
        );

        Ok(
            TokenBundle::new(access_token.clone(), token_type(&token_response))
                .with_id_token(token_response.id_token().map(ToString::to_string))
                .with_refresh_token(token_response.refresh_token().map(|t| t.secret().clone()))
                .with_expires_at(expires_at)
                .with_scope(token_response.scopes().map(|scopes| {
                    scopes
                        .iter()
                        .map(|s| s.as_str())
                        .collect::<Vec<_>>()
                        .join(" ")
                }))
                .with_userinfo(userinfo),
        )
    }
}

/// Converts `expires_in` to an absolute instant, rejecting lifetimes that
/// cannot be represented.
fn expires_at(
    response: &CoreTokenResponse,
) -> Result<Option<chrono::DateTime<Utc>>, Report<TokenExchangeError>> {
    let Some(lifetime) = response.expires_in() else {
        return Ok(None);
    };
    chrono::Duration::from_std(lifetime)
        .ok()
        .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
        .map(Some)
        .ok_or_else(|| {
            TokenExchangeError::MalformedResponse {
                reason: format!("expires_in of {}s is out of range", lifetime.as_secs()),
            }
            .into()
        })
}

fn token_type(response: &CoreTokenResponse) -> String {
    match response.token_type() {
        CoreTokenType::Bearer => "Bearer".to_string(),
        CoreTokenType::Mac => "MAC".to_string(),
        CoreTokenType::Extension(other) => other.clone(),
    }
}

fn exchange_error<RE>(
    err: RequestTokenError<RE, StandardErrorResponse<CoreErrorResponseType>>,
) -> TokenExchangeError
where
    RE: std::error::Error + 'static,
{
    match err {
        RequestTokenError::ServerResponse(response) => TokenExchangeError::Rejected {
            error: response.error().to_string(),
        },
        RequestTokenError::Request(e) => TokenExchangeError::RequestFailed {
            reason: e.to_string(),
        },
        RequestTokenError::Parse(e, _) => TokenExchangeError::MalformedResponse {
            reason: e.to_string(),
        },
        RequestTokenError::Other(reason) => TokenExchangeError::MalformedResponse { reason },
    }
}
