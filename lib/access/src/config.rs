//! Identity provider configuration.
//!
//! This module provides the relying-party view of the external OIDC
//! identity provider (e.g., Auth0, Keycloak, Authentik). The configuration
//! is loaded once at startup and shared read-only afterwards.

use oauth2::ClientSecret;
use rootcause::Report;
use serde::{Deserialize, Deserializer};
use url::Url;

use crate::error::ConfigError;

/// Configuration for the OIDC identity provider.
///
/// Fields with defaults can be omitted when loading from environment variables.
/// The client secret is wrapped so it never shows up in `Debug` output.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// The provider domain (e.g., "tenant.example.com").
    /// A full `http(s)://` origin is also accepted.
    domain: String,
    /// The OAuth2 client ID registered with the provider.
    client_id: String,
    /// The OAuth2 client secret.
    #[serde(deserialize_with = "deserialize_secret")]
    client_secret: ClientSecret,
    /// The redirect URI for the OAuth2 callback (e.g., "https://app.example.com/auth/callback").
    redirect_uri: String,
    /// OAuth2 scopes to request, separated by commas or whitespace.
    /// Default: "openid,profile,email"
    #[serde(default = "default_scopes")]
    scopes: String,
    /// API audience to request an access token for.
    #[serde(default)]
    audience: Option<String>,
    /// Override for the issuer identifier.
    /// Default: "https://{domain}/"
    #[serde(default)]
    issuer: Option<String>,
    /// How the provider returns the authorization response: `query` or
    /// `form_post`. The provider default applies when unset.
    #[serde(default)]
    response_mode: Option<String>,
    /// Override for the provider logout endpoint.
    /// Default: "https://{domain}/v2/logout"
    #[serde(default)]
    logout_url: Option<String>,
}

fn default_scopes() -> String {
    "openid,profile,email".to_string()
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<ClientSecret, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(ClientSecret::new)
}

impl ProviderConfig {
    /// Creates a new provider configuration with defaults for optional fields.
    #[must_use]
    pub fn new(
        domain: String,
        client_id: String,
        client_secret: String,
        redirect_uri: String,
    ) -> Self {
        Self {
            domain,
            client_id,
            client_secret: ClientSecret::new(client_secret),
            redirect_uri,
            scopes: default_scopes(),
            audience: None,
            issuer: None,
            response_mode: None,
            logout_url: None,
        }
    }

    /// Creates a configuration builder for more customization.
    #[must_use]
    pub fn builder(
        domain: String,
        client_id: String,
        client_secret: String,
        redirect_uri: String,
    ) -> ProviderConfigBuilder {
        ProviderConfigBuilder::new(domain, client_id, client_secret, redirect_uri)
    }

    /// Returns the provider domain as configured.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Returns the OAuth2 client ID.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Returns the OAuth2 client secret.
    #[must_use]
    pub fn client_secret(&self) -> &ClientSecret {
        &self.client_secret
    }

    /// Returns the OAuth2 redirect URI.
    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Returns the requested scopes in configuration order, without duplicates.
    #[must_use]
    pub fn scopes(&self) -> Vec<&str> {
        let mut scopes: Vec<&str> = Vec::new();
        for scope in self
            .scopes
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
        {
            if !scopes.contains(&scope) {
                scopes.push(scope);
            }
        }
        scopes
    }

    /// Returns the API audience, if configured.
    #[must_use]
    pub fn audience(&self) -> Option<&str> {
        self.audience.as_deref().filter(|a| !a.is_empty())
    }

    /// Returns the provider origin, e.g. "https://tenant.example.com".
    #[must_use]
    pub fn origin(&self) -> String {
        let domain = self.domain.trim_end_matches('/');
        if domain.starts_with("https://") || domain.starts_with("http://") {
            domain.to_string()
        } else {
            format!("https://{domain}")
        }
    }

    /// Returns the issuer identifier ID tokens must carry, e.g.
    /// "https://tenant.example.com/".
    #[must_use]
    pub fn issuer_url(&self) -> String {
        self.issuer
            .clone()
            .filter(|i| !i.is_empty())
            .unwrap_or_else(|| format!("{}/", self.origin()))
    }

    /// Returns the URL of the OIDC discovery document, derived from the issuer.
    #[must_use]
    pub fn discovery_url(&self) -> String {
        format!(
            "{}/.well-known/openid-configuration",
            self.issuer_url().trim_end_matches('/')
        )
    }

    /// Returns the requested response mode, if configured.
    #[must_use]
    pub fn response_mode(&self) -> Option<&str> {
        self.response_mode.as_deref().filter(|m| !m.is_empty())
    }

    /// Returns the provider logout endpoint.
    #[must_use]
    pub fn logout_url(&self) -> String {
        self.logout_url
            .clone()
            .unwrap_or_else(|| format!("{}/v2/logout", self.origin()))
    }

    /// Checks that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` naming the first missing or invalid field.
    pub fn validate(&self) -> Result<(), Report<ConfigError>> {
        if self.domain.trim().is_empty() {
            return Err(ConfigError::Missing { field: "domain" }.into());
        }
        if self.client_id.trim().is_empty() {
            return Err(ConfigError::Missing { field: "client_id" }.into());
        }
        if self.client_secret.secret().is_empty() {
            return Err(ConfigError::Missing {
                field: "client_secret",
            }
            .into());
        }
        if self.redirect_uri.trim().is_empty() {
            return Err(ConfigError::Missing {
                field: "redirect_uri",
            }
            .into());
        }
        parse_absolute("redirect_uri", &self.redirect_uri)?;
        parse_absolute("issuer", &self.issuer_url())?;
        parse_absolute("logout_url", &self.logout_url())?;

        if let Some(mode) = self.response_mode() {
            if !matches!(mode, "query" | "form_post") {
                return Err(ConfigError::Invalid {
                    field: "response_mode",
                    reason: format!("unsupported response mode '{mode}'"),
                }
                .into());
            }
        }

        if !self.scopes().contains(&"openid") {
            return Err(ConfigError::Invalid {
                field: "scopes",
                reason: "the openid scope is required".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

fn parse_absolute(field: &'static str, value: &str) -> Result<Url, Report<ConfigError>> {
    Url::parse(value).map_err(|e| {
        ConfigError::Invalid {
            field,
            reason: e.to_string(),
        }
        .into()
    })
}

/// Builder for `ProviderConfig`.
#[derive(Debug)]
pub struct ProviderConfigBuilder {
    domain: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    scopes: Vec<String>,
    audience: Option<String>,
    issuer: Option<String>,
    response_mode: Option<String>,
    logout_url: Option<String>,
}

impl ProviderConfigBuilder {
    /// Creates a new builder with required fields.
    #[must_use]
    pub fn new(
        domain: String,
        client_id: String,
        client_secret: String,
        redirect_uri: String,
    ) -> Self {
        Self {
            domain,
            client_id,
            client_secret,
            redirect_uri,
            scopes: vec![
                "openid".to_string(),
                "profile".to_string(),
                "email".to_string(),
            ],
            audience: None,
            issuer: None,
            response_mode: None,
            logout_url: None,
        }
    }

    /// Sets the OAuth2 scopes to request.
    #[must_use]
    pub fn scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Adds a scope to the list of scopes to request.
    #[must_use]
    pub fn add_scope(mut self, scope: String) -> Self {
        if !self.scopes.contains(&scope) {
            self.scopes.push(scope);
        }
        self
    }

    /// Sets the API audience.
    #[must_use]
    pub fn audience(mut self, audience: String) -> Self {
        self.audience = Some(audience);
        self
    }

    /// Overrides the issuer identifier.
    #[must_use]
    pub fn issuer(mut self, issuer: String) -> Self {
        self.issuer = Some(issuer);
        self
    }

    /// Sets the response mode (`query` or `form_post`).
    #[must_use]
    pub fn response_mode(mut self, mode: String) -> Self {
        self.response_mode = Some(mode);
        self
    }

    /// Overrides the provider logout endpoint.
    #[must_use]
    pub fn logout_url(mut self, url: String) -> Self {
        self.logout_url = Some(url);
        self
    }

    /// Builds the `ProviderConfig`.
    #[must_use]
    pub fn build(self) -> ProviderConfig {
        ProviderConfig {
            domain: self.domain,
            client_id: self.client_id,
            client_secret: ClientSecret::new(self.client_secret),
            redirect_uri: self.redirect_uri,
            scopes: self.scopes.join(","),
            audience: self.audience,
            issuer: self.issuer,
            response_mode: self.response_mode,
            logout_url: self.logout_url,
        }
    }
}
