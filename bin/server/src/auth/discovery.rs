//! Provider metadata discovery and JWKS caching.
//!
//! Metadata comes from `{issuer}/.well-known/openid-configuration` via
//! openidconnect's discovery, which also loads the provider's JWKS. The
//! result is cached for the life of the process. A failed fetch is not
//! cached, so the next login retries. A token signed with a key the cached
//! set does not hold triggers [`ProviderMetadataResolver::refresh_jwks`].

use oidc_gate_access::DiscoveryError;
use openidconnect::core::{CoreJsonWebKeySet, CoreProviderMetadata};
use openidconnect::IssuerUrl;
use rootcause::Report;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::instrument;

/// Resolves and caches provider metadata and signing keys.
pub struct ProviderMetadataResolver {
    http: reqwest::Client,
    issuer: String,
    metadata: RwLock<Option<Arc<CoreProviderMetadata>>>,
}

impl ProviderMetadataResolver {
    /// Creates a resolver for the given issuer identifier.
    #[must_use]
    pub fn new(http: reqwest::Client, issuer: String) -> Self {
        Self {
            http,
            issuer,
            metadata: RwLock::new(None),
        }
    }

    /// Returns the issuer identifier metadata is discovered from.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Returns the provider metadata, fetching it on first use.
    ///
    /// # Errors
    ///
    /// Returns a `DiscoveryError` if the document or key set cannot be
    /// fetched, fails validation, or lacks a token endpoint.
    pub async fn resolve(&self) -> Result<Arc<CoreProviderMetadata>, Report<DiscoveryError>> {
        let cached = self.metadata.read().await.clone();
        if let Some(metadata) = cached {
            return Ok(metadata);
        }

        let metadata = Arc::new(self.discover().await?);
        *self.metadata.write().await = Some(Arc::clone(&metadata));
        Ok(metadata)
    }

    /// Refetches the provider's JWKS and caches metadata carrying the new set.
    ///
    /// # Errors
    ///
    /// Returns a `DiscoveryError` if the metadata or JWKS cannot be fetched.
    pub async fn refresh_jwks(&self) -> Result<Arc<CoreProviderMetadata>, Report<DiscoveryError>> {
        let metadata = self.resolve().await?;
        let jwks_uri = metadata.jwks_uri();
        let jwks = CoreJsonWebKeySet::fetch_async(jwks_uri, &self.http)
            .await
            .map_err(|e| discovery_error(jwks_uri.url().as_str(), e))?;
        tracing::debug!(keys = jwks.keys().len(), "fetched provider JWKS");

        let refreshed = Arc::new(metadata.as_ref().clone().set_jwks(jwks));
        *self.metadata.write().await = Some(Arc::clone(&refreshed));
        Ok(refreshed)
    }

    #[instrument(skip(self), fields(issuer = %self.issuer))]
    async fn discover(&self) -> Result<CoreProviderMetadata, Report<DiscoveryError>> {
        let issuer = IssuerUrl::new(self.issuer.clone()).map_err(|e| DiscoveryError::Malformed {
            url: self.issuer.clone(),
            reason: e.to_string(),
        })?;
        let discovery_url = format!(
            "{}/.well-known/openid-configuration",
            self.issuer.trim_end_matches('/')
        );

        let metadata = CoreProviderMetadata::discover_async(issuer, &self.http)
            .await
            .map_err(|e| discovery_error(&discovery_url, e))?;
        if metadata.token_endpoint().is_none() {
            return Err(DiscoveryError::MissingField {
                field: "token_endpoint",
            }
            .into());
        }

        tracing::info!(
            issuer = %metadata.issuer().as_str(),
            keys = metadata.jwks().keys().len(),
            "discovered identity provider"
        );
        Ok(metadata)
    }
}

fn discovery_error<RE>(url: &str, err: openidconnect::DiscoveryError<RE>) -> DiscoveryError
where
    RE: std::error::Error + 'static,
{
    let url = url.to_string();
    match err {
        openidconnect::DiscoveryError::Request(e) => DiscoveryError::Unreachable {
            url,
            reason: e.to_string(),
        },
        openidconnect::DiscoveryError::Response(status, _, _) if !status.is_success() => {
            DiscoveryError::UnexpectedStatus {
                url,
                status: status.as_u16(),
            }
        }
        other => DiscoveryError::Malformed {
            url,
            reason: other.to_string(),
        },
    }
}

impl std::fmt::Debug for ProviderMetadataResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderMetadataResolver")
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}
