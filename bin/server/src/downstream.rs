//! Bearer-authenticated calls to the downstream API.
//!
//! Protected calls present the session's access token as
//! `Authorization: {token_type} {access_token}`. A request is never sent
//! with a missing or malformed credential; public calls carry no
//! credentials at all.

use axum::body::Bytes;
use axum::http::{HeaderValue, StatusCode, header};
use oidc_gate_access::{ConfigError, TokenBundle, UnauthorizedError};
use rootcause::Report;
use std::fmt;
use std::time::Duration;
use tracing::instrument;
use url::Url;

use crate::config::DownstreamConfig;

/// Downstream call errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownstreamError {
    /// No usable credential; the request was not sent.
    Unauthorized(UnauthorizedError),
    /// The path does not form a valid URL against the base.
    InvalidPath { path: String, reason: String },
    /// The request could not be completed.
    RequestFailed { reason: String },
}

impl fmt::Display for DownstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthorized(e) => write!(f, "downstream call not authorized: {e}"),
            Self::InvalidPath { path, reason } => {
                write!(f, "invalid downstream path '{path}': {reason}")
            }
            Self::RequestFailed { reason } => write!(f, "downstream request failed: {reason}"),
        }
    }
}

impl std::error::Error for DownstreamError {}

/// A buffered downstream response.
#[derive(Debug, Clone)]
pub struct DownstreamResponse {
    pub status: StatusCode,
    pub content_type: Option<HeaderValue>,
    pub body: Bytes,
}

/// Client for the downstream API.
#[derive(Debug, Clone)]
pub struct DownstreamClient {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl DownstreamClient {
    /// Creates a client for the configured base URL.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the base URL is invalid.
    pub fn new(
        http: reqwest::Client,
        config: &DownstreamConfig,
    ) -> Result<Self, Report<ConfigError>> {
        let mut base_url = Url::parse(&config.base_url).map_err(|e| ConfigError::Invalid {
            field: "downstream.base_url",
            reason: e.to_string(),
        })?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            http,
            base_url,
            timeout: Duration::from_secs(config.timeout_seconds),
        })
    }

    /// Resolves a path against the base URL.
    ///
    /// # Errors
    ///
    /// Returns `DownstreamError::InvalidPath` if the result is not a valid URL.
    pub fn url(&self, path: &str) -> Result<Url, Report<DownstreamError>> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| {
                DownstreamError::InvalidPath {
                    path: path.to_string(),
                    reason: e.to_string(),
                }
                .into()
            })
    }

    /// Calls a protected endpoint with the session's bearer credential.
    ///
    /// # Errors
    ///
    /// Returns `DownstreamError::Unauthorized` without sending anything if
    /// `tokens` is absent or malformed, and `RequestFailed` if the call fails.
    #[instrument(skip(self, tokens))]
    pub async fn get(
        &self,
        tokens: Option<&TokenBundle>,
        path: &str,
    ) -> Result<DownstreamResponse, Report<DownstreamError>> {
        let tokens = tokens.ok_or(DownstreamError::Unauthorized(
            UnauthorizedError::NotAuthenticated,
        ))?;
        let credential = tokens
            .authorization_header()
            .map_err(DownstreamError::Unauthorized)?;
        let mut credential = HeaderValue::from_str(&credential).map_err(|e| {
            DownstreamError::Unauthorized(UnauthorizedError::MalformedToken {
                reason: e.to_string(),
            })
        })?;
        credential.set_sensitive(true);

        self.send(path, Some(credential)).await
    }

    /// Calls a public endpoint without credentials.
    ///
    /// # Errors
    ///
    /// Returns `RequestFailed` if the call fails.
    #[instrument(skip(self))]
    pub async fn get_public(&self, path: &str) -> Result<DownstreamResponse, Report<DownstreamError>> {
        self.send(path, None).await
    }

    async fn send(
        &self,
        path: &str,
        credential: Option<HeaderValue>,
    ) -> Result<DownstreamResponse, Report<DownstreamError>> {
        let url = self.url(path)?;
        let mut request = self.http.get(url).timeout(self.timeout);
        if let Some(credential) = credential {
            request = request.header(header::AUTHORIZATION, credential);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DownstreamError::RequestFailed {
                reason: e.to_string(),
            })?;
        let status = response.status();
        let content_type = response.headers().get(header::CONTENT_TYPE).cloned();
        let body = response
            .bytes()
            .await
            .map_err(|e| DownstreamError::RequestFailed {
                reason: e.to_string(),
            })?;

        tracing::debug!(status = status.as_u16(), "downstream responded");
        Ok(DownstreamResponse {
            status,
            content_type,
            body,
        })
    }
}
