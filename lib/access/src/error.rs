//! Error types for the access crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `ConfigError`: Missing or invalid static configuration (fatal at startup)
//! - `DiscoveryError`: Provider metadata unreachable or malformed
//! - `TokenExchangeError`: Authorization code exchange failures
//! - `UnauthorizedError`: Protected operations attempted without a valid session
//! - `SessionStorageError`: Session store failures (treated as unauthorized)
//!
//! None of the variants carry token material or provider error
//! descriptions.

use std::fmt;

/// Errors from static configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required setting is absent or empty.
    Missing { field: &'static str },
    /// A setting is present but unusable.
    Invalid { field: &'static str, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { field } => {
                write!(f, "missing required configuration: {field}")
            }
            Self::Invalid { field, reason } => {
                write!(f, "invalid configuration for {field}: {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Errors from resolving the provider's discovery document or key set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    /// The request could not be sent or timed out.
    Unreachable { url: String, reason: String },
    /// The provider answered with a non-success status.
    UnexpectedStatus { url: String, status: u16 },
    /// The body was not valid JSON of the expected shape.
    Malformed { url: String, reason: String },
    /// A required metadata field is absent.
    MissingField { field: &'static str },
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreachable { url, reason } => {
                write!(f, "provider metadata at {url} unreachable: {reason}")
            }
            Self::UnexpectedStatus { url, status } => {
                write!(f, "provider metadata at {url} returned status {status}")
            }
            Self::Malformed { url, reason } => {
                write!(f, "provider metadata at {url} is malformed: {reason}")
            }
            Self::MissingField { field } => {
                write!(f, "provider metadata is missing required field: {field}")
            }
        }
    }
}

impl std::error::Error for DiscoveryError {}

/// Errors from exchanging an authorization code for tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenExchangeError {
    /// Provider metadata needed for the exchange could not be resolved.
    ProviderUnavailable { reason: String },
    /// The token request could not be sent or timed out.
    RequestFailed { reason: String },
    /// The token endpoint answered with an OAuth2 error response.
    ///
    /// `error` is the OAuth2 error code, e.g. `invalid_grant`.
    Rejected { error: String },
    /// The response body was not valid JSON.
    MalformedResponse { reason: String },
    /// A required field is absent from the response.
    MissingField { field: &'static str },
    /// The ID token failed signature or claim verification.
    InvalidIdToken { reason: String },
}

impl fmt::Display for TokenExchangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProviderUnavailable { reason } => {
                write!(f, "provider unavailable for token exchange: {reason}")
            }
            Self::RequestFailed { reason } => {
                write!(f, "token request failed: {reason}")
            }
            Self::Rejected { error } => {
                write!(f, "token endpoint rejected code: {error}")
            }
            Self::MalformedResponse { reason } => {
                write!(f, "malformed token response: {reason}")
            }
            Self::MissingField { field } => {
                write!(f, "token response is missing required field: {field}")
            }
            Self::InvalidIdToken { reason } => {
                write!(f, "ID token verification failed: {reason}")
            }
        }
    }
}

impl std::error::Error for TokenExchangeError {}

/// Errors from attempting a protected operation without valid credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnauthorizedError {
    /// The session carries no token bundle.
    NotAuthenticated,
    /// The token bundle cannot be presented as a credential.
    MalformedToken { reason: String },
}

impl fmt::Display for UnauthorizedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAuthenticated => write!(f, "session is not authenticated"),
            Self::MalformedToken { reason } => {
                write!(f, "session token is unusable: {reason}")
            }
        }
    }
}

impl std::error::Error for UnauthorizedError {}

/// Errors from the session store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStorageError {
    /// The store refused a new session because it is full.
    CapacityExceeded { capacity: usize },
    /// A fresh session ID could not be generated.
    IdGeneration { reason: String },
    /// The backing store failed.
    Backend { reason: String },
}

impl fmt::Display for SessionStorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapacityExceeded { capacity } => {
                write!(f, "session store is full ({capacity} sessions)")
            }
            Self::IdGeneration { reason } => {
                write!(f, "session id generation failed: {reason}")
            }
            Self::Backend { reason } => write!(f, "session store error: {reason}"),
        }
    }
}

impl std::error::Error for SessionStorageError {}
