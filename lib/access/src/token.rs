//! Token bundles obtained from the provider's token endpoint.
//!
//! A [`TokenBundle`] is the unit a session authenticates with. Secret
//! fields are held in oauth2's redacting newtypes and the bundle has no
//! `Serialize` impl.

use chrono::{DateTime, Utc};
use oauth2::{AccessToken, RefreshToken};
use serde_json::{Map, Value};

use crate::error::UnauthorizedError;

/// Claim name → value, taken from the verified ID token.
pub type Userinfo = Map<String, Value>;

/// A raw, already-verified ID token JWT.
#[derive(Clone)]
pub struct RawIdToken(String);

impl RawIdToken {
    /// Wraps a raw ID token.
    #[must_use]
    pub fn new(token: String) -> Self {
        Self(token)
    }

    /// Returns the encoded JWT.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for RawIdToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RawIdToken([redacted])")
    }
}

/// Tokens and identity claims from a completed code exchange.
#[derive(Debug, Clone)]
pub struct TokenBundle {
    access_token: AccessToken,
    token_type: String,
    id_token: Option<RawIdToken>,
    refresh_token: Option<RefreshToken>,
    expires_at: Option<DateTime<Utc>>,
    scope: Option<String>,
    userinfo: Userinfo,
}

impl TokenBundle {
    /// Creates a bundle from an access token and its type.
    #[must_use]
    pub fn new(access_token: String, token_type: String) -> Self {
        Self {
            access_token: AccessToken::new(access_token),
            token_type,
            id_token: None,
            refresh_token: None,
            expires_at: None,
            scope: None,
            userinfo: Userinfo::new(),
        }
    }

    /// Sets the raw ID token.
    #[must_use]
    pub fn with_id_token(mut self, id_token: Option<String>) -> Self {
        self.id_token = id_token.map(RawIdToken::new);
        self
    }

    /// Sets the refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: Option<String>) -> Self {
        self.refresh_token = refresh_token.map(RefreshToken::new);
        self
    }

    /// Sets when the access token expires.
    #[must_use]
    pub fn with_expires_at(mut self, expires_at: Option<DateTime<Utc>>) -> Self {
        self.expires_at = expires_at;
        self
    }

    /// Sets the scope granted by the provider.
    #[must_use]
    pub fn with_scope(mut self, scope: Option<String>) -> Self {
        self.scope = scope;
        self
    }

    /// Sets the identity claims.
    #[must_use]
    pub fn with_userinfo(mut self, userinfo: Userinfo) -> Self {
        self.userinfo = userinfo;
        self
    }

    /// Returns the access token.
    #[must_use]
    pub fn access_token(&self) -> &AccessToken {
        &self.access_token
    }

    /// Returns the token type (e.g., "Bearer").
    #[must_use]
    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    /// Returns the raw ID token, if the provider issued one.
    #[must_use]
    pub fn id_token(&self) -> Option<&RawIdToken> {
        self.id_token.as_ref()
    }

    /// Returns the refresh token, if the provider issued one.
    #[must_use]
    pub fn refresh_token(&self) -> Option<&RefreshToken> {
        self.refresh_token.as_ref()
    }

    /// Returns when the access token expires, if known.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Returns the scope granted by the provider, if reported.
    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Returns the identity claims.
    #[must_use]
    pub fn userinfo(&self) -> &Userinfo {
        &self.userinfo
    }

    /// Returns a string claim from the userinfo map.
    #[must_use]
    pub fn claim_str(&self, claim: &str) -> Option<&str> {
        self.userinfo.get(claim).and_then(Value::as_str)
    }

    /// Returns a human-readable name for the subject.
    ///
    /// Prefers `name`, then `nickname`, `preferred_username`, `email`, and
    /// finally `sub`.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        ["name", "nickname", "preferred_username", "email", "sub"]
            .iter()
            .find_map(|claim| self.claim_str(claim).filter(|v| !v.is_empty()))
    }

    /// Returns true if the access token has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    /// Checks the bundle can be presented as a credential.
    ///
    /// # Errors
    ///
    /// Returns `UnauthorizedError::MalformedToken` if the access token or
    /// token type is empty or contains characters not allowed in a header.
    pub fn check_well_formed(&self) -> Result<(), UnauthorizedError> {
        let access_token = self.access_token.secret();
        if access_token.is_empty() {
            return Err(UnauthorizedError::MalformedToken {
                reason: "empty access token".to_string(),
            });
        }
        if self.token_type.is_empty() {
            return Err(UnauthorizedError::MalformedToken {
                reason: "empty token type".to_string(),
            });
        }
        if !is_header_safe(&self.token_type) || self.token_type.contains(' ') {
            return Err(UnauthorizedError::MalformedToken {
                reason: "token type is not a valid scheme".to_string(),
            });
        }
        if !is_header_safe(access_token) {
            return Err(UnauthorizedError::MalformedToken {
                reason: "access token contains invalid characters".to_string(),
            });
        }
        Ok(())
    }

    /// Returns the `Authorization` header value: `{token_type} {access_token}`.
    ///
    /// # Errors
    ///
    /// Returns `UnauthorizedError::MalformedToken` if the bundle is not
    /// well-formed.
    pub fn authorization_header(&self) -> Result<String, UnauthorizedError> {
        self.check_well_formed()?;
        Ok(format!("{} {}", self.token_type, self.access_token.secret()))
    }
}

fn is_header_safe(value: &str) -> bool {
    value.bytes().all(|b| b.is_ascii_graphic() || b == b' ')
}
