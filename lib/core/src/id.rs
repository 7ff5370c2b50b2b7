//! Opaque session identifiers.
//!
//! Session IDs are 256 bits drawn from the operating system's CSPRNG and
//! encoded as unpadded base64url, so they are safe to place in cookies
//! and cannot be guessed or enumerated.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use std::fmt;
use std::str::FromStr;

/// Number of random bytes in a session ID.
const SESSION_ID_BYTES: usize = 32;

/// Length of the base64url encoding of [`SESSION_ID_BYTES`] bytes.
const SESSION_ID_ENCODED_LEN: usize = 43;

/// Error returned when parsing an ID from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    /// The reason for the parse failure.
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {}: {}", self.id_type, self.reason)
    }
}

impl std::error::Error for ParseIdError {}

/// Error returned when the system random source is unavailable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateIdError {
    /// The reason reported by the random source.
    pub reason: String,
}

impl fmt::Display for GenerateIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to generate session id: {}", self.reason)
    }
}

impl std::error::Error for GenerateIdError {}

/// Unique, unguessable identifier for a browser session.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Generates a fresh random session ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the operating system random source fails.
    pub fn generate() -> Result<Self, GenerateIdError> {
        let mut bytes = [0u8; SESSION_ID_BYTES];
        getrandom::fill(&mut bytes).map_err(|e| GenerateIdError {
            reason: e.to_string(),
        })?;
        Ok(Self(URL_SAFE_NO_PAD.encode(bytes)))
    }

    /// Returns the session ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a short prefix suitable for log correlation.
    ///
    /// The full ID is a bearer credential and is never logged.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.0[..8]
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({}..)", self.fingerprint())
    }
}

impl FromStr for SessionId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != SESSION_ID_ENCODED_LEN {
            return Err(ParseIdError {
                id_type: "SessionId",
                reason: format!("expected {SESSION_ID_ENCODED_LEN} characters, got {}", s.len()),
            });
        }
        if let Some(c) = s
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(ParseIdError {
                id_type: "SessionId",
                reason: format!("invalid character '{c}'"),
            });
        }
        Ok(Self(s.to_string()))
    }
}
