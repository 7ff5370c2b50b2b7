//! Sessions, tokens and access control for the oidc-gate relying party.
//!
//! This crate provides:
//! - Identity provider configuration (`ProviderConfig`)
//! - Authorization request construction (`AuthorizationRequest`, `build_authorization_url`)
//! - Token bundles obtained from a code exchange (`TokenBundle`)
//! - Server-side browser sessions and their storage (`Session`, `SessionStore`)
//! - The access control gate (`AccessGate`)
//! - Logout coordination (`logout`)
//!
//! It performs no network I/O; the server crate owns discovery, token
//! exchange and the HTTP surface.
//!
//! # Example
//!
//! ```
//! use chrono::Duration;
//! use oidc_gate_access::{AccessGate, GateOutcome, Session, SessionId, TokenBundle};
//!
//! let gate = AccessGate::new(Duration::minutes(30));
//! let mut session = Session::new(SessionId::generate().unwrap());
//!
//! // A fresh session must log in first.
//! assert!(matches!(
//!     gate.guard(Some(&session), |_| ()),
//!     GateOutcome::LoginRequired(_)
//! ));
//!
//! // After a successful code exchange the bundle is materialized.
//! session.materialize(TokenBundle::new("abc123".to_string(), "Bearer".to_string()));
//! let header = gate.guard(Some(&session), |auth| auth.tokens().authorization_header());
//! assert!(matches!(header, GateOutcome::Allowed(Ok(h)) if h == "Bearer abc123"));
//! ```

pub mod authorize;
pub mod config;
pub mod error;
pub mod gate;
pub mod logout;
pub mod session;
pub mod store;
pub mod token;

// Re-export main types at crate root
pub use authorize::{AuthorizationRequest, build_authorization_url};
pub use config::{ProviderConfig, ProviderConfigBuilder};
pub use error::{
    ConfigError, DiscoveryError, SessionStorageError, TokenExchangeError, UnauthorizedError,
};
pub use gate::{
    AccessGate, AuthenticatedSession, Authentication, GateOutcome, UnauthenticatedReason,
};
pub use logout::{logout, logout_url};
pub use oidc_gate_core::SessionId;
pub use session::Session;
pub use store::{MemorySessionStore, SessionStore};
pub use token::{RawIdToken, TokenBundle, Userinfo};
