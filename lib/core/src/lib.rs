//! Core types and utilities for the oidc-gate authentication gateway.
//!
//! This crate provides the foundational pieces shared by the access layer
//! and the server: the rootcause-backed `Result` alias and the opaque
//! session identifier.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{GenerateIdError, ParseIdError, SessionId};
