//! oidc-gate web server.
//!
//! This crate provides the HTTP surface of the relying party: the login,
//! callback and logout routes, the session and access gate layers, and the
//! downstream API proxy.

pub mod app;
pub mod auth;
pub mod config;
pub mod content;
pub mod downstream;
pub mod error;
