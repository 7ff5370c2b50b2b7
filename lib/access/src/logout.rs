//! Logout coordination.

use rootcause::Report;
use url::Url;

use crate::config::ProviderConfig;
use crate::error::ConfigError;
use crate::session::Session;

/// Builds the provider logout URL: `{logout_url}?returnTo={return_to}&client_id={client_id}`.
///
/// # Errors
///
/// Returns a `ConfigError` if the configured logout endpoint is not an
/// absolute URL.
pub fn logout_url(config: &ProviderConfig, return_to: &str) -> Result<Url, Report<ConfigError>> {
    let mut url = Url::parse(&config.logout_url()).map_err(|e| ConfigError::Invalid {
        field: "logout_url",
        reason: e.to_string(),
    })?;
    url.query_pairs_mut()
        .append_pair("returnTo", return_to)
        .append_pair("client_id", config.client_id());
    Ok(url)
}

/// Logs a session out and returns where to send the browser.
///
/// The token bundle is dropped before the URL is built, so the session is
/// unauthenticated even if building the redirect fails.
///
/// # Errors
///
/// Returns a `ConfigError` if the logout URL cannot be built.
pub fn logout(
    session: &mut Session,
    config: &ProviderConfig,
    return_to: &str,
) -> Result<Url, Report<ConfigError>> {
    let was_authenticated = session.is_authenticated();
    session.clear();
    tracing::info!(
        session = ?session.id(),
        was_authenticated,
        "session logged out"
    );
    logout_url(config, return_to)
}
