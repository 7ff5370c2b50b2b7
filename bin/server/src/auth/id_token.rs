//! ID token verification.
//!
//! Asymmetric tokens are verified against the provider JWKS, HMAC-signed
//! tokens against the client secret. Issuer, audience, expiry and nonce are
//! always checked; the verified claims become the session's userinfo.

use oidc_gate_access::{ProviderConfig, TokenExchangeError, Userinfo};
use openidconnect::core::{
    CoreIdToken, CoreIdTokenClaims, CoreIdTokenVerifier, CoreJwsSigningAlgorithm,
    CoreProviderMetadata,
};
use openidconnect::{ClaimsVerificationError, ClientId, Nonce, SignatureVerificationError};
use rootcause::Report;
use serde_json::Value;

use super::discovery::ProviderMetadataResolver;

const ALLOWED_ALGS: [CoreJwsSigningAlgorithm; 10] = [
    CoreJwsSigningAlgorithm::RsaSsaPkcs1V15Sha256,
    CoreJwsSigningAlgorithm::RsaSsaPkcs1V15Sha384,
    CoreJwsSigningAlgorithm::RsaSsaPkcs1V15Sha512,
    CoreJwsSigningAlgorithm::RsaSsaPssSha256,
    CoreJwsSigningAlgorithm::RsaSsaPssSha384,
    CoreJwsSigningAlgorithm::RsaSsaPssSha512,
    CoreJwsSigningAlgorithm::EcdsaP256Sha256,
    CoreJwsSigningAlgorithm::EcdsaP384Sha384,
    CoreJwsSigningAlgorithm::HmacSha256,
    CoreJwsSigningAlgorithm::HmacSha384,
];

/// Verifies an ID token and returns its claims.
///
/// A token signed with a key missing from the cached JWKS causes one
/// refetch of the key set before it is rejected.
///
/// # Errors
///
/// Returns `TokenExchangeError::InvalidIdToken` if the token is signed with
/// an unknown key or fails issuer, audience, expiry or nonce checks, and
/// `TokenExchangeError::ProviderUnavailable` if the metadata or JWKS cannot
/// be fetched.
pub async fn verify_id_token(
    id_token: &CoreIdToken,
    expected_nonce: &str,
    config: &ProviderConfig,
    resolver: &ProviderMetadataResolver,
) -> Result<Userinfo, Report<TokenExchangeError>> {
    let nonce = Nonce::new(expected_nonce.to_string());
    let metadata = resolver.resolve().await.map_err(unavailable)?;

    let claims = match verified_claims(id_token, &nonce, config, &metadata) {
        Err(ClaimsVerificationError::SignatureVerification(
            SignatureVerificationError::NoMatchingKey,
        )) => {
            tracing::info!("no cached signing key matches the ID token; refetching JWKS");
            let metadata = resolver.refresh_jwks().await.map_err(unavailable)?;
            verified_claims(id_token, &nonce, config, &metadata)
        }
        other => other,
    }
    .map_err(|e| invalid(e.to_string()))?;

    match serde_json::to_value(claims) {
        Ok(Value::Object(userinfo)) => Ok(userinfo),
        Ok(_) => Err(invalid("claims are not a JSON object".to_string()).into()),
        Err(e) => Err(invalid(e.to_string()).into()),
    }
}

fn verified_claims<'a>(
    id_token: &'a CoreIdToken,
    nonce: &Nonce,
    config: &ProviderConfig,
    metadata: &CoreProviderMetadata,
) -> Result<&'a CoreIdTokenClaims, ClaimsVerificationError> {
    let verifier = CoreIdTokenVerifier::new_confidential_client(
        ClientId::new(config.client_id().to_string()),
        config.client_secret().clone(),
        metadata.issuer().clone(),
        metadata.jwks().clone(),
    )
    .set_allowed_algs(ALLOWED_ALGS);
    id_token.claims(&verifier, nonce)
}

fn invalid(reason: String) -> TokenExchangeError {
    TokenExchangeError::InvalidIdToken { reason }
}

fn unavailable(report: Report<oidc_gate_access::DiscoveryError>) -> TokenExchangeError {
    TokenExchangeError::ProviderUnavailable {
        reason: report.current_context().to_string(),
    }
}
