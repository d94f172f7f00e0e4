use std::str::FromStr;

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use reqwest::Client;
use surrealdb_jsonwebtoken::{crypto, Algorithm};
use tracing::debug;

use crate::{bearer::extract_bearer, config::{is_symmetric, ConfigError, VerifierConfig}, handler_error::AuthError, keys::{KeyCache, SigningKey}, token::{ClaimSet, TokenParts}};

/// Outcome of one verification: the claims, or why the token was refused.
pub type VerificationResult = Result<ClaimSet, AuthError>;

/// Checks bearer tokens against one issuer's published keys.
/// Shared by all requests; the key cache is the only mutable part.
pub struct Verifier {
  config: VerifierConfig,
  keys: KeyCache
}

impl Verifier {
  pub fn new(config: VerifierConfig) -> Result<Self, ConfigError> {
    let client = Client::builder()
      .build()
      .map_err(ConfigError::HttpClient)?;

    Ok(Self::with_client(config, client))
  }

  pub fn with_client(config: VerifierConfig, client: Client) -> Self {
    let keys = KeyCache::new(client, &config);
    Verifier { config, keys }
  }

  pub fn config(&self) -> &VerifierConfig {
    &self.config
  }

  pub fn keys(&self) -> &KeyCache {
    &self.keys
  }

  /// Extract the bearer token from `headers` and verify it.
  pub async fn verify(&self, headers: &HeaderMap, now: DateTime<Utc>) -> VerificationResult {
    let token = extract_bearer(headers)?;
    self.verify_token(token, now).await
  }

  pub async fn verify_token(&self, token: &str, now: DateTime<Utc>) -> VerificationResult {
    let parts = TokenParts::parse(token)?;

    // refuse `none`/HMAC before it can cost a key set fetch
    allowed_algorithm(&parts.header.alg, &self.config.algorithms)?;

    let Some(kid) = parts.header.kid.as_deref() else {
      return Err(AuthError::MalformedToken("header has no kid"))
    };

    let key = self.keys.resolve(kid, now).await?;
    debug!(kid, "resolved signing key");

    verify_signature_and_claims(&parts, &key, &self.config, now)
  }
}

/// Every check that needs no I/O, in order: algorithm and signature,
/// issuer, audience, time window. The first failure is returned.
pub fn verify_signature_and_claims(
  parts: &TokenParts,
  key: &SigningKey,
  config: &VerifierConfig,
  now: DateTime<Utc>
) -> VerificationResult {
  let alg = allowed_algorithm(&parts.header.alg, &config.algorithms)?;

  if key.algorithm.is_some_and(|key_alg| key_alg != alg) {
    return Err(AuthError::InvalidSignature)
  }

  let signature_ok = crypto::verify(
    parts.signature,
    parts.signing_input.as_bytes(),
    &key.decoding_key,
    alg
  ).unwrap_or(false);
  if !signature_ok {
    return Err(AuthError::InvalidSignature)
  }

  let claims = parts.claims()?;

  if claims.iss != config.issuer {
    return Err(AuthError::InvalidIssuer)
  }

  if !claims.aud.iter().any(|aud| config.audiences.iter().any(|accepted| accepted == aud)) {
    return Err(AuthError::InvalidAudience)
  }

  check_time_window(&claims, config, now)?;

  Ok(claims)
}

fn allowed_algorithm(alg: &str, allowed: &[Algorithm]) -> Result<Algorithm, AuthError> {
  let Ok(alg) = Algorithm::from_str(alg) else {
    return Err(AuthError::InvalidSignature)
  };

  if is_symmetric(alg) || !allowed.contains(&alg) {
    return Err(AuthError::InvalidSignature)
  }

  Ok(alg)
}

fn check_time_window(
  claims: &ClaimSet,
  config: &VerifierConfig,
  now: DateTime<Utc>
) -> Result<(), AuthError> {
  let now = now.timestamp();
  let skew = config.clock_skew.num_seconds();

  if claims.exp.saturating_add(skew) <= now {
    return Err(AuthError::Expired)
  }

  let latest_start = now.saturating_add(skew);
  if claims.nbf.is_some_and(|nbf| nbf > latest_start)
    || claims.iat.is_some_and(|iat| iat > latest_start)
  {
    return Err(AuthError::NotYetValid)
  }

  Ok(())
}
