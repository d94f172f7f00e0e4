use std::sync::Arc;

use axum::http::HeaderValue;

use crate::{config::{ConfigError, ServiceConfig}, consts::CORS_ALLOWED_ORIGIN, verify::Verifier};

/// Shared by every request. Cloning is cheap; the verifier (and with it
/// the signing key cache) sits behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
  pub verifier: Arc<Verifier>,
  pub cors_origin: HeaderValue,
  pub environment: Arc<str>
}

impl AppState {
  pub fn new(config: &ServiceConfig) -> Result<Self, ConfigError> {
    Self::with_verifier(
      Verifier::new(config.verifier.clone())?,
      config
    )
  }

  /// Use an already built verifier, e.g. one with a custom HTTP client.
  pub fn with_verifier(verifier: Verifier, config: &ServiceConfig) -> Result<Self, ConfigError> {
    let cors_origin = HeaderValue::from_str(&config.cors_origin)
      .map_err(|e| ConfigError::Invalid { name: CORS_ALLOWED_ORIGIN, reason: e.to_string() })?;

    Ok(
      AppState {
        verifier: Arc::new(verifier),
        cors_origin,
        environment: config.environment.as_str().into()
      }
    )
  }
}
