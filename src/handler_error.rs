use axum::http::StatusCode;

use crate::{config::ConfigError, keys::KeyFetchError};

/// Why a bearer token was refused. Every variant surfaces as a 401 with
/// `kind()` in the `error` field; the variants stay distinct for logs.
#[derive(thiserror::Error, Debug)]
pub enum AuthError {
  #[error("No valid authorization header. Expected: Bearer <token>")]
  MissingOrMalformedHeader,
  #[error("Token is not a well-formed signed JWT: {0}")]
  MalformedToken(&'static str),
  #[error("Signing keys could not be retrieved, try again later")]
  KeyResolutionFailed(#[from] KeyFetchError),
  #[error(r#"Token was signed by unknown key "{kid}""#)]
  UnknownSigningKey {
    kid: String
  },
  #[error("Token signature is invalid")]
  InvalidSignature,
  #[error("Token issuer is not accepted")]
  InvalidIssuer,
  #[error("Token audience is not accepted")]
  InvalidAudience,
  #[error("Token has expired")]
  Expired,
  #[error("Token is not valid yet")]
  NotYetValid
}

impl AuthError {
  /// Value of the `error` field in the response body.
  pub fn kind(&self) -> &'static str {
    match self {
      AuthError::MissingOrMalformedHeader => "MissingOrMalformedHeader",
      AuthError::MalformedToken(_) => "MalformedToken",
      AuthError::KeyResolutionFailed(_) => "KeyResolutionFailed",
      AuthError::UnknownSigningKey { .. } => "UnknownSigningKey",
      AuthError::InvalidSignature => "InvalidSignature",
      AuthError::InvalidIssuer => "InvalidIssuer",
      AuthError::InvalidAudience => "InvalidAudience",
      AuthError::Expired => "Expired",
      AuthError::NotYetValid => "NotYetValid"
    }
  }

  /// Only key-set fetch failures go away by retrying with the same token.
  pub fn is_retryable(&self) -> bool {
    matches!(self, AuthError::KeyResolutionFailed(_))
  }
}

#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub enum HandlerError {
  Auth(#[from] AuthError),
  Config(#[from] ConfigError)
}

impl HandlerError {
  pub fn status(&self) -> StatusCode {
    match self {
      HandlerError::Auth(_) => StatusCode::UNAUTHORIZED,
      HandlerError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR
    }
  }

  pub fn kind(&self) -> &'static str {
    match self {
      HandlerError::Auth(e) => e.kind(),
      HandlerError::Config(_) => "ConfigurationError"
    }
  }

  /// Client-facing text. Configuration details only go to the log.
  pub fn message(&self) -> String {
    match self {
      HandlerError::Auth(e) => e.to_string(),
      HandlerError::Config(_) => "The service is not configured correctly".into()
    }
  }
}
