use axum::http::{header::AUTHORIZATION, HeaderMap};

use crate::handler_error::AuthError;

// Source: https://www.rfc-editor.org/rfc/rfc6750#section-2.1
// Scheme match is case-sensitive here, stricter than the RFC.
const BEARER_PREFIX: &str = "Bearer ";

/// Pull the raw token out of `Authorization: Bearer <token>`.
/// Purely syntactic; the token itself is not looked at.
pub fn extract_bearer(headers: &HeaderMap) -> Result<&str, AuthError> {
  let mut values = headers.get_all(AUTHORIZATION).iter();

  let (Some(value), None) = (values.next(), values.next()) else {
    return Err(AuthError::MissingOrMalformedHeader)
  };

  let token = value.to_str()
    .ok()
    .and_then(|v| v.strip_prefix(BEARER_PREFIX))
    .ok_or(AuthError::MissingOrMalformedHeader)?;

  if token.is_empty() || token.contains(char::is_whitespace) {
    return Err(AuthError::MissingOrMalformedHeader)
  }

  Ok(token)
}
