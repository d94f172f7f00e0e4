use axum::{extract::State, http::{HeaderMap, StatusCode}, response::{IntoResponse, Response}};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::{consts::{PREFLIGHT_HEADERS, PROTECTED_ROUTE}, endpoints::response::{error_response, json_response, ErrorBody}, handler_error::HandlerError, state::AppState, token::{format_time, Audience, ClaimSet}};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProtectedResponse<'a> {
  message: &'static str,
  timestamp: String,
  user: UserInfo<'a>,
  token_info: TokenInfo<'a>,
  /// the full verified payload, untouched
  claims: &'a ClaimSet,
  api: ApiInfo<'a>
}

#[derive(Serialize)]
struct UserInfo<'a> {
  name: Option<&'a str>,
  username: Option<&'a str>,
  email: Option<&'a str>,
  subject: &'a str
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenInfo<'a> {
  audience: &'a Audience,
  issuer: &'a str,
  scopes: Vec<&'a str>,
  roles: Vec<&'a str>,
  issued_at: Option<String>,
  expires_at: Option<String>
}

#[derive(Serialize)]
struct ApiInfo<'a> {
  name: &'static str,
  version: &'static str,
  environment: &'a str
}

impl<'a> ProtectedResponse<'a> {
  fn new(claims: &'a ClaimSet, environment: &'a str, timestamp: String) -> Self {
    ProtectedResponse {
      message: "Protected API access successful",
      timestamp,
      user: UserInfo {
        name: claims.name(),
        username: claims.username(),
        email: claims.email(),
        subject: &claims.sub
      },
      token_info: TokenInfo {
        audience: &claims.aud,
        issuer: &claims.iss,
        scopes: claims.scopes(),
        roles: claims.roles(),
        issued_at: claims.issued_at(),
        expires_at: claims.expires_at()
      },
      claims,
      api: ApiInfo {
        name: "Protected API",
        version: env!("CARGO_PKG_VERSION"),
        environment
      }
    }
  }
}

/// Axum handler for GET and POST. A response is 200 only if the token
/// verified; every rejection is a 401 naming the failed check.
#[cfg_attr(target_arch = "wasm32", worker::send)]
pub async fn protected(
  State(state): State<AppState>,
  headers: HeaderMap
) -> Response {
  let now = Utc::now();

  match state.verifier.verify(&headers, now).await {
    Ok(claims) => {
      info!(sub = %claims.sub, "token verified");

      json_response(
        StatusCode::OK,
        &state.cors_origin,
        &ProtectedResponse::new(&claims, &state.environment, format_time(&now))
      )
    },
    Err(e) => {
      // never log the token itself
      warn!(error = e.kind(), retryable = e.is_retryable(), "token rejected: {e}");
      if let Some(source) = std::error::Error::source(&e) {
        warn!(error = e.kind(), "caused by: {source}");
      }

      error_response(&state.cors_origin, &HandlerError::Auth(e), now)
    }
  }
}

/// CORS preflight. Never looks at `Authorization`.
pub async fn preflight(State(state): State<AppState>) -> Response {
  (
    PREFLIGHT_HEADERS,
    json_response(
      StatusCode::OK,
      &state.cors_origin,
      &json!({ "message": "CORS preflight OK" })
    )
  ).into_response()
}

pub async fn method_not_allowed(State(state): State<AppState>) -> Response {
  (
    PREFLIGHT_HEADERS,
    json_response(
      StatusCode::METHOD_NOT_ALLOWED,
      &state.cors_origin,
      &ErrorBody {
        error: "MethodNotAllowed",
        message: "Use GET, POST or OPTIONS".into(),
        timestamp: format_time(&Utc::now())
      }
    )
  ).into_response()
}

/// Any path other than the protected route.
pub async fn not_found(State(state): State<AppState>) -> Response {
  json_response(
    StatusCode::NOT_FOUND,
    &state.cors_origin,
    &ErrorBody {
      error: "NotFound",
      message: format!("Only {PROTECTED_ROUTE} is served here"),
      timestamp: format_time(&Utc::now())
    }
  )
}
