use axum::{http::{header, HeaderValue, StatusCode}, response::{IntoResponse, Response}, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{handler_error::HandlerError, token::format_time};

#[derive(Serialize)]
pub struct ErrorBody<'a> {
  pub error: &'a str,
  pub message: String,
  pub timestamp: String
}

/// JSON body with the CORS origin every response from this API carries.
pub fn json_response<T: Serialize>(
  status: StatusCode,
  cors_origin: &HeaderValue,
  body: &T
) -> Response {
  (
    status,
    [(header::ACCESS_CONTROL_ALLOW_ORIGIN, cors_origin.clone())],
    Json(body)
  ).into_response()
}

pub fn error_response(
  cors_origin: &HeaderValue,
  error: &HandlerError,
  now: DateTime<Utc>
) -> Response {
  json_response(
    error.status(),
    cors_origin,
    &ErrorBody {
      error: error.kind(),
      message: error.message(),
      timestamp: format_time(&now)
    }
  )
}
