mod bearer;
pub mod config;
pub mod consts;
mod endpoints;
pub mod handler_error;
pub mod keys;
pub mod logging;
mod state;
pub mod token;
pub mod verify;

pub use bearer::extract_bearer;
pub use state::AppState;

use axum::{routing::get, Router};

use consts::PROTECTED_ROUTE;
use endpoints::{method_not_allowed, not_found, preflight, protected};

/// The HTTP surface: one protected endpoint plus its CORS preflight.
/// Everything else still gets a JSON body with the CORS origin.
pub fn router(state: AppState) -> Router {
  Router::new()
    .route(
      PROTECTED_ROUTE,
      get(protected)
        .post(protected)
        .options(preflight)
        .fallback(method_not_allowed)
    )
    .fallback(not_found)
    .with_state(state)
}

#[cfg(target_arch = "wasm32")]
mod entry {
  use std::cell::OnceCell;

  use axum::{body::Body, http::{HeaderValue, Response}};
  use chrono::Utc;
  use tower_service::Service;
  use tracing::error;
  use worker::{event, Context, Env, HttpRequest};

  use crate::{config::{self, ServiceConfig}, consts::{CORS_ALLOWED_ORIGIN, DEFAULT_CORS_ORIGIN}, endpoints::response::error_response, handler_error::HandlerError, logging, router, AppState};

  thread_local! {
    // The isolate outlives a single request, so the key cache does too.
    static SHARED_STATE: OnceCell<AppState> = const { OnceCell::new() };
  }

  fn shared_state(lookup: impl Fn(&str) -> Option<String>) -> Result<AppState, HandlerError> {
    SHARED_STATE.with(|cell| {
      if let Some(state) = cell.get() {
        return Ok(state.clone())
      }

      let state = AppState::new(&ServiceConfig::from_lookup(lookup)?)?;
      Ok(cell.get_or_init(|| state).clone())
    })
  }

  // Program entrypoint. Essentially the `main` function.
  #[event(fetch)]
  async fn fetch(req: HttpRequest, env: Env, _: Context) -> worker::Result<Response<Body>> {
    console_error_panic_hook::set_once();

    // plain vars and secrets are both just strings here
    let lookup = |name: &str| {
      env.var(name)
        .map(|v| v.to_string())
        .or_else(|_| env.secret(name).map(|s| s.to_string()))
        .ok()
    };

    logging::init(&config::log_level(&lookup));

    let state = match shared_state(lookup) {
      Ok(state) => state,
      Err(e) => {
        error!(error = e.kind(), "{e}");

        let cors_origin = env.var(CORS_ALLOWED_ORIGIN)
          .ok()
          .and_then(|v| HeaderValue::from_str(&v.to_string()).ok())
          .unwrap_or(HeaderValue::from_static(DEFAULT_CORS_ORIGIN));
        return Ok(error_response(&cors_origin, &e, Utc::now()))
      }
    };

    Ok(
      router(state)
        .call(req)
        .await?
    )
  }
}
