//! Serve the protected endpoint outside the worker runtime, e.g. as a
//! Functions custom handler or for local development against a real tenant.

#[cfg(not(target_arch = "wasm32"))]
use clap::Parser;

#[cfg(not(target_arch = "wasm32"))]
#[derive(Parser)]
struct Args {
  /// Port to listen on
  #[arg(long, env = "FUNCTIONS_CUSTOMHANDLER_PORT", default_value_t = 3000)]
  port: u16,
  /// Address to bind
  #[arg(long, default_value = "0.0.0.0")]
  host: std::net::IpAddr
}

/// Reads the same variables as the worker from the process environment.
#[cfg(not(target_arch = "wasm32"))]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  use itertools::Itertools;
  use protected_api::{config::{self, ServiceConfig}, consts::PROTECTED_ROUTE, logging, router, AppState};
  use tracing::{error, info};

  let Args { port, host } = Args::parse();

  let lookup = |name: &str| std::env::var(name).ok();
  logging::init(&config::log_level(&lookup));

  let config = ServiceConfig::from_lookup(lookup)
    .inspect_err(|e| error!("invalid configuration: {e}"))?;
  let state = AppState::new(&config)?;

  let listener = tokio::net::TcpListener::bind((host, port)).await?;
  info!(
    issuer = %config.verifier.issuer,
    audiences = %config.verifier.audiences.iter().join(", "),
    "serving {PROTECTED_ROUTE} on {}",
    listener.local_addr()?
  );

  axum::serve(listener, router(state))
    .with_graceful_shutdown(async {
      let _ = tokio::signal::ctrl_c().await;
    })
    .await?;

  Ok(())
}

#[cfg(target_arch = "wasm32")]
fn main() {}
