use std::{str::FromStr, time::Duration as StdDuration};

use chrono::Duration;
use surrealdb_jsonwebtoken::Algorithm;
use url::Url;

use crate::consts::{
  ALLOWED_ALGORITHMS, AUDIENCES, AUDIENCE_URI_PREFIX, CLIENT_ID, CLOCK_SKEW_SECS,
  CORS_ALLOWED_ORIGIN, DEFAULT_ALGORITHMS, DEFAULT_CLOCK_SKEW_SECS, DEFAULT_CORS_ORIGIN,
  DEFAULT_ENVIRONMENT, DEFAULT_ISSUER_TEMPLATE, DEFAULT_KEY_CACHE_TTL_SECS,
  DEFAULT_KEY_FETCH_TIMEOUT_SECS, DEFAULT_KEY_REFRESH_INTERVAL_SECS, DEFAULT_LOG_LEVEL,
  DISCOVERY_PATH, ENVIRONMENT, ISSUER_TEMPLATE, JWKS_URI, KEY_CACHE_TTL_SECS,
  KEY_FETCH_TIMEOUT_SECS, KEY_REFRESH_INTERVAL_SECS, LOG_LEVEL, TENANT_ID
};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
  #[error(r#"Missing required variable "{0}""#)]
  Missing(&'static str),
  #[error(r#"Invalid value for "{name}": {reason}"#)]
  Invalid {
    name: &'static str,
    reason: String
  },
  #[error("{0:?} is a symmetric algorithm and cannot be verified against a published key set")]
  SymmetricAlgorithm(Algorithm),
  #[error("Could not build the HTTP client for fetching signing keys: {0}")]
  HttpClient(#[source] reqwest::Error)
}

impl ConfigError {
  fn invalid(name: &'static str, reason: impl ToString) -> Self {
    ConfigError::Invalid { name, reason: reason.to_string() }
  }
}

/// Where the verifier gets its signing keys from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeySource {
  /// A key set document at a fixed URL.
  Jwks(Url),
  /// The issuer's discovery document, whose `jwks_uri` points at the key set.
  Discovery(Url)
}

/// Everything token verification depends on. Built once and handed to
/// `Verifier::new`; nothing in the verification path reads ambient state.
#[derive(Clone, Debug)]
pub struct VerifierConfig {
  pub issuer: String,
  pub audiences: Vec<String>,
  pub algorithms: Vec<Algorithm>,
  pub clock_skew: Duration,
  pub key_source: KeySource,
  pub key_cache_ttl: Duration,
  /// an unknown `kid` only refetches the key set this long after the last fetch
  pub key_refresh_interval: Duration,
  pub key_fetch_timeout: StdDuration
}

impl VerifierConfig {
  /// Config with default algorithms, skew and cache policy.
  pub fn new(
    issuer: impl Into<String>,
    audiences: Vec<String>,
    key_source: KeySource
  ) -> Self {
    VerifierConfig {
      issuer: issuer.into(),
      audiences,
      algorithms: vec![Algorithm::RS256],
      clock_skew: Duration::seconds(DEFAULT_CLOCK_SKEW_SECS),
      key_source,
      key_cache_ttl: Duration::seconds(DEFAULT_KEY_CACHE_TTL_SECS),
      key_refresh_interval: Duration::seconds(DEFAULT_KEY_REFRESH_INTERVAL_SECS),
      key_fetch_timeout: StdDuration::from_secs(DEFAULT_KEY_FETCH_TIMEOUT_SECS)
    }
  }

  pub fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
  where
    F: Fn(&str) -> Option<String>
  {
    let tenant = required(lookup, TENANT_ID)?;

    let issuer = var(lookup, ISSUER_TEMPLATE)
      .unwrap_or_else(|| DEFAULT_ISSUER_TEMPLATE.to_string())
      .replace("{tenant}", &tenant);

    let audiences = match var(lookup, AUDIENCES) {
      Some(list) => split_list(&list),
      None => default_audiences(&required(lookup, CLIENT_ID)?)
    };
    if audiences.is_empty() {
      return Err(ConfigError::invalid(AUDIENCES, "no audiences listed"))
    }

    let algorithms = parse_algorithms(
      &var(lookup, ALLOWED_ALGORITHMS).unwrap_or_else(|| DEFAULT_ALGORITHMS.to_string())
    )?;

    let key_source = match var(lookup, JWKS_URI) {
      Some(uri) => KeySource::Jwks(
        Url::parse(&uri).map_err(|e| ConfigError::invalid(JWKS_URI, e))?
      ),
      None => KeySource::Discovery(
        discovery_url(&issuer).map_err(|e| ConfigError::invalid(ISSUER_TEMPLATE, e))?
      )
    };

    Ok(
      VerifierConfig {
        issuer,
        audiences,
        algorithms,
        clock_skew: Duration::seconds(
          parse_or(lookup, CLOCK_SKEW_SECS, DEFAULT_CLOCK_SKEW_SECS)?
        ),
        key_source,
        key_cache_ttl: Duration::seconds(
          parse_or(lookup, KEY_CACHE_TTL_SECS, DEFAULT_KEY_CACHE_TTL_SECS)?
        ),
        key_refresh_interval: Duration::seconds(
          parse_or(lookup, KEY_REFRESH_INTERVAL_SECS, DEFAULT_KEY_REFRESH_INTERVAL_SECS)?
        ),
        key_fetch_timeout: StdDuration::from_secs(
          parse_or(lookup, KEY_FETCH_TIMEOUT_SECS, DEFAULT_KEY_FETCH_TIMEOUT_SECS)?
        )
      }
    )
  }
}

/// Verifier config plus the bits of the HTTP surface that vary per deployment.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
  pub verifier: VerifierConfig,
  pub cors_origin: String,
  pub environment: String,
  pub log_level: String
}

impl ServiceConfig {
  pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
  where
    F: Fn(&str) -> Option<String>
  {
    Ok(
      ServiceConfig {
        verifier: VerifierConfig::from_lookup(&lookup)?,
        cors_origin: var(&lookup, CORS_ALLOWED_ORIGIN)
          .unwrap_or_else(|| DEFAULT_CORS_ORIGIN.to_string()),
        environment: var(&lookup, ENVIRONMENT)
          .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string()),
        log_level: log_level(&lookup)
      }
    )
  }
}

/// Read on its own so logging can come up before the rest of the config is validated.
pub fn log_level<F>(lookup: &F) -> String
where
  F: Fn(&str) -> Option<String>
{
  var(lookup, LOG_LEVEL).unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
}

/// The identity provider emits either the bare client id or the
/// `api://` form depending on how the scope was requested.
pub fn default_audiences(client_id: &str) -> Vec<String> {
  vec![
    client_id.to_string(),
    format!("{AUDIENCE_URI_PREFIX}{client_id}")
  ]
}

pub fn discovery_url(issuer: &str) -> Result<Url, url::ParseError> {
  Url::parse(&format!("{}{DISCOVERY_PATH}", issuer.trim_end_matches('/')))
}

fn parse_algorithms(list: &str) -> Result<Vec<Algorithm>, ConfigError> {
  let algorithms = split_list(list)
    .iter()
    .map(|name| {
      Algorithm::from_str(name)
        .map_err(|_| ConfigError::invalid(ALLOWED_ALGORITHMS, format!(r#"unknown algorithm "{name}""#)))
    })
    .collect::<Result<Vec<_>, _>>()?;

  if let Some(alg) = algorithms.iter().find(|alg| is_symmetric(**alg)) {
    return Err(ConfigError::SymmetricAlgorithm(*alg))
  }
  if algorithms.is_empty() {
    return Err(ConfigError::invalid(ALLOWED_ALGORITHMS, "no algorithms listed"))
  }

  Ok(
    algorithms.into_iter().fold(Vec::new(), |mut acc, alg| {
      if !acc.contains(&alg) {
        acc.push(alg);
      }
      acc
    })
  )
}

pub fn is_symmetric(alg: Algorithm) -> bool {
  matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)
}

fn var<F>(lookup: &F, name: &str) -> Option<String>
where
  F: Fn(&str) -> Option<String>
{
  lookup(name)
    .map(|v| v.trim().to_string())
    .filter(|v| !v.is_empty())
}

fn required<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
  F: Fn(&str) -> Option<String>
{
  var(lookup, name).ok_or(ConfigError::Missing(name))
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
  F: Fn(&str) -> Option<String>,
  T: FromStr,
  T::Err: ToString
{
  match var(lookup, name) {
    Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::invalid(name, e)),
    None => Ok(default)
  }
}

fn split_list(list: &str) -> Vec<String> {
  list.split(',')
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(str::to_string)
    .collect()
}
