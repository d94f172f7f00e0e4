use std::{collections::HashMap, future::Future, sync::{atomic::{AtomicU64, Ordering}, Arc}, time::Duration as StdDuration};

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use reqwest::{header::ACCEPT, Client};
use serde::{de::DeserializeOwned, Deserialize};
use surrealdb_jsonwebtoken::{jwk::{AlgorithmParameters, Jwk, PublicKeyUse}, Algorithm, DecodingKey};
use tracing::{debug, warn};
use url::Url;

use crate::{config::{is_symmetric, KeySource, VerifierConfig}, handler_error::AuthError};

#[derive(thiserror::Error, Debug)]
pub enum KeyFetchError {
  #[error("Request to {url} failed: {source}")]
  Http {
    url: Url,
    #[source]
    source: reqwest::Error
  },
  #[error("{url} responded with status {status}")]
  Status {
    url: Url,
    status: u16
  },
  #[error("{url} returned an unreadable document: {source}")]
  Document {
    url: Url,
    #[source]
    source: serde_json::Error
  },
  #[error(r#"Discovery document at {0} has no "jwks_uri""#)]
  MissingJwksUri(Url),
  #[error("Timed out after {0:?} waiting for signing keys")]
  Timeout(StdDuration)
}

/// A public key from the issuer's key set, ready to check signatures.
#[derive(Clone)]
pub struct SigningKey {
  pub kid: String,
  /// `alg` the key set pins this key to, if any
  pub algorithm: Option<Algorithm>,
  pub decoding_key: DecodingKey
}

impl SigningKey {
  /// `None` for keys that can't verify a token signature: no `kid`,
  /// encryption keys, symmetric keys.
  pub fn from_jwk(jwk: &Jwk) -> Option<Self> {
    let Some(kid) = jwk.common.key_id.clone() else {
      debug!("skipping published key without kid");
      return None
    };

    if matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption))
      || matches!(jwk.algorithm, AlgorithmParameters::OctetKey(_))
      || jwk.common.algorithm.is_some_and(is_symmetric)
    {
      debug!(kid = %kid, "skipping published key not usable for signatures");
      return None
    }

    match DecodingKey::from_jwk(jwk) {
      Ok(decoding_key) => Some(
        SigningKey {
          kid,
          algorithm: jwk.common.algorithm,
          decoding_key
        }
      ),
      Err(e) => {
        warn!(kid = %kid, "skipping unusable published key: {e}");
        None
      }
    }
  }
}

// Source: https://www.rfc-editor.org/rfc/rfc7517#section-5
#[derive(Deserialize)]
struct KeySetDocument {
  // Parsed one by one so a single unsupported entry doesn't sink the set.
  keys: Vec<serde_json::Value>
}

impl KeySetDocument {
  fn signing_keys(self) -> Vec<SigningKey> {
    self.keys.into_iter()
      .filter_map(|entry| match serde_json::from_value::<Jwk>(entry) {
        Ok(jwk) => SigningKey::from_jwk(&jwk),
        Err(e) => {
          warn!("skipping unparseable published key: {e}");
          None
        }
      })
      .collect()
  }
}

enum Lookup {
  Fresh(Arc<SigningKey>),
  RecentlyMissing,
  Refetch
}

// Source: https://openid.net/specs/openid-connect-discovery-1_0.html#ProviderMetadata
#[derive(Deserialize)]
struct ProviderMetadata {
  jwks_uri: Option<Url>
}

struct CachedKey {
  key: Arc<SigningKey>,
  fetched_at: DateTime<Utc>
}

/// The last key set installed, tagged with the fetch that produced it.
#[derive(Default)]
struct KeyTable {
  generation: u64,
  refreshed_at: Option<DateTime<Utc>>,
  keys: HashMap<String, CachedKey>
}

impl KeyTable {
  /// Replaces the whole table so keys rotated out of the set are
  /// forgotten. A fetch that started before the installed one is dropped.
  fn install(&mut self, generation: u64, fresh: Vec<SigningKey>, fetched_at: DateTime<Utc>) -> bool {
    if generation <= self.generation {
      return false
    }

    self.generation = generation;
    self.refreshed_at = Some(fetched_at);
    self.keys = fresh.into_iter()
      .map(|key| (
        key.kid.clone(),
        CachedKey { key: Arc::new(key), fetched_at }
      ))
      .collect();
    true
  }

  fn get(&self, kid: &str) -> Option<Arc<SigningKey>> {
    self.keys.get(kid).map(|cached| cached.key.clone())
  }
}

/// Signing keys by `kid`, refetched from the issuer when a `kid` is
/// missing or its entry is older than the TTL. Entries expire on read,
/// there is no background refresh.
///
/// A `kid` missing from a set fetched less than `refresh_interval` ago is
/// refused without going back to the issuer, so tokens with made-up
/// `kid`s can't turn into one upstream request each.
pub struct KeyCache {
  client: Client,
  source: KeySource,
  ttl: Duration,
  refresh_interval: Duration,
  timeout: StdDuration,
  /// discovered once, then reused
  jwks_uri: RwLock<Option<Url>>,
  fetches: AtomicU64,
  table: RwLock<KeyTable>
}

impl KeyCache {
  pub fn new(client: Client, config: &VerifierConfig) -> Self {
    KeyCache {
      client,
      source: config.key_source.clone(),
      ttl: config.key_cache_ttl,
      refresh_interval: config.key_refresh_interval,
      timeout: config.key_fetch_timeout,
      jwks_uri: RwLock::new(None),
      fetches: AtomicU64::new(0),
      table: RwLock::new(KeyTable::default())
    }
  }

  pub async fn resolve(&self, kid: &str, now: DateTime<Utc>) -> Result<Arc<SigningKey>, AuthError> {
    let unknown = || AuthError::UnknownSigningKey { kid: kid.to_string() };

    match self.lookup(kid, now) {
      Lookup::Fresh(key) => return Ok(key),
      Lookup::RecentlyMissing => {
        debug!(kid, "kid not in the current key set, refetch rate limited");
        return Err(unknown())
      },
      Lookup::Refetch => {}
    }

    debug!(kid, "signing key not cached, fetching key set");
    let generation = self.fetches.fetch_add(1, Ordering::Relaxed) + 1;
    let fresh = self.fetch_key_set().await?;

    let mut table = self.table.write();
    if !table.install(generation, fresh, now) {
      debug!("a newer key set was installed while fetching, keeping it");
    }
    table.get(kid).ok_or_else(unknown)
  }

  /// Number of keys currently held, stale or not.
  pub fn len(&self) -> usize {
    self.table.read().keys.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  fn lookup(&self, kid: &str, now: DateTime<Utc>) -> Lookup {
    let table = self.table.read();

    match table.keys.get(kid) {
      Some(cached) if now - cached.fetched_at < self.ttl => Lookup::Fresh(cached.key.clone()),
      // stale: always worth a refetch
      Some(_) => Lookup::Refetch,
      None => match table.refreshed_at {
        Some(at) if now - at < self.refresh_interval => Lookup::RecentlyMissing,
        _ => Lookup::Refetch
      }
    }
  }

  async fn fetch_key_set(&self) -> Result<Vec<SigningKey>, KeyFetchError> {
    with_timeout(self.timeout, async {
      let jwks_uri = self.jwks_uri().await?;
      let document: KeySetDocument = self.get_json(&jwks_uri).await?;
      Ok(document.signing_keys())
    }).await
  }

  async fn jwks_uri(&self) -> Result<Url, KeyFetchError> {
    let discovery_url = match &self.source {
      KeySource::Jwks(url) => return Ok(url.clone()),
      KeySource::Discovery(url) => url
    };

    let known = self.jwks_uri.read().clone();
    if let Some(url) = known {
      return Ok(url)
    }

    let ProviderMetadata { jwks_uri } = self.get_json(discovery_url).await?;
    let jwks_uri = jwks_uri.ok_or_else(|| KeyFetchError::MissingJwksUri(discovery_url.clone()))?;

    *self.jwks_uri.write() = Some(jwks_uri.clone());
    Ok(jwks_uri)
  }

  async fn get_json<D: DeserializeOwned>(&self, url: &Url) -> Result<D, KeyFetchError> {
    let http_error = |source| KeyFetchError::Http { url: url.clone(), source };

    let response = self.client.get(url.clone())
      .header(ACCEPT, "application/json")
      .send()
      .await
      .map_err(http_error)?;

    let status = response.status();
    if !status.is_success() {
      return Err(KeyFetchError::Status { url: url.clone(), status: status.as_u16() })
    }

    let bytes = response.bytes()
      .await
      .map_err(http_error)?;

    serde_json::from_slice(&bytes)
      .map_err(|source| KeyFetchError::Document { url: url.clone(), source })
  }
}

#[cfg(not(target_arch = "wasm32"))]
async fn with_timeout<T>(
  timeout: StdDuration,
  fut: impl Future<Output = Result<T, KeyFetchError>>
) -> Result<T, KeyFetchError> {
  tokio::time::timeout(timeout, fut)
    .await
    .map_err(|_| KeyFetchError::Timeout(timeout))?
}

#[cfg(target_arch = "wasm32")]
async fn with_timeout<T>(
  timeout: StdDuration,
  fut: impl Future<Output = Result<T, KeyFetchError>>
) -> Result<T, KeyFetchError> {
  use futures_util::future::{select, Either};

  let fut = std::pin::pin!(fut);
  let delay = std::pin::pin!(worker::Delay::from(timeout));

  match select(fut, delay).await {
    Either::Left((result, _)) => result,
    Either::Right(_) => Err(KeyFetchError::Timeout(timeout))
  }
}
