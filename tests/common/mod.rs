#![allow(dead_code)]

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use protected_api::config::ServiceConfig;
use serde_json::{json, Value};
use surrealdb_jsonwebtoken::{encode, Algorithm, EncodingKey, Header};

pub const SIGNING_PEM: &str = include_str!("../fixtures/signing_key.pem");
pub const ROGUE_PEM: &str = include_str!("../fixtures/rogue_key.pem");
/// modulus of `signing_key.pem`
pub const SIGNING_MODULUS: &str = "8NARF4eCZ9yxgGIKZ8QfHYVpWhYKYIEYrpe8jw5DQ5SC7fA2F1drJunSXrbsN60fNdK5MPdTY6jBQwWgIThW_UANEriEr-JT9-bKqnDR2rM1mnGDU_Q9fqzC3rPmqu3WdZxVPptRt0wusP7E1gyzSDdODv26ZoKFPaN_RLn3Ry5GSIo7swnqMhAPm8T4RAxdjLlmaxYsqUOcEiqvbDBZktRLdpFxHOZEJCzburws_KwQEn-k6ZsZgeizwH8sdlssYfRf2h6xfnqCnz17HWuwvDEpijpxruWCtsx_BFnKggqR-zvY_QQG0OxUsKJtUKrIdh2kR4zZLe25RJg3nk7bUQ";

pub const KID: &str = "test-key-1";
pub const TENANT: &str = "11111111-2222-3333-4444-555555555555";
pub const CLIENT_ID: &str = "bd0701b9-0000-4127-8be8-cddaaf1353b8";
pub const ISSUER: &str = "https://login.example.com/11111111-2222-3333-4444-555555555555/v2.0";

/// Key set document publishing `signing_key.pem` under `kid`.
pub fn jwks(kid: &str) -> Value {
  json!({
    "keys": [{
      "kty": "RSA",
      "use": "sig",
      "kid": kid,
      "x5t": kid,
      "n": SIGNING_MODULUS,
      "e": "AQAB"
    }]
  })
}

/// Access token claims valid for an hour around `now`; `overrides`
/// replaces or adds top level claims.
pub fn claims(now: DateTime<Utc>, overrides: Value) -> Value {
  let mut claims = json!({
    "iss": ISSUER,
    "aud": format!("api://{CLIENT_ID}"),
    "sub": "AAAAAAAAAAAAAAAAAAAAAIkzqFVrSaSaFHy782bbtaQ",
    "oid": "00000000-0000-0000-66f3-3332eca7ea81",
    "tid": TENANT,
    "iat": now.timestamp() - 60,
    "nbf": now.timestamp() - 60,
    "exp": now.timestamp() + 3600,
    "name": "Megan Bowen",
    "preferred_username": "meganb@example.com",
    "scp": "access_as_user User.Read",
    "ver": "2.0"
  });
  if let (Value::Object(base), Value::Object(overrides)) = (&mut claims, overrides) {
    base.extend(overrides);
  }
  claims
}

pub fn sign_with(pem: &str, kid: &str, claims: &Value) -> String {
  let mut header = Header::new(Algorithm::RS256);
  header.kid = Some(kid.to_string());
  encode(&header, claims, &EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap()).unwrap()
}

pub fn sign(claims: &Value) -> String {
  sign_with(SIGNING_PEM, KID, claims)
}

/// Deployment config as it would come from the environment.
pub fn service_config(extra: &[(&str, &str)]) -> ServiceConfig {
  let mut vars: HashMap<String, String> = [
    ("TENANT_ID", TENANT),
    ("CLIENT_ID", CLIENT_ID),
    ("ISSUER_TEMPLATE", "https://login.example.com/{tenant}/v2.0"),
    ("ENVIRONMENT", "test")
  ].iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
  vars.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));

  ServiceConfig::from_lookup(move |name| vars.get(name).cloned()).unwrap()
}
