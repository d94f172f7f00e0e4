use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::handler_error::AuthError;

// Source: https://www.rfc-editor.org/rfc/rfc7515#section-4.1
/// The only header fields needed before the signature is checked.
#[derive(Deserialize, Debug)]
pub struct TokenHeader {
  pub alg: String,
  pub kid: Option<String>
}

/// A compact JWS split into its segments. The header is decoded so the
/// signing key can be found; the payload stays opaque until the
/// signature over `signing_input` has been verified.
#[derive(Debug)]
pub struct TokenParts<'a> {
  pub header: TokenHeader,
  pub signing_input: &'a str,
  payload: &'a str,
  pub signature: &'a str
}

impl<'a> TokenParts<'a> {
  pub fn parse(token: &'a str) -> Result<Self, AuthError> {
    let (signing_input, signature) = token.rsplit_once('.')
      .ok_or(AuthError::MalformedToken("expected three segments"))?;
    let (header, payload) = signing_input.split_once('.')
      .ok_or(AuthError::MalformedToken("expected three segments"))?;

    if header.is_empty() || payload.is_empty() || signature.is_empty() || payload.contains('.') {
      return Err(AuthError::MalformedToken("expected three segments"))
    }

    // Reject undecodable segments up front so they are reported as
    // malformed rather than as a bad signature.
    decode_segment(payload)?;
    decode_segment(signature)?;

    Ok(
      TokenParts {
        header: decode_json(header)
          .map_err(|_| AuthError::MalformedToken("header is not a JOSE header"))?,
        signing_input,
        payload,
        signature
      }
    )
  }

  /// Only meaningful after the signature has been verified.
  pub(crate) fn claims(&self) -> Result<ClaimSet, AuthError> {
    decode_json(self.payload)
      .map_err(|_| AuthError::MalformedToken("payload is missing required claims"))
  }
}

fn decode_segment(segment: &str) -> Result<Vec<u8>, AuthError> {
  URL_SAFE_NO_PAD.decode(segment)
    .map_err(|_| AuthError::MalformedToken("segment is not base64url"))
}

fn decode_json<T: DeserializeOwned>(segment: &str) -> Result<T, AuthError> {
  serde_json::from_slice(&decode_segment(segment)?)
    .map_err(|_| AuthError::MalformedToken("segment is not JSON"))
}

// ---------- CLAIMS ----------

/// `aud` may be a single string or an array.
// Source: https://www.rfc-editor.org/rfc/rfc7519#section-4.1.3
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum Audience {
  Single(String),
  Multiple(Vec<String>)
}

impl Audience {
  pub fn iter(&self) -> impl Iterator<Item = &str> {
    match self {
      Audience::Single(aud) => std::slice::from_ref(aud).iter(),
      Audience::Multiple(auds) => auds.iter()
    }.map(String::as_str)
  }
}

/// Registered claims the checks depend on. A payload without them, or
/// with them in the wrong shape, is malformed.
// Source: https://www.rfc-editor.org/rfc/rfc7519#section-4.1
#[derive(Deserialize)]
struct RegisteredClaims {
  iss: String,
  aud: Audience,
  sub: String,
  exp: i64,
  iat: Option<i64>,
  nbf: Option<i64>
}

/// Payload of a verified access token. The registered claims are typed;
/// the rest are read from the payload on demand, and the payload itself
/// is what gets serialized, so nothing is dropped on the way out.
// Source: https://learn.microsoft.com/en-us/entra/identity-platform/access-token-claims-reference
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(try_from = "Map<String, Value>")]
pub struct ClaimSet {
  pub iss: String,
  pub aud: Audience,
  pub sub: String,
  pub exp: i64,
  pub iat: Option<i64>,
  pub nbf: Option<i64>,
  payload: Map<String, Value>
}

impl TryFrom<Map<String, Value>> for ClaimSet {
  type Error = serde_json::Error;

  fn try_from(payload: Map<String, Value>) -> Result<Self, Self::Error> {
    let RegisteredClaims { iss, aud, sub, exp, iat, nbf } =
      serde_json::from_value(Value::Object(payload.clone()))?;

    Ok(ClaimSet { iss, aud, sub, exp, iat, nbf, payload })
  }
}

impl Serialize for ClaimSet {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    self.payload.serialize(serializer)
  }
}

// Display claims are best effort: a claim of an unexpected type reads as
// absent instead of failing an otherwise valid token.
impl ClaimSet {
  pub fn get(&self, claim: &str) -> Option<&Value> {
    self.payload.get(claim)
  }

  fn string_claim(&self, claim: &str) -> Option<&str> {
    self.get(claim).and_then(Value::as_str)
  }

  pub fn name(&self) -> Option<&str> {
    self.string_claim("name")
  }

  pub fn username(&self) -> Option<&str> {
    self.string_claim("preferred_username")
  }

  pub fn email(&self) -> Option<&str> {
    self.string_claim("email")
  }

  /// object id of the user in the tenant
  pub fn oid(&self) -> Option<&str> {
    self.string_claim("oid")
  }

  pub fn tid(&self) -> Option<&str> {
    self.string_claim("tid")
  }

  /// `scp` is space separated
  pub fn scopes(&self) -> Vec<&str> {
    self.string_claim("scp")
      .map(|scp| scp.split_whitespace().collect())
      .unwrap_or_default()
  }

  pub fn roles(&self) -> Vec<&str> {
    match self.get("roles") {
      Some(Value::Array(roles)) => roles.iter().filter_map(Value::as_str).collect(),
      _ => Vec::new()
    }
  }

  pub fn issued_at(&self) -> Option<String> {
    self.iat.and_then(iso8601)
  }

  pub fn expires_at(&self) -> Option<String> {
    iso8601(self.exp)
  }
}

/// `2024-01-01T00:00:00.000Z`
pub fn iso8601(timestamp: i64) -> Option<String> {
  DateTime::<Utc>::from_timestamp(timestamp, 0)
    .map(|dt| format_time(&dt))
}

pub fn format_time(time: &DateTime<Utc>) -> String {
  time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn segment(value: &Value) -> String {
    URL_SAFE_NO_PAD.encode(serde_json::to_vec(value).unwrap())
  }

  fn token(header: &Value, payload: &Value) -> String {
    format!("{}.{}.{}", segment(header), segment(payload), URL_SAFE_NO_PAD.encode(b"sig"))
  }

  fn malformed(token: &str) -> bool {
    matches!(TokenParts::parse(token), Err(AuthError::MalformedToken(_)))
  }

  #[test]
  fn splits_header_and_signing_input() {
    let raw = token(&json!({ "alg": "RS256", "kid": "k1", "typ": "JWT" }), &json!({ "sub": "s" }));
    let parts = TokenParts::parse(&raw).unwrap();

    assert_eq!(parts.header.alg, "RS256");
    assert_eq!(parts.header.kid.as_deref(), Some("k1"));
    assert_eq!(parts.signing_input, &raw[..raw.rfind('.').unwrap()]);
    assert_eq!(parts.signature, URL_SAFE_NO_PAD.encode(b"sig"));
  }

  #[test]
  fn wrong_segment_count_is_malformed() {
    assert!(malformed("abc"));
    assert!(malformed("abc.def"));
    assert!(malformed("a.b.c.d"));
    assert!(malformed(".."));
    assert!(malformed("eyJhbGciOiJSUzI1NiJ9..c2ln"));
  }

  #[test]
  fn non_base64_or_non_json_is_malformed() {
    let header = segment(&json!({ "alg": "RS256" }));
    assert!(malformed(&format!("{header}.***.c2ln")));
    assert!(malformed(&format!("{header}.e30.***")));
    assert!(malformed(&format!("{}.e30.c2ln", URL_SAFE_NO_PAD.encode(b"not json"))));
    // header without alg
    assert!(malformed(&format!("{}.e30.c2ln", segment(&json!({ "kid": "k" })))));
  }

  #[test]
  fn claims_keep_unknown_fields() {
    let payload = json!({
      "iss": "https://issuer.example/v2.0",
      "aud": ["a", "b"],
      "sub": "subject",
      "exp": 1_700_000_000,
      "scp": "access_as_user  User.Read",
      "email": null,
      "ver": "2.0",
      "custom": { "nested": true }
    });
    let raw = token(&json!({ "alg": "RS256" }), &payload);
    let claims = TokenParts::parse(&raw).unwrap().claims().unwrap();

    assert_eq!(claims.aud.iter().collect::<Vec<_>>(), vec!["a", "b"]);
    assert_eq!(claims.scopes(), vec!["access_as_user", "User.Read"]);
    assert!(claims.roles().is_empty());
    assert_eq!(claims.email(), None);
    assert_eq!(claims.get("ver"), Some(&json!("2.0")));
    // explicit nulls survive too
    assert_eq!(serde_json::to_value(&claims).unwrap(), payload);
  }

  #[test]
  fn display_claims_of_the_wrong_type_read_as_absent() {
    let payload = json!({
      "iss": "https://issuer.example/v2.0",
      "aud": "a",
      "sub": "subject",
      "exp": 1_700_000_000,
      "roles": "Admin",
      "scp": ["not", "a", "string"],
      "name": 42,
      "preferred_username": { "upn": "x" },
      "email": false,
      "oid": [],
      "tid": 7
    });
    let raw = token(&json!({ "alg": "RS256" }), &payload);
    let claims = TokenParts::parse(&raw).unwrap().claims().unwrap();

    assert!(claims.roles().is_empty());
    assert!(claims.scopes().is_empty());
    assert_eq!(claims.name(), None);
    assert_eq!(claims.username(), None);
    assert_eq!(claims.email(), None);
    assert_eq!(claims.oid(), None);
    assert_eq!(claims.tid(), None);
    assert_eq!(serde_json::to_value(&claims).unwrap(), payload);
  }

  #[test]
  fn roles_skip_non_string_entries() {
    let raw = token(
      &json!({ "alg": "RS256" }),
      &json!({ "iss": "i", "aud": "a", "sub": "s", "exp": 1, "roles": ["Reader", 3, null, "Writer"] })
    );
    let claims = TokenParts::parse(&raw).unwrap().claims().unwrap();
    assert_eq!(claims.roles(), vec!["Reader", "Writer"]);
  }

  #[test]
  fn registered_claims_of_the_wrong_type_are_malformed() {
    for payload in [
      json!({ "iss": "i", "aud": "a", "sub": "s", "exp": "tomorrow" }),
      json!({ "iss": "i", "aud": 5, "sub": "s", "exp": 1 }),
      json!({ "iss": "i", "aud": "a", "sub": "s", "exp": 1, "nbf": 1.5 })
    ] {
      let raw = token(&json!({ "alg": "RS256" }), &payload);
      assert!(
        matches!(TokenParts::parse(&raw).unwrap().claims(), Err(AuthError::MalformedToken(_))),
        "{payload}"
      );
    }
  }

  #[test]
  fn claims_without_subject_are_malformed() {
    let raw = token(
      &json!({ "alg": "RS256" }),
      &json!({ "iss": "i", "aud": "a", "exp": 1 })
    );
    assert!(matches!(
      TokenParts::parse(&raw).unwrap().claims(),
      Err(AuthError::MalformedToken(_))
    ));
  }

  #[test]
  fn timestamps_format_like_javascript() {
    assert_eq!(iso8601(0).as_deref(), Some("1970-01-01T00:00:00.000Z"));
    assert_eq!(iso8601(1_700_000_000).as_deref(), Some("2023-11-14T22:13:20.000Z"));
  }
}
