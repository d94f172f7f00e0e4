use axum::http::{header, HeaderName};

// ---------- ENVIRONMENT ----------

/// force var name to be the same as its string value
macro_rules! constant {
  ($name:ident) => {
    pub const $name: &str = stringify!($name);
  }
}

// Tenant + app registration
constant!(TENANT_ID);
constant!(CLIENT_ID);
constant!(AUDIENCES);
constant!(ISSUER_TEMPLATE);

// Signing keys
constant!(JWKS_URI);
constant!(ALLOWED_ALGORITHMS);
constant!(KEY_CACHE_TTL_SECS);
constant!(KEY_REFRESH_INTERVAL_SECS);
constant!(KEY_FETCH_TIMEOUT_SECS);
constant!(CLOCK_SKEW_SECS);

// HTTP surface
constant!(CORS_ALLOWED_ORIGIN);
constant!(ENVIRONMENT);
constant!(LOG_LEVEL);

// ---------- DEFAULTS ----------

/// `{tenant}` is replaced with `TENANT_ID`.
pub const DEFAULT_ISSUER_TEMPLATE: &str = "https://login.microsoftonline.com/{tenant}/v2.0";
/// Prefix the identity provider puts in front of the client id
/// when the app exposes an API scope.
pub const AUDIENCE_URI_PREFIX: &str = "api://";
pub const DEFAULT_ALGORITHMS: &str = "RS256";
pub const DEFAULT_CLOCK_SKEW_SECS: i64 = 5 * 60;
pub const DEFAULT_KEY_CACHE_TTL_SECS: i64 = 24 * 60 * 60;
/// Least time between two key set fetches caused by unknown `kid`s.
pub const DEFAULT_KEY_REFRESH_INTERVAL_SECS: i64 = 5 * 60;
pub const DEFAULT_KEY_FETCH_TIMEOUT_SECS: u64 = 8;
pub const DEFAULT_CORS_ORIGIN: &str = "*";
pub const DEFAULT_ENVIRONMENT: &str = "local";
pub const DEFAULT_LOG_LEVEL: &str = "info";

// Source: https://openid.net/specs/openid-connect-discovery-1_0.html#ProviderConfig
pub const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";

// ---------- ROUTES ----------

pub const PROTECTED_ROUTE: &str = "/api/protected";

// ---------- CORS HEADERS ----------

pub const PREFLIGHT_HEADERS: [(HeaderName, &str); 2] = [
  (header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, OPTIONS"),
  (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type, Authorization")
];
