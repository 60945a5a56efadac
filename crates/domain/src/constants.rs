//! Application constants
//!
//! Centralized location for session and transport constants used throughout
//! the workspace.

// Transport
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

// Token lifecycle
/// Minimum validity requested when refreshing after a 401 response.
pub const RETRY_REFRESH_MIN_VALIDITY_SECS: i64 = 30;
/// Minimum validity guaranteed by `valid_token` style lookups.
pub const VALID_TOKEN_MIN_VALIDITY_SECS: i64 = 300;

// Environment variable names
pub const ENV_KEYCLOAK_URL: &str = "SIM_KEYCLOAK_URL";
pub const ENV_KEYCLOAK_REALM: &str = "SIM_KEYCLOAK_REALM";
pub const ENV_KEYCLOAK_CLIENT_ID: &str = "SIM_KEYCLOAK_CLIENT_ID";
pub const ENV_API_BASE_URL: &str = "SIM_API_BASE_URL";
pub const ENV_API_TIMEOUT_SECS: &str = "SIM_API_TIMEOUT_SECS";
pub const ENV_APP_ORIGIN: &str = "SIM_APP_ORIGIN";
pub const ENV_SILENT_CHECK_SSO_URI: &str = "SIM_SILENT_CHECK_SSO_URI";
pub const ENV_SESSION_FILE: &str = "SIM_SESSION_FILE";
