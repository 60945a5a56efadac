//! Configuration structures
//!
//! Identity settings are deliberately optional: the rest of the application
//! must keep working unauthenticated when they are absent, and validation
//! only happens once the identity service is actually used.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_API_TIMEOUT_SECS, RETRY_REFRESH_MIN_VALIDITY_SECS, VALID_TOKEN_MIN_VALIDITY_SECS,
};

/// Top-level application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub identity: IdentitySettings,
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub session: SessionSettings,
}

/// Identity provider coordinates (issuer, realm, client)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySettings {
    /// Issuer base URL, e.g. `https://sso.example.com`
    #[serde(default)]
    pub issuer_url: Option<String>,
    /// Realm (tenant) identifier
    #[serde(default)]
    pub realm: Option<String>,
    /// Public client identifier
    #[serde(default)]
    pub client_id: Option<String>,
}

impl IdentitySettings {
    /// Names of the required values that are absent or blank.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("issuer_url", &self.issuer_url),
            ("realm", &self.realm),
            ("client_id", &self.client_id),
        ]
        .into_iter()
        .filter(|(_, value)| value.as_deref().map_or(true, |v| v.trim().is_empty()))
        .map(|(name, _)| name)
        .collect()
    }

    /// `true` when every required value is present.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.missing_fields().is_empty()
    }
}

/// Backend API settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiSettings {
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self { base_url: String::new(), timeout_seconds: DEFAULT_API_TIMEOUT_SECS }
    }
}

/// Session lifecycle settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Post-logout redirect target (the application's own origin)
    #[serde(default)]
    pub app_origin: Option<String>,
    #[serde(default)]
    pub silent_check_sso_redirect_uri: Option<String>,
    /// Threshold passed to the refresh call after a 401
    #[serde(default = "default_refresh_min_validity")]
    pub refresh_min_validity_seconds: i64,
    /// Validity guaranteed by on-demand token lookups
    #[serde(default = "default_token_min_validity")]
    pub token_min_validity_seconds: i64,
    /// Persist the session to this file instead of keeping it in memory
    #[serde(default)]
    pub session_file: Option<PathBuf>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            app_origin: None,
            silent_check_sso_redirect_uri: None,
            refresh_min_validity_seconds: RETRY_REFRESH_MIN_VALIDITY_SECS,
            token_min_validity_seconds: VALID_TOKEN_MIN_VALIDITY_SECS,
            session_file: None,
        }
    }
}

const fn default_timeout_seconds() -> u64 {
    DEFAULT_API_TIMEOUT_SECS
}

const fn default_refresh_min_validity() -> i64 {
    RETRY_REFRESH_MIN_VALIDITY_SECS
}

const fn default_token_min_validity() -> i64 {
    VALID_TOKEN_MIN_VALIDITY_SECS
}
