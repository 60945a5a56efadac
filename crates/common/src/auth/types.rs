//! Identity types and structures
//!
//! Defines the session data exchanged with the identity provider: validated
//! configuration, token sets, handshake options and outcomes, and the error
//! taxonomy of the identity layer.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sim_domain::IdentitySettings;
use thiserror::Error;

/// Required identity configuration is absent.
///
/// Fatal and never retried: construction of the identity client refuses to
/// proceed with partial configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("identity configuration is missing: {}", .missing.join(", "))]
pub struct ConfigurationError {
    /// Names of the absent settings
    pub missing: Vec<&'static str>,
}

/// Errors raised by the identity layer.
///
/// These never reach the UI layer directly: the identity service absorbs
/// them into boolean outcomes.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("interactive login required: {login_url}")]
    LoginRequired { login_url: String },

    #[error("not authenticated")]
    NotAuthenticated,

    #[error("no refresh token available")]
    NoRefreshToken,

    #[error("identity provider rejected request: {0}")]
    Provider(ProviderError),

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("failed to parse provider response: {0}")]
    Parse(String),

    #[error("session store error: {0}")]
    Store(String),
}

/// Error body returned by the token and logout endpoints
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderError {
    pub error: String,
    pub error_description: Option<String>,
}

impl ProviderError {
    /// The refresh token is no longer accepted (session ended server-side).
    #[must_use]
    pub fn is_invalid_grant(&self) -> bool {
        self.error == "invalid_grant"
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error_description {
            Some(desc) => write!(f, "{}: {}", self.error, desc),
            None => write!(f, "{}", self.error),
        }
    }
}

/// Validated identity provider coordinates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityConfig {
    /// Issuer base URL without trailing slash
    pub issuer_url: String,
    pub realm: String,
    pub client_id: String,
}

impl IdentityConfig {
    #[must_use]
    pub fn new(
        issuer_url: impl Into<String>,
        realm: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        let issuer_url: String = issuer_url.into();
        Self {
            issuer_url: issuer_url.trim_end_matches('/').to_string(),
            realm: realm.into(),
            client_id: client_id.into(),
        }
    }

    /// Validate raw settings.
    ///
    /// # Errors
    /// Returns [`ConfigurationError`] naming every missing value.
    pub fn from_settings(settings: &IdentitySettings) -> Result<Self, ConfigurationError> {
        match (&settings.issuer_url, &settings.realm, &settings.client_id) {
            (Some(url), Some(realm), Some(client_id)) if settings.is_configured() => {
                Ok(Self::new(url.trim(), realm.trim(), client_id.trim()))
            }
            _ => Err(ConfigurationError { missing: settings.missing_fields() }),
        }
    }

    /// `{issuer}/realms/{realm}`
    #[must_use]
    pub fn realm_url(&self) -> String {
        format!("{}/realms/{}", self.issuer_url, self.realm)
    }

    #[must_use]
    pub fn authorization_url(&self) -> String {
        format!("{}/protocol/openid-connect/auth", self.realm_url())
    }

    #[must_use]
    pub fn token_url(&self) -> String {
        format!("{}/protocol/openid-connect/token", self.realm_url())
    }

    #[must_use]
    pub fn logout_url(&self) -> String {
        format!("{}/protocol/openid-connect/logout", self.realm_url())
    }
}

/// Access and refresh tokens with metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    /// Bearer credential attached to outgoing requests
    pub access_token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// OpenID Connect ID token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    pub token_type: String,

    /// Access token lifetime in seconds
    pub expires_in: i64,

    /// Absolute expiration timestamp (UTC)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenSet {
    /// Create a token set; `expires_at` is derived from `expires_in`.
    #[must_use]
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        id_token: Option<String>,
        expires_in: i64,
    ) -> Self {
        let expires_at =
            (expires_in > 0).then(|| Utc::now() + chrono::Duration::seconds(expires_in));

        Self {
            access_token: access_token.into(),
            refresh_token,
            id_token,
            token_type: "Bearer".to_string(),
            expires_in,
            expires_at,
        }
    }

    /// `true` if the access token expires within `threshold_seconds`.
    ///
    /// Tokens without an expiry never count as expired.
    #[must_use]
    pub fn is_expired(&self, threshold_seconds: i64) -> bool {
        self.expires_at.is_some_and(|expires_at| {
            Utc::now() + chrono::Duration::seconds(threshold_seconds) >= expires_at
        })
    }

    #[must_use]
    pub fn seconds_until_expiry(&self) -> Option<i64> {
        self.expires_at.map(|expires_at| (expires_at - Utc::now()).num_seconds())
    }
}

/// Token endpoint response (RFC 6749 §5.1)
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    #[serde(default)]
    pub expires_in: i64,
}

impl From<TokenResponse> for TokenSet {
    fn from(response: TokenResponse) -> Self {
        Self::new(response.access_token, response.refresh_token, response.id_token, response.expires_in)
    }
}

/// What the handshake does when no session exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OnLoad {
    /// Only look for an existing session, never force a login
    #[default]
    CheckSso,
    /// Fail with a login entry point when no session exists
    LoginRequired,
}

/// Handshake options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitOptions {
    pub on_load: OnLoad,
    pub check_login_iframe: bool,
    pub silent_check_sso_redirect_uri: Option<String>,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self { on_load: OnLoad::CheckSso, check_login_iframe: false, silent_check_sso_redirect_uri: None }
    }
}

/// Result of the identity handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeOutcome {
    pub authenticated: bool,
    pub tokens: Option<TokenSet>,
}

impl HandshakeOutcome {
    #[must_use]
    pub const fn unauthenticated() -> Self {
        Self { authenticated: false, tokens: None }
    }

    #[must_use]
    pub const fn authenticated(tokens: TokenSet) -> Self {
        Self { authenticated: true, tokens: Some(tokens) }
    }

    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.tokens.as_ref().map(|t| t.access_token.as_str())
    }

    #[must_use]
    pub fn token_expiry(&self) -> Option<DateTime<Utc>> {
        self.tokens.as_ref().and_then(|t| t.expires_at)
    }
}

/// Result of a refresh-if-expiring call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshOutcome {
    /// `false` when the token was still valid and nothing was exchanged
    pub refreshed: bool,
    pub token: Option<String>,
}

/// Logout options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogoutOptions {
    /// Where the provider should send the user afterwards
    pub redirect_uri: Option<String>,
}

#[cfg(test)]
mod tests {
    //! Unit tests for auth::types.
    use super::*;

    #[test]
    fn test_token_set_creation() {
        let token_set = TokenSet::new(
            "access_token_123",
            Some("refresh_token_456".to_string()),
            Some("id_token_789".to_string()),
            3600,
        );

        assert_eq!(token_set.access_token, "access_token_123");
        assert_eq!(token_set.refresh_token.as_deref(), Some("refresh_token_456"));
        assert!(token_set.expires_at.is_some());
        assert_eq!(token_set.token_type, "Bearer");
    }

    #[test]
    fn test_token_expiry_check() {
        let token_set = TokenSet::new("access", Some("refresh".to_string()), None, 3600);

        assert!(!token_set.is_expired(300));
        assert!(token_set.is_expired(7200));
    }

    #[test]
    fn test_token_without_expiry_never_expires() {
        let token_set = TokenSet::new("access", None, None, 0);
        assert!(token_set.expires_at.is_none());
        assert!(!token_set.is_expired(i64::from(u32::MAX)));
        assert_eq!(token_set.seconds_until_expiry(), None);
    }

    #[test]
    fn test_identity_config_endpoints() {
        let config = IdentityConfig::new("https://sso.example.com/", "sim", "sim-web");
        assert_eq!(config.realm_url(), "https://sso.example.com/realms/sim");
        assert_eq!(
            config.token_url(),
            "https://sso.example.com/realms/sim/protocol/openid-connect/token"
        );
        assert_eq!(
            config.logout_url(),
            "https://sso.example.com/realms/sim/protocol/openid-connect/logout"
        );
    }

    #[test]
    fn test_from_settings_lists_every_missing_value() {
        let settings = IdentitySettings {
            issuer_url: Some("https://sso.example.com".into()),
            realm: None,
            client_id: Some(String::new()),
        };

        let err = IdentityConfig::from_settings(&settings).unwrap_err();
        assert_eq!(err.missing, vec!["realm", "client_id"]);
        assert_eq!(err.to_string(), "identity configuration is missing: realm, client_id");
    }

    #[test]
    fn test_from_settings_trims_values() {
        let settings = IdentitySettings {
            issuer_url: Some(" https://sso.example.com ".into()),
            realm: Some("sim".into()),
            client_id: Some("sim-web".into()),
        };

        let config = IdentityConfig::from_settings(&settings).unwrap();
        assert_eq!(config.issuer_url, "https://sso.example.com");
    }

    #[test]
    fn test_token_response_conversion() {
        let response: TokenResponse = serde_json::from_str(
            r#"{"access_token":"a","refresh_token":"r","expires_in":300,"token_type":"Bearer"}"#,
        )
        .unwrap();
        let tokens = TokenSet::from(response);
        assert_eq!(tokens.access_token, "a");
        assert_eq!(tokens.expires_in, 300);
        assert!(tokens.id_token.is_none());
    }

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError {
            error: "invalid_grant".into(),
            error_description: Some("Session not active".into()),
        };
        assert!(err.is_invalid_grant());
        assert_eq!(err.to_string(), "invalid_grant: Session not active");
    }
}
