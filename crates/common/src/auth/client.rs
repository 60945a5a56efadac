//! Keycloak-compatible identity provider client
//!
//! Talks to the OpenID Connect endpoints of a realm:
//! - Session check (refresh-token grant against a persisted session)
//! - Token refresh
//! - Server-side logout
//! - Login URL construction

use async_trait::async_trait;
use reqwest::{Client, Response};
use tracing::{debug, info};

use super::traits::IdentityProvider;
use super::types::{
    HandshakeOutcome, IdentityConfig, IdentityError, InitOptions, LogoutOptions, OnLoad,
    ProviderError, TokenResponse, TokenSet,
};

/// OpenID Connect client for a Keycloak realm
///
/// Holds only the HTTP transport; realm coordinates are supplied per call so
/// one client can serve every identity instance of the process.
#[derive(Debug, Clone)]
pub struct KeycloakClient {
    client: Client,
}

impl KeycloakClient {
    /// Create a client with a 30 second request timeout.
    ///
    /// Set `SIM_DISABLE_PROXY` to bypass system proxies.
    #[must_use]
    pub fn new() -> Self {
        let builder = Client::builder().timeout(std::time::Duration::from_secs(30));
        let builder = if std::env::var_os("SIM_DISABLE_PROXY").is_some() {
            builder.no_proxy()
        } else {
            builder
        };
        Self { client: builder.build().unwrap_or_else(|_| Client::new()) }
    }

    /// Wrap an existing HTTP client.
    #[must_use]
    pub const fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn token_grant(
        &self,
        config: &IdentityConfig,
        refresh_token: &str,
    ) -> Result<TokenSet, IdentityError> {
        if refresh_token.is_empty() {
            return Err(IdentityError::NoRefreshToken);
        }

        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", config.client_id.as_str()),
            ("refresh_token", refresh_token),
        ];

        let response = self.client.post(config.token_url()).form(&params).send().await?;
        let response = Self::check_status(response).await?;

        let token_response: TokenResponse =
            response.json().await.map_err(|e| IdentityError::Parse(e.to_string()))?;

        Ok(token_response.into())
    }

    async fn check_status(response: Response) -> Result<Response, IdentityError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ProviderError>(&body) {
            Ok(error) => Err(IdentityError::Provider(error)),
            Err(_) => Err(IdentityError::Parse(format!(
                "unexpected status {} from identity provider",
                status.as_u16()
            ))),
        }
    }

    fn no_session(
        &self,
        config: &IdentityConfig,
        options: &InitOptions,
    ) -> Result<HandshakeOutcome, IdentityError> {
        match options.on_load {
            OnLoad::CheckSso => Ok(HandshakeOutcome::unauthenticated()),
            OnLoad::LoginRequired => {
                Err(IdentityError::LoginRequired { login_url: self.login_url(config, None) })
            }
        }
    }
}

impl Default for KeycloakClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProvider for KeycloakClient {
    async fn check_session(
        &self,
        config: &IdentityConfig,
        options: &InitOptions,
        persisted: Option<TokenSet>,
    ) -> Result<HandshakeOutcome, IdentityError> {
        let Some(tokens) = persisted else {
            debug!(realm = %config.realm, "No persisted session");
            return self.no_session(config, options);
        };

        match tokens.refresh_token.as_deref() {
            Some(refresh_token) => match self.token_grant(config, refresh_token).await {
                Ok(fresh) => {
                    info!(realm = %config.realm, "Existing session confirmed by identity provider");
                    Ok(HandshakeOutcome::authenticated(fresh))
                }
                Err(IdentityError::Provider(error)) if error.is_invalid_grant() => {
                    debug!(realm = %config.realm, %error, "Persisted session no longer active");
                    self.no_session(config, options)
                }
                Err(other) => Err(other),
            },
            None if !tokens.is_expired(0) => Ok(HandshakeOutcome::authenticated(tokens)),
            None => self.no_session(config, options),
        }
    }

    async fn refresh_tokens(
        &self,
        config: &IdentityConfig,
        refresh_token: &str,
    ) -> Result<TokenSet, IdentityError> {
        self.token_grant(config, refresh_token).await
    }

    async fn end_session(
        &self,
        config: &IdentityConfig,
        tokens: Option<&TokenSet>,
        _options: &LogoutOptions,
    ) -> Result<(), IdentityError> {
        let Some(refresh_token) = tokens.and_then(|t| t.refresh_token.as_deref()) else {
            debug!(realm = %config.realm, "No refresh token, nothing to end server-side");
            return Ok(());
        };

        let params = [("client_id", config.client_id.as_str()), ("refresh_token", refresh_token)];
        let response = self.client.post(config.logout_url()).form(&params).send().await?;
        Self::check_status(response).await?;

        info!(realm = %config.realm, "Session ended at identity provider");
        Ok(())
    }

    fn login_url(&self, config: &IdentityConfig, redirect_uri: Option<&str>) -> String {
        let mut params = vec![
            ("client_id", config.client_id.as_str()),
            ("response_type", "code"),
            ("scope", "openid"),
        ];
        if let Some(redirect) = redirect_uri {
            params.push(("redirect_uri", redirect));
        }

        let query = params
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        format!("{}?{}", config.authorization_url(), query)
    }
}
