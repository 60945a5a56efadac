//! Traits for identity provider and session storage operations
//!
//! These traits enable dependency injection and testing by abstracting
//! external dependencies (the identity provider, local session persistence).

use async_trait::async_trait;

use super::types::{HandshakeOutcome, IdentityConfig, IdentityError, InitOptions, LogoutOptions, TokenSet};

/// Network-facing identity provider operations
///
/// Implementations are stateless with respect to the session: the current
/// tokens are owned by [`IdentityClient`](super::IdentityClient) and passed in.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Check for an existing session without forcing a login.
    ///
    /// # Arguments
    /// * `persisted` - Tokens recovered from local storage, if any
    ///
    /// # Errors
    /// Returns error if the provider cannot be reached or, with
    /// [`OnLoad::LoginRequired`](super::OnLoad::LoginRequired), when no
    /// session exists
    async fn check_session(
        &self,
        config: &IdentityConfig,
        options: &InitOptions,
        persisted: Option<TokenSet>,
    ) -> Result<HandshakeOutcome, IdentityError>;

    /// Exchange a refresh token for a new token set.
    ///
    /// # Errors
    /// Returns error if the refresh token is rejected or the call fails
    async fn refresh_tokens(
        &self,
        config: &IdentityConfig,
        refresh_token: &str,
    ) -> Result<TokenSet, IdentityError>;

    /// Invalidate the session server-side.
    ///
    /// # Errors
    /// Returns error if the provider rejects or cannot receive the request
    async fn end_session(
        &self,
        config: &IdentityConfig,
        tokens: Option<&TokenSet>,
        options: &LogoutOptions,
    ) -> Result<(), IdentityError>;

    /// Login entry point for interactive authentication.
    fn login_url(&self, config: &IdentityConfig, redirect_uri: Option<&str>) -> String;
}

/// Local persistence of the current session
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the persisted session, `None` if nothing is stored.
    ///
    /// # Errors
    /// Returns error if the backing storage cannot be read
    async fn load(&self) -> Result<Option<TokenSet>, IdentityError>;

    /// Persist the session, replacing any previous one.
    ///
    /// # Errors
    /// Returns error if the backing storage cannot be written
    async fn save(&self, tokens: &TokenSet) -> Result<(), IdentityError>;

    /// Remove the persisted session. Clearing an empty store succeeds.
    ///
    /// # Errors
    /// Returns error if the backing storage cannot be modified
    async fn clear(&self) -> Result<(), IdentityError>;
}

/// Cleanup run when the expiry timer cannot keep the session alive
///
/// Installed on [`IdentityService`](super::IdentityService) by the layer that
/// owns logout redirection. Without one, the service logs the session out
/// itself.
#[async_trait]
pub trait SessionExpiryHandler: Send + Sync {
    async fn session_expired(&self);
}
