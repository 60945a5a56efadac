//! Identity client: one authenticated session with the identity provider
//!
//! Owns the current token set and authenticated flag. Reads are synchronous
//! and never touch the network so request decoration cannot block; writes
//! happen on handshake, refresh, logout and local cleanup.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::traits::{IdentityProvider, SessionStore};
use super::types::{IdentityConfig, IdentityError, InitOptions, LogoutOptions, RefreshOutcome, TokenSet};

#[derive(Debug, Default)]
struct SessionState {
    tokens: Option<TokenSet>,
    authenticated: bool,
}

/// Session handle for a configured realm
pub struct IdentityClient {
    config: IdentityConfig,
    provider: Arc<dyn IdentityProvider>,
    store: Arc<dyn SessionStore>,
    state: RwLock<SessionState>,
}

impl IdentityClient {
    #[must_use]
    pub fn new(
        config: IdentityConfig,
        provider: Arc<dyn IdentityProvider>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self { config, provider, store, state: RwLock::new(SessionState::default()) }
    }

    #[must_use]
    pub const fn config(&self) -> &IdentityConfig {
        &self.config
    }

    /// Current access token, `None` when absent or empty.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.state
            .read()
            .tokens
            .as_ref()
            .map(|t| t.access_token.clone())
            .filter(|token| !token.is_empty())
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state.read().authenticated
    }

    #[must_use]
    pub fn token_expiry(&self) -> Option<DateTime<Utc>> {
        self.state.read().tokens.as_ref().and_then(|t| t.expires_at)
    }

    #[must_use]
    pub fn tokens(&self) -> Option<TokenSet> {
        self.state.read().tokens.clone()
    }

    /// Perform the handshake and record its outcome.
    ///
    /// # Errors
    /// Returns error if the session store or the identity provider fails
    pub async fn init(&self, options: &InitOptions) -> Result<bool, IdentityError> {
        let persisted = self.store.load().await?;
        let outcome = self.provider.check_session(&self.config, options, persisted).await?;

        match (&outcome.tokens, outcome.authenticated) {
            (Some(tokens), true) => {
                self.store.save(tokens).await?;
                self.apply(Some(tokens.clone()), true);
                info!(realm = %self.config.realm, "Identity handshake authenticated");
                Ok(true)
            }
            _ => {
                self.store.clear().await?;
                self.apply(None, false);
                debug!(realm = %self.config.realm, "Identity handshake found no session");
                Ok(false)
            }
        }
    }

    /// Refresh the token if it expires within `min_validity_seconds`.
    ///
    /// A negative threshold forces the refresh.
    ///
    /// # Errors
    /// Returns error if not authenticated, no refresh token is held, or the
    /// provider rejects the refresh
    pub async fn update_token(
        &self,
        min_validity_seconds: i64,
    ) -> Result<RefreshOutcome, IdentityError> {
        let current = {
            let state = self.state.read();
            if !state.authenticated {
                return Err(IdentityError::NotAuthenticated);
            }
            state.tokens.clone().ok_or(IdentityError::NotAuthenticated)?
        };

        if min_validity_seconds >= 0 && !current.is_expired(min_validity_seconds) {
            return Ok(RefreshOutcome { refreshed: false, token: Some(current.access_token) });
        }

        let refresh_token = current.refresh_token.as_deref().ok_or(IdentityError::NoRefreshToken)?;
        let mut fresh = self.provider.refresh_tokens(&self.config, refresh_token).await?;
        if fresh.refresh_token.is_none() {
            fresh.refresh_token = current.refresh_token.clone();
        }

        self.store.save(&fresh).await?;
        let token = fresh.access_token.clone();
        if !self.apply_if_current(fresh, current.refresh_token.as_deref()) {
            debug!(realm = %self.config.realm, "Session ended during refresh, discarding new tokens");
            if let Err(e) = self.store.clear().await {
                warn!(realm = %self.config.realm, error = %e, "Failed to clear persisted session");
            }
            return Err(IdentityError::NotAuthenticated);
        }

        debug!(realm = %self.config.realm, "Access token refreshed");
        Ok(RefreshOutcome { refreshed: true, token: Some(token) })
    }

    /// Clear the local session, then end it at the provider.
    ///
    /// Local state is cleared whatever the provider answers.
    ///
    /// # Errors
    /// Returns the provider's error if the server-side logout failed
    pub async fn logout(&self, options: &LogoutOptions) -> Result<(), IdentityError> {
        let tokens = self.tokens();
        self.apply(None, false);
        if let Err(e) = self.store.clear().await {
            warn!(realm = %self.config.realm, error = %e, "Failed to clear persisted session");
        }

        let result = self.provider.end_session(&self.config, tokens.as_ref(), options).await;
        if let Err(e) = &result {
            warn!(realm = %self.config.realm, error = %e, "Identity provider logout failed");
        }
        result
    }

    /// Login entry point for interactive authentication.
    #[must_use]
    pub fn create_login_url(&self, redirect_uri: Option<&str>) -> String {
        self.provider.login_url(&self.config, redirect_uri)
    }

    /// Drop persisted and in-memory session state.
    ///
    /// # Errors
    /// Returns error if the persisted session cannot be removed; in-memory
    /// state is cleared regardless
    pub async fn clear_local_session(&self) -> Result<(), IdentityError> {
        self.apply(None, false);
        self.store.clear().await
    }

    /// Mark the session as no longer usable without contacting anyone.
    pub fn expire(&self) {
        let mut state = self.state.write();
        state.authenticated = false;
        if let Some(tokens) = state.tokens.as_mut() {
            tokens.access_token.clear();
        }
    }

    /// Install refreshed tokens only if the session they were refreshed from
    /// is still the current one.
    fn apply_if_current(&self, fresh: TokenSet, refreshed_from: Option<&str>) -> bool {
        let mut state = self.state.write();
        let current = state.tokens.as_ref().and_then(|t| t.refresh_token.as_deref());
        if !state.authenticated || current != refreshed_from {
            return false;
        }
        state.tokens = Some(fresh);
        true
    }

    fn apply(&self, tokens: Option<TokenSet>, authenticated: bool) {
        let mut state = self.state.write();
        state.tokens = tokens;
        state.authenticated = authenticated;
    }
}

impl std::fmt::Debug for IdentityClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityClient")
            .field("config", &self.config)
            .field("authenticated", &self.is_authenticated())
            .field("token_expiry", &self.token_expiry())
            .finish_non_exhaustive()
    }
}
