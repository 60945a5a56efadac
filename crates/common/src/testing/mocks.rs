//! Mock implementations of the identity traits
//!
//! [`MockIdentityProvider`] answers from scripts instead of the network and
//! counts every call so tests can assert single-flight behaviour.

// Test helpers: panics and missing docs are acceptable here
#![allow(clippy::missing_panics_doc)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::auth::{
    HandshakeOutcome, IdentityConfig, IdentityError, IdentityProvider, InitOptions, LogoutOptions,
    ProviderError, TokenSet,
};

/// Scripted handshake answer
#[derive(Debug, Clone)]
pub enum HandshakeScript {
    Unauthenticated,
    Authenticated(TokenSet),
    Fail,
}

/// Scripted refresh answer
#[derive(Debug, Clone)]
pub enum RefreshScript {
    Succeed(TokenSet),
    Fail,
}

/// Identity provider double with call counters
#[derive(Debug)]
pub struct MockIdentityProvider {
    handshake: Mutex<HandshakeScript>,
    refresh: Mutex<RefreshScript>,
    latency: Mutex<Option<Duration>>,
    fail_logout: AtomicBool,
    handshake_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    logout_calls: AtomicUsize,
    last_logout_had_tokens: AtomicBool,
}

impl MockIdentityProvider {
    /// No session; refreshes succeed with a one-hour token.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handshake: Mutex::new(HandshakeScript::Unauthenticated),
            refresh: Mutex::new(RefreshScript::Succeed(TokenSet::new(
                "refreshed-access",
                Some("refreshed-refresh".to_string()),
                None,
                3600,
            ))),
            latency: Mutex::new(None),
            fail_logout: AtomicBool::new(false),
            handshake_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            last_logout_had_tokens: AtomicBool::new(false),
        }
    }

    /// Handshake succeeds with `access_token` valid for `expires_in` seconds.
    #[must_use]
    pub fn authenticated(access_token: &str, expires_in: i64) -> Self {
        let provider = Self::new();
        provider.script_handshake(HandshakeScript::Authenticated(TokenSet::new(
            access_token,
            Some("refresh-1".to_string()),
            None,
            expires_in,
        )));
        provider
    }

    pub fn script_handshake(&self, script: HandshakeScript) {
        *self.handshake.lock() = script;
    }

    pub fn script_refresh(&self, script: RefreshScript) {
        *self.refresh.lock() = script;
    }

    /// Delay every handshake, refresh and logout by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    pub fn fail_logout(&self, fail: bool) {
        self.fail_logout.store(fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn handshake_calls(&self) -> usize {
        self.handshake_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    /// Whether the most recent logout carried the session tokens.
    #[must_use]
    pub fn last_logout_had_tokens(&self) -> bool {
        self.last_logout_had_tokens.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn rejected(error: &str) -> IdentityError {
        IdentityError::Provider(ProviderError {
            error: error.to_string(),
            error_description: Some("scripted failure".to_string()),
        })
    }
}

impl Default for MockIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn check_session(
        &self,
        _config: &IdentityConfig,
        _options: &InitOptions,
        _persisted: Option<TokenSet>,
    ) -> Result<HandshakeOutcome, IdentityError> {
        self.handshake_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        let script = self.handshake.lock().clone();
        match script {
            HandshakeScript::Unauthenticated => Ok(HandshakeOutcome::unauthenticated()),
            HandshakeScript::Authenticated(tokens) => Ok(HandshakeOutcome::authenticated(tokens)),
            HandshakeScript::Fail => Err(IdentityError::Parse("scripted handshake failure".into())),
        }
    }

    async fn refresh_tokens(
        &self,
        _config: &IdentityConfig,
        _refresh_token: &str,
    ) -> Result<TokenSet, IdentityError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        let script = self.refresh.lock().clone();
        match script {
            RefreshScript::Succeed(tokens) => Ok(tokens),
            RefreshScript::Fail => Err(Self::rejected("invalid_grant")),
        }
    }

    async fn end_session(
        &self,
        _config: &IdentityConfig,
        tokens: Option<&TokenSet>,
        _options: &LogoutOptions,
    ) -> Result<(), IdentityError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        self.last_logout_had_tokens.store(tokens.is_some(), Ordering::SeqCst);
        self.simulate_latency().await;

        if self.fail_logout.load(Ordering::SeqCst) {
            return Err(Self::rejected("logout_failed"));
        }
        Ok(())
    }

    fn login_url(&self, config: &IdentityConfig, redirect_uri: Option<&str>) -> String {
        match redirect_uri {
            Some(redirect) => format!("{}?redirect_uri={redirect}", config.authorization_url()),
            None => config.authorization_url(),
        }
    }
}
