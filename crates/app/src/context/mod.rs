//! Session context - composition root for identity and API access

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sim_common::auth::{
    FileSessionStore, IdentityError, IdentityService, InitOptions, LogoutOptions,
    MemorySessionStore, OnLoad, SessionStore,
};
use sim_domain::{Config, Result};
use sim_infra::api::{ApiClient, ApiClientConfig, ExternalApi, Navigator};
use sim_infra::HttpClient;
use tracing::{error, info, warn};

/// Owns the identity service and both API callers.
///
/// Cheap to share behind an `Arc`; every accessor borrows.
pub struct SessionContext {
    config: Config,
    identity: IdentityService,
    api: ApiClient,
    external: ExternalApi,
    loading: AtomicBool,
}

impl SessionContext {
    /// Build from configuration with the Keycloak provider.
    ///
    /// # Errors
    /// Returns error if an HTTP transport cannot be built
    pub fn new(config: Config) -> Result<Self> {
        let identity = IdentityService::builder(config.identity.clone())
            .store(session_store(&config))
            .refresh_min_validity(config.session.refresh_min_validity_seconds)
            .token_min_validity(config.session.token_min_validity_seconds)
            .build();
        Self::with_identity(config, identity, None)
    }

    /// Build around an existing identity service, optionally with a custom
    /// post-logout navigator.
    ///
    /// # Errors
    /// Returns error if an HTTP transport cannot be built
    pub fn with_identity(
        config: Config,
        identity: IdentityService,
        navigator: Option<Arc<dyn Navigator>>,
    ) -> Result<Self> {
        let mut builder = ApiClient::builder(identity.clone())
            .config(ApiClientConfig::from_settings(&config.api, &config.session));
        if let Some(navigator) = navigator {
            builder = builder.navigator(navigator);
        }
        let api = builder.build()?;

        let http = HttpClient::builder()
            .timeout(std::time::Duration::from_secs(config.api.timeout_seconds))
            .build()?;
        let external = ExternalApi::new(http, identity.clone());

        Ok(Self { config, identity, api, external, loading: AtomicBool::new(true) })
    }

    /// Run the identity handshake.
    ///
    /// Never fails: missing configuration and handshake errors are logged
    /// and reported as `false`.
    pub async fn init(&self) -> bool {
        let authenticated = self.init_inner().await;
        self.loading.store(false, Ordering::SeqCst);
        authenticated
    }

    async fn init_inner(&self) -> bool {
        if !self.identity.is_configured() {
            warn!(
                missing = ?self.config.identity.missing_fields(),
                "Identity configuration incomplete, continuing unauthenticated"
            );
            return false;
        }

        match self.identity.initialize(self.init_options()).await {
            Ok(authenticated) => {
                info!(authenticated, "Session initialized");
                authenticated
            }
            Err(e) => {
                error!(error = %e, "Session initialization failed");
                false
            }
        }
    }

    fn init_options(&self) -> InitOptions {
        InitOptions {
            on_load: OnLoad::CheckSso,
            check_login_iframe: false,
            silent_check_sso_redirect_uri: self.config.session.silent_check_sso_redirect_uri.clone(),
        }
    }

    /// Clear the local session, then end it at the provider.
    ///
    /// # Errors
    /// Propagates the provider logout failure
    pub async fn logout(&self) -> std::result::Result<(), IdentityError> {
        let options = LogoutOptions { redirect_uri: self.config.session.app_origin.clone() };
        self.identity.logout(&options).await.inspect_err(|e| {
            error!(error = %e, "Logout failed");
        })
    }

    /// Token valid for at least the configured minimum, if any.
    ///
    /// Refreshes against the identity provider first when the held token is
    /// about to expire; use [`current_token`](Self::current_token) where a
    /// network round trip is not acceptable.
    pub async fn get_token(&self) -> Option<String> {
        self.identity.valid_token().await
    }

    /// Token currently held, without refreshing. May be close to expiry.
    #[must_use]
    pub fn current_token(&self) -> Option<String> {
        if !self.identity.is_configured() {
            return None;
        }
        self.identity.current_token()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_authenticated()
    }

    /// `true` until the first [`init`](Self::init) settles.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    #[must_use]
    pub const fn api(&self) -> &ApiClient {
        &self.api
    }

    #[must_use]
    pub const fn external(&self) -> &ExternalApi {
        &self.external
    }

    #[must_use]
    pub const fn identity(&self) -> &IdentityService {
        &self.identity
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Tear down the identity service (timer included).
    pub fn close(&self) {
        self.identity.reset();
        info!("Session context closed");
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("identity", &self.identity)
            .field("api", &self.api)
            .field("loading", &self.is_loading())
            .finish_non_exhaustive()
    }
}

fn session_store(config: &Config) -> Arc<dyn SessionStore> {
    match &config.session.session_file {
        Some(path) => Arc::new(FileSessionStore::new(path.clone())),
        None => Arc::new(MemorySessionStore::new()),
    }
}

#[cfg(test)]
mod tests {
    use sim_common::testing::{configured_settings, MockIdentityProvider};

    use super::*;

    fn configured() -> Config {
        let mut config = Config::default();
        config.identity = configured_settings();
        config.api.base_url = "https://api.example.com".into();
        config.session.app_origin = Some("https://app.example.com".into());
        config
    }

    fn context_with(provider: Arc<MockIdentityProvider>) -> SessionContext {
        let config = configured();
        let identity = IdentityService::builder(config.identity.clone()).provider(provider).build();
        SessionContext::with_identity(config, identity, None).unwrap()
    }

    #[tokio::test]
    async fn init_without_configuration_is_unauthenticated() {
        let context = SessionContext::new(Config::default()).unwrap();
        assert!(context.is_loading());

        assert!(!context.init().await);
        assert!(!context.is_loading());
        assert!(!context.is_authenticated());
        assert!(context.get_token().await.is_none());
        assert!(context.current_token().is_none());
    }

    #[tokio::test]
    async fn init_and_token_lookup() {
        let provider = Arc::new(MockIdentityProvider::authenticated("access-1", 3600));
        let context = context_with(provider.clone());

        assert!(context.init().await);
        assert!(context.is_authenticated());
        assert_eq!(context.get_token().await.as_deref(), Some("access-1"));
        assert_eq!(provider.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn get_token_refreshes_when_close_to_expiry() {
        let provider = Arc::new(MockIdentityProvider::authenticated("short-lived", 60));
        let context = context_with(provider.clone());
        context.init().await;

        assert_eq!(context.get_token().await.as_deref(), Some("refreshed-access"));
        assert_eq!(provider.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn current_token_never_refreshes() {
        let provider = Arc::new(MockIdentityProvider::authenticated("short-lived", 60));
        let context = context_with(provider.clone());
        context.init().await;

        assert_eq!(context.current_token().as_deref(), Some("short-lived"));
        assert_eq!(provider.refresh_calls(), 0);

        assert_eq!(context.get_token().await.as_deref(), Some("refreshed-access"));
        assert_eq!(context.current_token().as_deref(), Some("refreshed-access"));
        assert_eq!(provider.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn handshake_failure_settles_loading() {
        let provider = Arc::new(MockIdentityProvider::new());
        provider.script_handshake(sim_common::testing::HandshakeScript::Fail);
        let context = context_with(provider);

        assert!(!context.init().await);
        assert!(!context.is_loading());
    }

    #[tokio::test]
    async fn logout_propagates_failure_after_local_clear() {
        let provider = Arc::new(MockIdentityProvider::authenticated("access-1", 3600));
        provider.fail_logout(true);
        let context = context_with(provider.clone());
        context.init().await;

        assert!(context.logout().await.is_err());
        assert!(!context.is_authenticated());
        assert_eq!(provider.logout_calls(), 1);
    }

    #[tokio::test]
    async fn close_resets_identity() {
        let provider = Arc::new(MockIdentityProvider::authenticated("access-1", 3600));
        let context = context_with(provider);
        context.init().await;
        assert!(context.identity().has_expiry_timer());

        context.close();
        assert!(!context.identity().has_expiry_timer());
        assert!(context.identity().instance().is_none());
    }
}
