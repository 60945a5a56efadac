//! Identity service
//!
//! Owns the one long-lived [`IdentityClient`] of the process together with
//! its initialization and refresh coordination:
//!
//! ```text
//! ┌──────────────────┐
//! │ IdentityService  │  cheap Clone handle, one per composition root
//! └────────┬─────────┘
//!          ├──► IdentityClient       (lazily built from settings)
//!          ├──► init flight          (memoized until reset)
//!          ├──► refresh flight       (coalesces overlapping refreshes)
//!          └──► expiry timer task    (refreshes ahead of expiry)
//! ```
//!
//! Handshake and refresh failures are absorbed here and surface only as
//! boolean outcomes; missing configuration is the one error callers see.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use sim_domain::constants::{RETRY_REFRESH_MIN_VALIDITY_SECS, VALID_TOKEN_MIN_VALIDITY_SECS};
use sim_domain::IdentitySettings;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::client::KeycloakClient;
use super::identity::IdentityClient;
use super::store::MemorySessionStore;
use super::traits::{IdentityProvider, SessionExpiryHandler, SessionStore};
use super::types::{ConfigurationError, IdentityConfig, IdentityError, InitOptions, LogoutOptions};
use crate::sync::{FlightState, SingleFlight};

/// Observable initialization state: not started, in flight, or completed
/// with the authenticated flag.
pub type InitializationState = FlightState<bool>;

/// Lower bound between two timer-driven refreshes
const MIN_TIMER_DELAY: Duration = Duration::from_secs(5);

/// Negative validity threshold: refresh regardless of remaining lifetime
const FORCE_REFRESH: i64 = -1;

struct Inner {
    settings: IdentitySettings,
    provider: Arc<dyn IdentityProvider>,
    store: Arc<dyn SessionStore>,
    refresh_min_validity: i64,
    token_min_validity: i64,
    instance: Mutex<Option<Arc<IdentityClient>>>,
    init_flight: SingleFlight<bool>,
    refresh_flight: SingleFlight<bool>,
    expiry_timer: Mutex<Option<JoinHandle<()>>>,
    rearm: Arc<Notify>,
    expiry_handler: Mutex<Option<Weak<dyn SessionExpiryHandler>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(handle) = self.expiry_timer.get_mut().take() {
            handle.abort();
        }
    }
}

/// Identity service handle
///
/// Clones share the same client, flights and timer.
#[derive(Clone)]
pub struct IdentityService {
    inner: Arc<Inner>,
}

impl IdentityService {
    /// Service backed by [`KeycloakClient`] and an in-memory session store.
    #[must_use]
    pub fn new(settings: IdentitySettings) -> Self {
        Self::builder(settings).build()
    }

    #[must_use]
    pub fn builder(settings: IdentitySettings) -> IdentityServiceBuilder {
        IdentityServiceBuilder::new(settings)
    }

    /// `true` when every identity setting is present.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.inner.settings.is_configured()
    }

    /// Return the identity client, building it on first use.
    ///
    /// # Errors
    /// Returns [`ConfigurationError`] if any identity setting is missing
    pub fn get_instance(&self) -> Result<Arc<IdentityClient>, ConfigurationError> {
        let mut instance = self.inner.instance.lock();
        if let Some(client) = instance.as_ref() {
            return Ok(client.clone());
        }

        let config = IdentityConfig::from_settings(&self.inner.settings)?;
        debug!(issuer = %config.issuer_url, realm = %config.realm, "Creating identity client");
        let client = Arc::new(IdentityClient::new(
            config,
            self.inner.provider.clone(),
            self.inner.store.clone(),
        ));
        *instance = Some(client.clone());
        Ok(client)
    }

    /// The identity client if one has been built.
    #[must_use]
    pub fn instance(&self) -> Option<Arc<IdentityClient>> {
        self.inner.instance.lock().clone()
    }

    /// Run the identity handshake once.
    ///
    /// Concurrent callers share the pending handshake; later callers get the
    /// recorded outcome until [`reset`](Self::reset). A failed handshake is
    /// recorded as `false`.
    ///
    /// # Errors
    /// Returns [`ConfigurationError`] if any identity setting is missing
    pub async fn initialize(&self, options: InitOptions) -> Result<bool, ConfigurationError> {
        let client = self.get_instance()?;
        let service = Arc::downgrade(&self.inner);

        let authenticated = self
            .inner
            .init_flight
            .run(move || async move {
                let authenticated = match client.init(&options).await {
                    Ok(authenticated) => authenticated,
                    Err(e) => {
                        error!(error = %e, "Identity handshake failed");
                        false
                    }
                };

                if authenticated {
                    if let Some(inner) = service.upgrade() {
                        Self { inner }.arm_expiry_timer(&client);
                    }
                }
                authenticated
            })
            .await;

        Ok(authenticated)
    }

    #[must_use]
    pub fn initialization_state(&self) -> InitializationState {
        self.inner.init_flight.state()
    }

    /// Refresh the access token for a request the server rejected.
    ///
    /// Overlapping calls share one refresh. A token that is still valid
    /// counts as success. Returns `false` when there is no authenticated
    /// session or the refresh failed.
    pub async fn refresh_token(&self) -> bool {
        self.refresh_with(self.inner.refresh_min_validity).await
    }

    /// Access token valid for at least the configured minimum, refreshing
    /// first when needed. `None` when unauthenticated or the refresh failed.
    pub async fn valid_token(&self) -> Option<String> {
        let client = self.instance()?;
        if !client.is_authenticated() {
            return None;
        }

        let expiring = client
            .tokens()
            .is_some_and(|tokens| tokens.is_expired(self.inner.token_min_validity));
        if expiring && !self.refresh_with(self.inner.token_min_validity).await {
            return None;
        }
        client.token()
    }

    /// Token currently held, without any network activity.
    #[must_use]
    pub fn current_token(&self) -> Option<String> {
        match self.get_instance() {
            Ok(client) => client.token(),
            Err(e) => {
                warn!(error = %e, "Identity service unavailable, sending request without token");
                None
            }
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.instance().is_some_and(|client| client.is_authenticated())
    }

    /// Login entry point of the identity provider.
    ///
    /// # Errors
    /// Returns [`ConfigurationError`] if any identity setting is missing
    pub fn login_url(&self, redirect_uri: Option<&str>) -> Result<String, ConfigurationError> {
        Ok(self.get_instance()?.create_login_url(redirect_uri))
    }

    /// Clear the local session, then end it at the identity provider.
    ///
    /// Both flights are reset whatever the provider answers, so the next
    /// [`initialize`](Self::initialize) performs a fresh handshake.
    ///
    /// # Errors
    /// Returns error if the session store or the provider logout fails
    pub async fn logout(&self, options: &LogoutOptions) -> Result<(), IdentityError> {
        self.disarm_expiry_timer();
        let result = match self.get_instance() {
            Ok(client) => client.logout(options).await,
            Err(e) => Err(e.into()),
        };
        self.inner.init_flight.reset();
        self.inner.refresh_flight.reset();
        result
    }

    /// Install the cleanup the expiry timer runs when its refresh fails.
    ///
    /// Only a weak reference is kept; once the handler is dropped the
    /// service falls back to its own [`logout`](Self::logout).
    pub fn set_expiry_handler(&self, handler: Weak<dyn SessionExpiryHandler>) {
        *self.inner.expiry_handler.lock() = Some(handler);
    }

    /// Drop the client, both flights and the expiry timer.
    ///
    /// The next [`get_instance`](Self::get_instance) builds a fresh client.
    pub fn reset(&self) {
        self.disarm_expiry_timer();
        self.inner.instance.lock().take();
        self.inner.init_flight.reset();
        self.inner.refresh_flight.reset();
        debug!("Identity service reset");
    }

    /// `true` while the expiry timer task is alive.
    #[must_use]
    pub fn has_expiry_timer(&self) -> bool {
        self.inner.expiry_timer.lock().as_ref().is_some_and(|handle| !handle.is_finished())
    }

    async fn refresh_with(&self, min_validity_seconds: i64) -> bool {
        let Some(client) = self.instance() else {
            return false;
        };
        if !client.is_authenticated() {
            debug!("Refresh requested without an authenticated session");
            return false;
        }

        let service = Arc::downgrade(&self.inner);
        self.inner
            .refresh_flight
            .run(move || async move {
                match client.update_token(min_validity_seconds).await {
                    Ok(outcome) => {
                        if outcome.refreshed {
                            info!("Access token refreshed");
                            if let Some(inner) = service.upgrade() {
                                Self { inner }.arm_expiry_timer(&client);
                            }
                        } else {
                            debug!("Access token still valid, no refresh needed");
                        }
                        true
                    }
                    Err(e) => {
                        error!(error = %e, "Token refresh failed");
                        false
                    }
                }
            })
            .await
    }

    fn arm_expiry_timer(&self, client: &Arc<IdentityClient>) {
        let is_current = self.instance().is_some_and(|current| Arc::ptr_eq(&current, client));
        if !is_current || client.token_expiry().is_none() {
            return;
        }

        let mut timer = self.inner.expiry_timer.lock();
        if timer.as_ref().is_some_and(|handle| !handle.is_finished()) {
            self.inner.rearm.notify_one();
            return;
        }

        let service = Arc::downgrade(&self.inner);
        let rearm = self.inner.rearm.clone();
        *timer = Some(tokio::spawn(run_expiry_timer(service, rearm)));
        debug!("Token expiry timer armed");
    }

    fn disarm_expiry_timer(&self) {
        if let Some(handle) = self.inner.expiry_timer.lock().take() {
            handle.abort();
            debug!("Token expiry timer cancelled");
        }
    }

    /// Full cleanup after the timer lost the session: the installed handler
    /// if it is still alive, otherwise a plain logout.
    async fn expire_session(&self) {
        // Detach this task's own handle so the cleanup's disarm cannot abort it.
        self.inner.expiry_timer.lock().take();
        if let Some(client) = self.instance() {
            client.expire();
        }

        let handler = self.inner.expiry_handler.lock().as_ref().and_then(Weak::upgrade);
        match handler {
            Some(handler) => handler.session_expired().await,
            None => {
                if let Err(e) = self.logout(&LogoutOptions::default()).await {
                    warn!(error = %e, "Logout after session expiry failed");
                }
            }
        }
    }

    fn delay_until_refresh(&self) -> Option<Duration> {
        let expiry = self.instance()?.token_expiry()?;
        let lead = chrono::Duration::seconds(self.inner.refresh_min_validity);
        let delay = (expiry - lead - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        Some(delay.max(MIN_TIMER_DELAY))
    }
}

/// Sleep until shortly before the token expires, then refresh through the
/// shared refresh flight. Holds only a weak reference between wake-ups.
async fn run_expiry_timer(service: Weak<Inner>, rearm: Arc<Notify>) {
    loop {
        let Some(delay) = service.upgrade().and_then(|inner| IdentityService { inner }.delay_until_refresh())
        else {
            return;
        };

        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = rearm.notified() => continue,
        }

        let Some(inner) = service.upgrade() else {
            return;
        };
        let identity = IdentityService { inner };
        debug!("Access token about to expire, refreshing");

        if !identity.refresh_with(FORCE_REFRESH).await {
            warn!("Refresh on token expiry failed, session expired");
            identity.expire_session().await;
            return;
        }
    }
}

impl std::fmt::Debug for IdentityService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityService")
            .field("configured", &self.is_configured())
            .field("initialization", &self.initialization_state())
            .field("refresh", &self.inner.refresh_flight)
            .field("authenticated", &self.is_authenticated())
            .finish_non_exhaustive()
    }
}

/// Builder for [`IdentityService`]
pub struct IdentityServiceBuilder {
    settings: IdentitySettings,
    provider: Option<Arc<dyn IdentityProvider>>,
    store: Option<Arc<dyn SessionStore>>,
    refresh_min_validity: i64,
    token_min_validity: i64,
}

impl IdentityServiceBuilder {
    fn new(settings: IdentitySettings) -> Self {
        Self {
            settings,
            provider: None,
            store: None,
            refresh_min_validity: RETRY_REFRESH_MIN_VALIDITY_SECS,
            token_min_validity: VALID_TOKEN_MIN_VALIDITY_SECS,
        }
    }

    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    #[must_use]
    pub fn store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Threshold for [`IdentityService::refresh_token`] and the expiry timer.
    #[must_use]
    pub const fn refresh_min_validity(mut self, seconds: i64) -> Self {
        self.refresh_min_validity = seconds;
        self
    }

    /// Threshold for [`IdentityService::valid_token`].
    #[must_use]
    pub const fn token_min_validity(mut self, seconds: i64) -> Self {
        self.token_min_validity = seconds;
        self
    }

    #[must_use]
    pub fn build(self) -> IdentityService {
        let provider = self.provider.unwrap_or_else(|| Arc::new(KeycloakClient::new()));
        let store = self.store.unwrap_or_else(|| Arc::new(MemorySessionStore::new()));

        IdentityService {
            inner: Arc::new(Inner {
                settings: self.settings,
                provider,
                store,
                refresh_min_validity: self.refresh_min_validity,
                token_min_validity: self.token_min_validity,
                instance: Mutex::new(None),
                init_flight: SingleFlight::memoized(),
                refresh_flight: SingleFlight::coalescing(),
                expiry_timer: Mutex::new(None),
                rearm: Arc::new(Notify::new()),
                expiry_handler: Mutex::new(None),
            }),
        }
    }
}
