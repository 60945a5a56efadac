//! Session cleanup after an unrecoverable authentication failure
//!
//! When a refresh fails the session is torn down: local state is cleared,
//! the identity provider is asked to end the session, and control is handed
//! back to a login entry point. Concurrent failures share one cleanup, and
//! the identity service's expiry timer routes its failures through it too.

use std::sync::Arc;

use async_trait::async_trait;
use sim_common::auth::{IdentityService, LogoutOptions, SessionExpiryHandler};
use sim_common::sync::SingleFlight;
use tracing::{info, warn};

/// Where to send the user once the session is gone
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectTarget {
    /// Provider logout succeeded; continue at the application origin
    PostLogout(Option<String>),
    /// Provider logout failed; go straight to the login page
    Login(String),
}

/// Hands control back to the user after a session ends.
pub trait Navigator: Send + Sync {
    fn navigate(&self, target: &RedirectTarget);
}

/// Navigator that only records the redirect in the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNavigator;

impl Navigator for LoggingNavigator {
    fn navigate(&self, target: &RedirectTarget) {
        match target {
            RedirectTarget::PostLogout(Some(origin)) => {
                info!(redirect = %origin, "Session ended, continue at application origin");
            }
            RedirectTarget::PostLogout(None) => info!("Session ended"),
            RedirectTarget::Login(url) => info!(login_url = %url, "Session ended, login required"),
        }
    }
}

/// Single-flight session cleanup
pub struct AuthErrorHandler {
    identity: IdentityService,
    navigator: Arc<dyn Navigator>,
    app_origin: Option<String>,
    cleanup: SingleFlight<()>,
}

impl AuthErrorHandler {
    pub fn new(
        identity: IdentityService,
        navigator: Arc<dyn Navigator>,
        app_origin: Option<String>,
    ) -> Self {
        Self { identity, navigator, app_origin, cleanup: SingleFlight::coalescing() }
    }

    /// Clear the local session, log out at the provider and redirect.
    ///
    /// A failed provider logout falls back to the login URL; cleanup itself
    /// never fails.
    pub async fn handle(&self) {
        let identity = self.identity.clone();
        let navigator = self.navigator.clone();
        let app_origin = self.app_origin.clone();

        self.cleanup
            .run(move || async move {
                let options = LogoutOptions { redirect_uri: app_origin.clone() };
                match identity.logout(&options).await {
                    Ok(()) => navigator.navigate(&RedirectTarget::PostLogout(app_origin)),
                    Err(e) => {
                        warn!(error = %e, "Logout failed, falling back to login URL");
                        match identity.login_url(app_origin.as_deref()) {
                            Ok(url) => navigator.navigate(&RedirectTarget::Login(url)),
                            Err(e) => warn!(error = %e, "No login URL available"),
                        }
                    }
                }
            })
            .await;
    }
}

#[async_trait]
impl SessionExpiryHandler for AuthErrorHandler {
    async fn session_expired(&self) {
        self.handle().await;
    }
}

impl std::fmt::Debug for AuthErrorHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthErrorHandler")
            .field("app_origin", &self.app_origin)
            .field("cleanup", &self.cleanup)
            .finish_non_exhaustive()
    }
}
