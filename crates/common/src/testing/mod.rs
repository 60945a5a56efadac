//! Testing utilities
//!
//! - **[`mocks`]**: scripted [`IdentityProvider`](crate::auth::IdentityProvider)
//!   with call counters
//! - [`configured_settings`]: complete identity settings for tests
//!
//! ## Usage
//!
//! ```rust
//! # #[cfg(feature = "test-utils")]
//! # {
//! use std::sync::Arc;
//!
//! use sim_common::auth::IdentityService;
//! use sim_common::testing::{configured_settings, MockIdentityProvider};
//!
//! let provider = Arc::new(MockIdentityProvider::authenticated("token", 600));
//! let service = IdentityService::builder(configured_settings()).provider(provider).build();
//! assert!(service.is_configured());
//! # }
//! ```

pub mod mocks;

use sim_domain::IdentitySettings;

pub use mocks::{HandshakeScript, MockIdentityProvider, RefreshScript};

/// Identity settings with every value present.
#[must_use]
pub fn configured_settings() -> IdentitySettings {
    IdentitySettings {
        issuer_url: Some("https://sso.example.com".to_string()),
        realm: Some("sim".to_string()),
        client_id: Some("sim-web".to_string()),
    }
}
