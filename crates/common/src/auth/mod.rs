//! Identity session lifecycle
//!
//! Token lifecycle against a Keycloak-compatible identity provider: a
//! lazily built session client, single-flight initialization and refresh,
//! and a cancellable timer that refreshes ahead of expiry.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ IdentityService │  Initialization, refresh coordination, expiry timer
//! └────────┬────────┘
//!          │
//!          └──► IdentityClient     (session state: token, authenticated flag)
//!                    │
//!                    ├──► IdentityProvider  (KeycloakClient over HTTP)
//!                    └──► SessionStore      (memory or JSON file)
//! ```
//!
//! # Usage Example
//!
//! ```no_run
//! use sim_common::auth::{IdentityService, InitOptions};
//! use sim_domain::IdentitySettings;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = IdentitySettings {
//!         issuer_url: Some("https://sso.example.com".to_string()),
//!         realm: Some("sim".to_string()),
//!         client_id: Some("sim-web".to_string()),
//!     };
//!
//!     let service = IdentityService::new(settings);
//!     if service.initialize(InitOptions::default()).await? {
//!         let token = service.valid_token().await;
//!         println!("Token available: {}", token.is_some());
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - **[`types`]**: Configuration, token sets, handshake options, errors
//! - **[`traits`]**: Provider and session-store seams
//! - **[`client`]**: Keycloak-compatible provider over `reqwest`
//! - **[`store`]**: Session persistence backends
//! - **[`identity`]**: Session state of one identity client
//! - **[`service`]**: Process-level orchestration

pub mod client;
pub mod identity;
pub mod service;
pub mod store;
pub mod traits;
pub mod types;

pub use client::KeycloakClient;
pub use identity::IdentityClient;
pub use service::{IdentityService, IdentityServiceBuilder, InitializationState};
pub use store::{FileSessionStore, MemorySessionStore};
pub use traits::{IdentityProvider, SessionExpiryHandler, SessionStore};
pub use types::{
    ConfigurationError, HandshakeOutcome, IdentityConfig, IdentityError, InitOptions,
    LogoutOptions, OnLoad, ProviderError, RefreshOutcome, TokenResponse, TokenSet,
};
