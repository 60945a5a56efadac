//! # Sim Infrastructure
//!
//! Impure side of the session core.
//!
//! This crate contains:
//! - HTTP transport wrapper
//! - API client with session interceptors and auth-error cleanup
//! - External API caller
//! - Configuration loader (file + environment)
//!
//! ## Architecture
//! - Builds on the identity service from `sim-common`
//! - Depends on `sim-domain` for configuration and errors
//! - Contains all network and filesystem I/O

pub mod api;
pub mod config;
pub mod errors;
pub mod http;

// Re-export commonly used items
pub use api::{
    create_api_client, ApiClient, ApiClientConfig, ApiError, ExternalApi, ExternalApiError,
    RequestOptions,
};
pub use errors::InfraError;
pub use http::{HttpClient, HttpClientBuilder};
