//! Authenticated API access
//!
//! This module provides the HTTP client factory for the backend API and a
//! direct caller for third-party endpoints.
//!
//! # Architecture
//!
//! - Uses the transport in [`crate::http`] (no direct reqwest client setup)
//! - Bearer token injection on every request
//! - One session refresh and one resubmission on 401
//! - Single-flight session cleanup when the refresh fails
//! - Korean user-facing messages on every [`ApiError`]

pub mod auth;
pub mod client;
pub mod errors;
pub mod external;
pub mod interceptors;
pub mod request;

pub use auth::{AuthErrorHandler, LoggingNavigator, Navigator, RedirectTarget};
pub use client::{ApiClient, ApiClientBuilder, ApiClientConfig};
pub use errors::{messages, status_message, ApiError, ApiErrorCategory};
pub use external::{ExternalApi, ExternalApiError, ExternalRequest};
pub use interceptors::{BearerTokenInterceptor, RequestInterceptor, ResponseInterceptor};
pub use request::{RequestBody, RequestContext, RequestOptions, UploadPart};

use sim_common::auth::IdentityService;
use sim_domain::SimError;

/// Build an [`ApiClient`] bound to `identity`.
///
/// # Errors
/// Returns error if the HTTP transport cannot be built
pub fn create_api_client(config: ApiClientConfig, identity: IdentityService) -> Result<ApiClient, SimError> {
    ApiClient::new(config, identity)
}
