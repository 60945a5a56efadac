//! Request and response interceptors
//!
//! - Request side: attach the current bearer token, never blocking.
//! - Response side: unwrap payloads, turn failures into [`ApiError`], and on
//!   a first 401 refresh the session once and resubmit the call.

use std::sync::Arc;

use serde_json::Value;
use sim_common::auth::IdentityService;
use tracing::{error, info, warn};

use super::auth::AuthErrorHandler;
use super::client::ApiClient;
use super::errors::ApiError;
use super::request::RequestContext;

/// Mutates an outgoing request before transmission.
///
/// Implementations must not perform I/O.
pub trait RequestInterceptor: Send + Sync {
    fn intercept(&self, request: &mut RequestContext);
}

/// Attaches `Authorization: Bearer <token>` when a token is held
pub struct BearerTokenInterceptor {
    identity: IdentityService,
}

impl BearerTokenInterceptor {
    pub const fn new(identity: IdentityService) -> Self {
        Self { identity }
    }
}

impl RequestInterceptor for BearerTokenInterceptor {
    fn intercept(&self, request: &mut RequestContext) {
        if !self.identity.is_configured() {
            warn!(path = %request.path, "Identity configuration missing, sending request without token");
            return;
        }

        match self.identity.current_token() {
            Some(token) => {
                request.set_bearer(&token);
            }
            None => warn!(path = %request.path, "No access token available"),
        }
    }
}

/// Status and body of a received response
#[derive(Debug, Clone)]
pub(crate) struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    /// Body as JSON: empty becomes `null`, non-JSON text a JSON string.
    fn payload(&self) -> Value {
        if self.body.trim().is_empty() {
            return Value::Null;
        }
        serde_json::from_str(&self.body).unwrap_or_else(|_| Value::String(self.body.clone()))
    }

    fn error_payload(&self) -> Option<Value> {
        Some(self.payload()).filter(|payload| !payload.is_null())
    }

    const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Unwrapped success payload
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Payload {
    pub status: u16,
    pub data: Value,
}

/// Response-side session handling
pub struct ResponseInterceptor {
    identity: IdentityService,
    auth_errors: Arc<AuthErrorHandler>,
}

impl ResponseInterceptor {
    pub const fn new(identity: IdentityService, auth_errors: Arc<AuthErrorHandler>) -> Self {
        Self { identity, auth_errors }
    }

    pub(crate) async fn intercept(
        &self,
        client: &ApiClient,
        mut request: RequestContext,
        outcome: Result<RawResponse, ApiError>,
    ) -> Result<Payload, ApiError> {
        let response = match outcome {
            Ok(response) => response,
            Err(err) => {
                error!(path = %request.path, status = err.status, message = %err.message, "API request failed");
                return Err(err);
            }
        };

        if response.is_success() {
            return Ok(Payload { status: response.status, data: response.payload() });
        }

        if response.status == 401 && request.mark_retried() {
            return self.refresh_and_retry(client, request, response.error_payload()).await;
        }

        let err = ApiError::from_response(response.status, response.error_payload());
        error!(path = %request.path, status = err.status, message = %err.message, "API request failed");
        Err(err)
    }

    async fn refresh_and_retry(
        &self,
        client: &ApiClient,
        mut request: RequestContext,
        rejection: Option<Value>,
    ) -> Result<Payload, ApiError> {
        info!(path = %request.path, "Received 401, refreshing session");

        if !self.identity.refresh_token().await {
            error!(path = %request.path, "Session refresh failed, ending session");
            self.auth_errors.handle().await;
            let err = ApiError::session_expired();
            return Err(match rejection {
                Some(data) => err.with_data(data),
                None => err,
            });
        }

        if let Some(token) = self.identity.current_token() {
            request.set_bearer(&token);
        }
        info!(path = %request.path, "Retrying request with refreshed session");
        client.dispatch(request).await
    }
}

impl std::fmt::Debug for ResponseInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseInterceptor").field("auth_errors", &self.auth_errors).finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use sim_common::testing::{configured_settings, MockIdentityProvider};
    use sim_domain::IdentitySettings;

    use super::*;
    use crate::api::request::{RequestBody, RequestOptions};
    use reqwest::header::AUTHORIZATION;
    use reqwest::Method;

    fn request() -> RequestContext {
        RequestContext::new(Method::GET, "/items", RequestBody::Empty, RequestOptions::new())
            .unwrap()
    }

    #[test]
    fn raw_response_payload_forms() {
        let empty = RawResponse { status: 204, body: String::new() };
        assert_eq!(empty.payload(), Value::Null);
        assert_eq!(empty.error_payload(), None);

        let json = RawResponse { status: 200, body: r#"[1,2]"#.into() };
        assert_eq!(json.payload(), json!([1, 2]));

        let text = RawResponse { status: 502, body: "Bad Gateway".into() };
        assert_eq!(text.payload(), json!("Bad Gateway"));
    }

    #[test]
    fn bearer_interceptor_skips_unconfigured_identity() {
        let interceptor =
            BearerTokenInterceptor::new(IdentityService::new(IdentitySettings::default()));
        let mut request = request();

        interceptor.intercept(&mut request);
        assert!(!request.has_authorization());
    }

    #[tokio::test]
    async fn bearer_interceptor_uses_current_token() {
        let provider = Arc::new(MockIdentityProvider::authenticated("access-1", 600));
        let identity = IdentityService::builder(configured_settings()).provider(provider).build();
        let interceptor = BearerTokenInterceptor::new(identity.clone());

        let mut before = request();
        interceptor.intercept(&mut before);
        assert!(!before.has_authorization());

        identity.initialize(Default::default()).await.unwrap();
        let mut after = request();
        interceptor.intercept(&mut after);
        assert_eq!(after.headers[AUTHORIZATION], "Bearer access-1");
    }
}
