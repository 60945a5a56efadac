//! Authenticated calls to third-party endpoints
//!
//! Bypasses the interceptor pipeline: the caller gets the raw failure
//! (status, status text, body) and nothing is retried.

use std::collections::HashMap;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sim_common::auth::{ConfigurationError, IdentityService};
use sim_domain::constants::DEFAULT_CONTENT_TYPE;
use sim_domain::SimError;
use thiserror::Error;
use tracing::{debug, error, instrument};

use crate::errors::InfraError;
use crate::http::HttpClient;

/// External call failure
#[derive(Debug, Error)]
pub enum ExternalApiError {
    #[error("User is not authenticated")]
    NotAuthenticated,

    #[error("Access token unavailable")]
    TokenUnavailable,

    #[error("API request failed: {status} {status_text}")]
    RequestFailed { status: u16, status_text: String, body: String },

    #[error("transport error: {0}")]
    Transport(#[from] SimError),
}

impl From<serde_json::Error> for ExternalApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Transport(InfraError::from(err).into())
    }
}

/// Per-call options
#[derive(Debug, Clone)]
pub struct ExternalRequest {
    pub method: Method,
    pub headers: HashMap<String, String>,
    pub body: Option<Value>,
}

impl Default for ExternalRequest {
    fn default() -> Self {
        Self { method: Method::GET, headers: HashMap::new(), body: None }
    }
}

impl ExternalRequest {
    #[must_use]
    pub fn new(method: Method) -> Self {
        Self { method, ..Self::default() }
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Bearer-authenticated caller for absolute URLs
#[derive(Debug, Clone)]
pub struct ExternalApi {
    http: HttpClient,
    identity: IdentityService,
}

impl ExternalApi {
    pub const fn new(http: HttpClient, identity: IdentityService) -> Self {
        Self { http, identity }
    }

    /// Call `url` with the current access token and decode the JSON answer.
    ///
    /// # Errors
    /// - [`ExternalApiError::NotAuthenticated`] without a session
    /// - [`ExternalApiError::TokenUnavailable`] when no token is held
    /// - [`ExternalApiError::RequestFailed`] for non-2xx answers
    #[instrument(skip(self, request), fields(method = %request.method, url = %url))]
    pub async fn call<T: DeserializeOwned>(
        &self,
        url: &str,
        request: ExternalRequest,
    ) -> Result<T, ExternalApiError> {
        if !self.identity.is_authenticated() {
            return Err(ExternalApiError::NotAuthenticated);
        }
        let token = self.identity.current_token().ok_or(ExternalApiError::TokenUnavailable)?;

        let mut builder = self
            .http
            .request(request.method, url)
            .header(CONTENT_TYPE, DEFAULT_CONTENT_TYPE)
            .header(AUTHORIZATION, format!("Bearer {token}"));
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = self.http.send(builder).await?;
        let status = response.status();
        let body = response.text().await.map_err(|e| SimError::from(InfraError::from(e)))?;

        if !status.is_success() {
            let status_text = status.canonical_reason().unwrap_or_default().to_string();
            error!(status = status.as_u16(), %status_text, "External API request failed");
            return Err(ExternalApiError::RequestFailed { status: status.as_u16(), status_text, body });
        }

        debug!(status = status.as_u16(), "External API request succeeded");
        Ok(serde_json::from_str(&body)?)
    }

    /// Identity provider login entry point.
    ///
    /// # Errors
    /// Returns [`ConfigurationError`] when identity settings are incomplete
    pub fn login_url(&self, redirect_uri: Option<&str>) -> Result<String, ConfigurationError> {
        self.identity.login_url(redirect_uri)
    }
}
