//! Authenticated API client
//!
//! Every call flows through the same pipeline:
//!
//! ```text
//! RequestContext ──► request interceptors ──► HttpClient ──► ResponseInterceptor ──► payload
//!                                                                   │
//!                                                   first 401 ──► refresh ──► resubmit once
//! ```
//!
//! Callers receive the decoded payload or an [`ApiError`]; transport details
//! never leak.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sim_common::auth::{IdentityService, SessionExpiryHandler};
use sim_domain::constants::DEFAULT_API_TIMEOUT_SECS;
use sim_domain::{ApiSettings, SessionSettings, SimError};
use tracing::{debug, instrument};
use url::Url;

use super::auth::{AuthErrorHandler, LoggingNavigator, Navigator};
use super::errors::ApiError;
use super::interceptors::{
    BearerTokenInterceptor, Payload, RawResponse, RequestInterceptor, ResponseInterceptor,
};
use super::request::{build_form, RequestBody, RequestContext, RequestOptions, UploadPart};
use crate::http::HttpClient;

/// Configuration for API client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiClientConfig {
    /// Base URL prepended to relative paths (e.g. `https://api.example.com/v1`)
    pub base_url: String,
    /// Timeout for API requests
    pub timeout: Duration,
    /// Post-logout redirect target
    pub app_origin: Option<String>,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout: Duration::from_secs(DEFAULT_API_TIMEOUT_SECS),
            app_origin: None,
        }
    }
}

impl ApiClientConfig {
    #[must_use]
    pub fn from_settings(api: &ApiSettings, session: &SessionSettings) -> Self {
        Self {
            base_url: api.base_url.clone(),
            timeout: Duration::from_secs(api.timeout_seconds),
            app_origin: session.app_origin.clone(),
        }
    }
}

/// API client with session-aware interceptors
pub struct ApiClient {
    http: HttpClient,
    base_url: String,
    request_interceptors: Vec<Arc<dyn RequestInterceptor>>,
    response_interceptor: ResponseInterceptor,
}

impl ApiClient {
    /// Create a client with the default navigator.
    ///
    /// # Errors
    /// Returns error if the HTTP transport cannot be built
    pub fn new(config: ApiClientConfig, identity: IdentityService) -> Result<Self, SimError> {
        Self::builder(identity).config(config).build()
    }

    pub fn builder(identity: IdentityService) -> ApiClientBuilder {
        ApiClientBuilder::new(identity)
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET `path`, decoding the payload.
    ///
    /// # Errors
    /// Returns [`ApiError`] for any failure
    #[instrument(skip(self, options), fields(method = "GET", path = %path))]
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        self.call(Method::GET, path, RequestBody::Empty, options).await
    }

    /// DELETE `path`, decoding the payload.
    ///
    /// # Errors
    /// Returns [`ApiError`] for any failure
    #[instrument(skip(self, options), fields(method = "DELETE", path = %path))]
    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        self.call(Method::DELETE, path, RequestBody::Empty, options).await
    }

    /// POST a JSON body.
    ///
    /// # Errors
    /// Returns [`ApiError`] for any failure
    #[instrument(skip(self, body, options), fields(method = "POST", path = %path))]
    pub async fn post<T, B>(&self, path: &str, body: &B, options: RequestOptions) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.call(Method::POST, path, json_body(body)?, options).await
    }

    /// PUT a JSON body.
    ///
    /// # Errors
    /// Returns [`ApiError`] for any failure
    #[instrument(skip(self, body, options), fields(method = "PUT", path = %path))]
    pub async fn put<T, B>(&self, path: &str, body: &B, options: RequestOptions) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.call(Method::PUT, path, json_body(body)?, options).await
    }

    /// PATCH a JSON body.
    ///
    /// # Errors
    /// Returns [`ApiError`] for any failure
    #[instrument(skip(self, body, options), fields(method = "PATCH", path = %path))]
    pub async fn patch<T, B>(&self, path: &str, body: &B, options: RequestOptions) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.call(Method::PATCH, path, json_body(body)?, options).await
    }

    /// POST a multipart form (file upload).
    ///
    /// # Errors
    /// Returns [`ApiError`] for any failure
    #[instrument(skip(self, parts, options), fields(method = "POST", path = %path, parts = parts.len()))]
    pub async fn upload<T: DeserializeOwned>(
        &self,
        path: &str,
        parts: Vec<UploadPart>,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        self.call(Method::POST, path, RequestBody::Multipart(parts), options).await
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        let request = RequestContext::new(method, path, body, options)?;
        let payload = self.dispatch(request).await?;

        serde_json::from_value(payload.data.clone())
            .map_err(|e| {
                debug!(error = %e, "Payload does not match the expected type");
                ApiError::invalid_payload(payload.status, payload.data)
            })
    }

    /// Run one request through the interceptor pipeline.
    ///
    /// Boxed because the response interceptor may resubmit through here.
    pub(crate) fn dispatch(&self, mut request: RequestContext) -> BoxFuture<'_, Result<Payload, ApiError>> {
        Box::pin(async move {
            for interceptor in &self.request_interceptors {
                interceptor.intercept(&mut request);
            }

            let outcome = self.transmit(&request).await;
            self.response_interceptor.intercept(self, request, outcome).await
        })
    }

    async fn transmit(&self, request: &RequestContext) -> Result<RawResponse, ApiError> {
        let builder = self.build_request(request)?;
        let response = self.http.send(builder).await?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::from(SimError::from(crate::errors::InfraError::from(e))))?;

        Ok(RawResponse { status, body })
    }

    fn build_request(&self, request: &RequestContext) -> Result<RequestBuilder, ApiError> {
        let url = self.resolve(&request.path)?;
        let mut builder = self.http.request(request.method.clone(), url).headers(request.headers.clone());

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Multipart(parts) => builder.multipart(build_form(parts)?),
        })
    }

    /// Absolute URLs pass through; relative paths are appended to the base.
    fn resolve(&self, path: &str) -> Result<Url, ApiError> {
        let absolute = path.starts_with("http://") || path.starts_with("https://");
        let raw = if absolute || self.base_url.is_empty() {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
        };

        Url::parse(&raw)
            .map_err(|e| ApiError::request_setup(Some(&format!("invalid request URL '{raw}': {e}"))))
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("request_interceptors", &self.request_interceptors.len())
            .field("response_interceptor", &self.response_interceptor)
            .finish_non_exhaustive()
    }
}

fn json_body<B: Serialize + ?Sized>(body: &B) -> Result<RequestBody, ApiError> {
    serde_json::to_value(body)
        .map(RequestBody::Json)
        .map_err(|e| ApiError::request_setup(Some(&e.to_string())))
}

/// Builder for [`ApiClient`].
pub struct ApiClientBuilder {
    identity: IdentityService,
    config: ApiClientConfig,
    navigator: Arc<dyn Navigator>,
    extra_interceptors: Vec<Arc<dyn RequestInterceptor>>,
    user_agent: Option<String>,
}

impl ApiClientBuilder {
    fn new(identity: IdentityService) -> Self {
        Self {
            identity,
            config: ApiClientConfig::default(),
            navigator: Arc::new(LoggingNavigator),
            extra_interceptors: Vec::new(),
            user_agent: None,
        }
    }

    #[must_use]
    pub fn config(mut self, config: ApiClientConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    #[must_use]
    pub fn app_origin(mut self, origin: impl Into<String>) -> Self {
        self.config.app_origin = Some(origin.into());
        self
    }

    /// Redirect handling after the session is torn down.
    #[must_use]
    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = navigator;
        self
    }

    /// Additional request interceptor, run after bearer token injection.
    #[must_use]
    pub fn request_interceptor(mut self, interceptor: Arc<dyn RequestInterceptor>) -> Self {
        self.extra_interceptors.push(interceptor);
        self
    }

    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Build the client. Missing identity configuration does not fail
    /// construction; requests are then sent without a token.
    ///
    /// # Errors
    /// Returns error if the HTTP transport cannot be built
    pub fn build(self) -> Result<ApiClient, SimError> {
        let mut http = HttpClient::builder().timeout(self.config.timeout);
        if let Some(agent) = self.user_agent {
            http = http.user_agent(agent);
        }
        let http = http.build()?;

        let auth_errors = Arc::new(AuthErrorHandler::new(
            self.identity.clone(),
            self.navigator,
            self.config.app_origin.clone(),
        ));
        let expiry_handler: Arc<dyn SessionExpiryHandler> = auth_errors.clone();
        self.identity.set_expiry_handler(Arc::downgrade(&expiry_handler));

        let mut request_interceptors: Vec<Arc<dyn RequestInterceptor>> =
            vec![Arc::new(BearerTokenInterceptor::new(self.identity.clone()))];
        request_interceptors.extend(self.extra_interceptors);

        Ok(ApiClient {
            http,
            base_url: self.config.base_url,
            request_interceptors,
            response_interceptor: ResponseInterceptor::new(self.identity, auth_errors),
        })
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use sim_common::auth::InitOptions;
    use sim_common::testing::{configured_settings, MockIdentityProvider, RefreshScript};
    use sim_domain::IdentitySettings;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::api::auth::RedirectTarget;
    use crate::api::errors::messages;

    #[derive(Default)]
    struct RecordingNavigator {
        targets: Mutex<Vec<RedirectTarget>>,
    }

    impl Navigator for RecordingNavigator {
        fn navigate(&self, target: &RedirectTarget) {
            self.targets.lock().push(target.clone());
        }
    }

    fn anonymous_client(base_url: &str) -> ApiClient {
        ApiClient::builder(IdentityService::new(IdentitySettings::default()))
            .base_url(base_url)
            .build()
            .unwrap()
    }

    #[test]
    fn resolve_joins_base_and_path() {
        let client = anonymous_client("https://api.example.com/v1/");

        assert_eq!(client.resolve("/items").unwrap().as_str(), "https://api.example.com/v1/items");
        assert_eq!(client.resolve("items").unwrap().as_str(), "https://api.example.com/v1/items");
        assert_eq!(
            client.resolve("https://other.example.com/x").unwrap().as_str(),
            "https://other.example.com/x"
        );
    }

    #[test]
    fn resolve_without_base_requires_absolute_url() {
        let client = anonymous_client("");
        let err = client.resolve("/items").unwrap_err();
        assert_eq!(err.status, 0);
        assert!(err.message.contains("invalid request URL"));
    }

    #[test]
    fn config_from_settings() {
        let api = ApiSettings { base_url: "https://api.example.com".into(), timeout_seconds: 5 };
        let session = SessionSettings {
            app_origin: Some("https://app.example.com".into()),
            ..SessionSettings::default()
        };

        let config = ApiClientConfig::from_settings(&api, &session);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.app_origin.as_deref(), Some("https://app.example.com"));
    }

    #[tokio::test]
    async fn get_without_identity_sends_no_authorization() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/public"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let client = anonymous_client(&server.uri());
        let value: Value =
            client.get("/public", RequestOptions::new().query("page", "2")).await.unwrap();

        assert_eq!(value, json!({"ok": true}));
        let requests = server.received_requests().await.unwrap();
        assert!(!requests[0].headers.contains_key("authorization"));
    }

    #[tokio::test]
    async fn post_sends_json_and_custom_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/items"))
            .and(header("x-request-id", "abc"))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({"name": "widget"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 7})))
            .expect(1)
            .mount(&server)
            .await;

        let client = anonymous_client(&server.uri());
        let created: Value = client
            .post("/items", &json!({"name": "widget"}), RequestOptions::new().header("X-Request-Id", "abc"))
            .await
            .unwrap();

        assert_eq!(created["id"], 7);
    }

    #[tokio::test]
    async fn upload_sends_multipart_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"stored": true})))
            .expect(1)
            .mount(&server)
            .await;

        let client = anonymous_client(&server.uri());
        let parts = vec![
            UploadPart::text("description", "report"),
            UploadPart::file("file", "report.csv", b"a,b\n1,2\n".to_vec()).with_content_type("text/csv"),
        ];
        let _: Value = client.upload("/files", parts, RequestOptions::new()).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let content_type = requests[0].headers.get("content-type").unwrap().to_str().unwrap();
        assert!(content_type.starts_with("multipart/form-data; boundary="));
        let body = String::from_utf8_lossy(&requests[0].body);
        assert!(body.contains("filename=\"report.csv\""));
        assert!(body.contains("a,b"));
    }

    #[tokio::test]
    async fn empty_success_body_decodes_as_unit() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let client = anonymous_client(&server.uri());
        let result: Option<Value> = client.delete("/items/1", RequestOptions::new()).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn mismatched_payload_is_invalid_payload_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"not": "a list"})))
            .mount(&server)
            .await;

        let client = anonymous_client(&server.uri());
        let err = client.get::<Vec<u32>>("/items", RequestOptions::new()).await.unwrap_err();

        assert_eq!(err.status, 200);
        assert_eq!(err.message, messages::INVALID_PAYLOAD);
        assert_eq!(err.data, Some(json!({"not": "a list"})));
    }

    #[tokio::test]
    async fn unauthenticated_401_without_session_expires() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let client = anonymous_client(&server.uri());
        let err = client.get::<Value>("/secret", RequestOptions::new()).await.unwrap_err();

        assert!(err.is_session_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn built_client_cleans_up_when_expiry_refresh_fails() {
        let provider = Arc::new(MockIdentityProvider::authenticated("access-1", 60));
        provider.script_refresh(RefreshScript::Fail);
        let identity = IdentityService::builder(configured_settings()).provider(provider.clone()).build();
        identity.initialize(InitOptions::default()).await.unwrap();
        let navigator = Arc::new(RecordingNavigator::default());
        let _client = ApiClient::builder(identity.clone())
            .base_url("https://api.example.com")
            .app_origin("https://app.example.com")
            .navigator(navigator.clone())
            .build()
            .unwrap();

        tokio::time::sleep(Duration::from_secs(45)).await;

        assert!(!identity.is_authenticated());
        assert_eq!(provider.logout_calls(), 1);
        assert_eq!(
            *navigator.targets.lock(),
            vec![RedirectTarget::PostLogout(Some("https://app.example.com".into()))]
        );
    }
}
