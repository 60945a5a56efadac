//! Integration tests for the API client session pipeline
//!
//! Runs the full interceptor chain against a wiremock server with a scripted
//! identity provider: bearer injection, refresh-once-on-401, single-flight
//! cleanup and error normalization.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use serde_json::{json, Value};
use sim_common::auth::{IdentityService, InitOptions};
use sim_common::testing::{configured_settings, MockIdentityProvider, RefreshScript};
use sim_infra::api::{
    messages, ApiClient, ApiErrorCategory, Navigator, RedirectTarget, RequestOptions,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct RecordingNavigator {
    targets: Mutex<Vec<RedirectTarget>>,
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, target: &RedirectTarget) {
        self.targets.lock().push(target.clone());
    }
}

struct Harness {
    server: MockServer,
    provider: Arc<MockIdentityProvider>,
    identity: IdentityService,
    navigator: Arc<RecordingNavigator>,
    client: Arc<ApiClient>,
}

/// Authenticated session holding `token`, valid for `expires_in` seconds.
async fn harness(token: &str, expires_in: i64) -> Harness {
    let server = MockServer::start().await;
    let provider = Arc::new(MockIdentityProvider::authenticated(token, expires_in));
    let identity = IdentityService::builder(configured_settings()).provider(provider.clone()).build();
    assert!(identity.initialize(InitOptions::default()).await.unwrap());

    let navigator = Arc::new(RecordingNavigator::default());
    let client = ApiClient::builder(identity.clone())
        .base_url(server.uri())
        .app_origin("https://app.example.com")
        .navigator(navigator.clone())
        .build()
        .unwrap();

    Harness { server, provider, identity, navigator, client: Arc::new(client) }
}

#[tokio::test]
async fn test_get_sends_bearer_and_unwraps_payload() {
    let h = harness("access-1", 3600).await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}, {"id": 2}])))
        .expect(1)
        .mount(&h.server)
        .await;

    let items: Vec<Value> = h.client.get("/items", RequestOptions::new()).await.unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(h.provider.refresh_calls(), 0);
}

#[tokio::test]
async fn test_concurrent_401s_share_one_refresh() {
    let h = harness("stale", 10).await;
    Mock::given(method("GET"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(header("authorization", "Bearer refreshed-access"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(5)
        .mount(&h.server)
        .await;

    let calls = (0..5).map(|i| {
        let client = h.client.clone();
        async move { client.get::<Value>(&format!("/items/{i}"), RequestOptions::new()).await }
    });
    let results = join_all(calls).await;

    assert!(results.iter().all(|r| matches!(r, Ok(v) if v["ok"] == true)));
    assert_eq!(h.provider.refresh_calls(), 1);
    assert_eq!(h.identity.current_token().as_deref(), Some("refreshed-access"));
}

#[tokio::test]
async fn test_second_401_is_not_retried_again() {
    let h = harness("stale", 10).await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&h.server)
        .await;

    let err = h.client.get::<Value>("/items", RequestOptions::new()).await.unwrap_err();

    assert_eq!(err.status, 401);
    assert_eq!(err.message, messages::UNAUTHORIZED);
    assert!(!err.is_session_expired());
    assert_eq!(h.provider.refresh_calls(), 1);
    assert!(h.navigator.targets.lock().is_empty());
}

#[tokio::test]
async fn test_failed_refresh_expires_session_with_single_cleanup() {
    let h = harness("stale", 10).await;
    h.provider.script_refresh(RefreshScript::Fail);
    // Hold the refresh and logout open so every caller joins them
    h.provider.set_latency(Duration::from_millis(50));
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .expect(3)
        .mount(&h.server)
        .await;

    let calls = (0..3).map(|_| {
        let client = h.client.clone();
        async move { client.get::<Value>("/items", RequestOptions::new()).await }
    });
    let results = join_all(calls).await;

    for result in results {
        let err = result.unwrap_err();
        assert_eq!(err.status, 401);
        assert_eq!(err.message, messages::SESSION_EXPIRED);
    }
    assert!(!h.identity.is_authenticated());
    assert_eq!(h.provider.logout_calls(), 1);
    assert_eq!(
        *h.navigator.targets.lock(),
        vec![RedirectTarget::PostLogout(Some("https://app.example.com".into()))]
    );
}

#[tokio::test]
async fn test_failed_refresh_keeps_rejection_body() {
    let h = harness("stale", 10).await;
    h.provider.script_refresh(RefreshScript::Fail);
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"code": "TOKEN_REVOKED", "message": "revoked"})),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    let err = h.client.get::<Value>("/items", RequestOptions::new()).await.unwrap_err();

    assert!(err.is_session_expired());
    assert_eq!(err.message, messages::SESSION_EXPIRED);
    assert_eq!(err.data, Some(json!({"code": "TOKEN_REVOKED", "message": "revoked"})));
}

#[tokio::test]
async fn test_status_messages_and_payload_precedence() {
    let h = harness("access-1", 3600).await;
    for (status, route) in [(403, "/forbidden"), (404, "/missing"), (500, "/boom"), (502, "/gateway"), (503, "/down"), (418, "/teapot")] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status))
            .mount(&h.server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/custom"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"message": "이름이 필요합니다."})))
        .mount(&h.server)
        .await;

    let expectations = [
        ("/forbidden", messages::FORBIDDEN.to_string(), ApiErrorCategory::Forbidden),
        ("/missing", messages::NOT_FOUND.to_string(), ApiErrorCategory::NotFound),
        ("/boom", messages::SERVER_ERROR.to_string(), ApiErrorCategory::Server),
        ("/gateway", messages::BAD_GATEWAY.to_string(), ApiErrorCategory::Server),
        ("/down", messages::SERVICE_UNAVAILABLE.to_string(), ApiErrorCategory::Server),
        ("/teapot", "서버 오류가 발생했습니다. (418)".to_string(), ApiErrorCategory::Client),
        ("/custom", "이름이 필요합니다.".to_string(), ApiErrorCategory::Client),
    ];

    for (route, message, category) in expectations {
        let err = h.client.get::<Value>(route, RequestOptions::new()).await.unwrap_err();
        assert_eq!(err.message, message, "route {route}");
        assert_eq!(err.category(), category, "route {route}");
    }
    assert_eq!(h.provider.refresh_calls(), 0);
}

#[tokio::test]
async fn test_unreachable_server_is_no_response() {
    let identity = IdentityService::builder(configured_settings())
        .provider(Arc::new(MockIdentityProvider::new()))
        .build();
    let client = ApiClient::builder(identity)
        .base_url("http://127.0.0.1:1")
        .timeout(Duration::from_secs(2))
        .build()
        .unwrap();

    let err = client.get::<Value>("/items", RequestOptions::new()).await.unwrap_err();

    assert_eq!(err.status, 0);
    assert_eq!(err.message, messages::NO_RESPONSE);
    assert_eq!(err.category(), ApiErrorCategory::Network);
}
