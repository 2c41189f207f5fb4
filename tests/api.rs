//! The HTTP surface the dashboard talks to, driven through the router.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use streamhub_oauth::transport::HttpTokenEndpoint;
use streamhub_oauth::types::PlatformOAuthConfig;
use streamhub_oauth::{app, AppState, Config, OAuthTokenManager, PlatformCatalog};

async fn test_app(server: &MockServer) -> (Router, AppState) {
    let mut catalog = PlatformCatalog::builtin();
    catalog.insert(
        "twitch",
        "Twitch",
        PlatformOAuthConfig {
            auth_url: "https://id.twitch.tv/oauth2/authorize".to_string(),
            token_url: format!("{}/oauth2/token", server.uri()),
            scopes: vec!["user:read:email".to_string(), "chat:read".to_string()],
            ..PlatformOAuthConfig::default()
        },
    );

    let endpoint = HttpTokenEndpoint::new(Duration::from_secs(5)).unwrap();
    let manager = OAuthTokenManager::new(Arc::new(endpoint));
    let state = AppState::new(Config::default(), catalog, manager);
    (app(state.clone()), state)
}

async fn mount_token_endpoint(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=xyz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "a",
            "refresh_token": "r",
            "expires_in": 7200,
            "token_type": "bearer",
            "scope": "user:read:email chat:read"
        })))
        .mount(server)
        .await;
}

async fn send(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, String) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

async fn send_json(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let (status, text) = send(router, method, uri, body).await;
    (status, serde_json::from_str(&text).unwrap())
}

async fn start_flow(router: &Router) -> String {
    let (status, body) = send_json(
        router,
        Method::PUT,
        "/platforms/twitch/credentials",
        Some(json!({"client_id": "abc"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["configured"], true);

    let (status, body) = send_json(router, Method::POST, "/platforms/twitch/authorize", None).await;
    assert_eq!(status, StatusCode::OK);
    let url = url::Url::parse(body["authorization_url"].as_str().unwrap()).unwrap();
    assert_eq!(
        url.query_pairs()
            .find(|(k, _)| k == "redirect_uri")
            .map(|(_, v)| v.into_owned())
            .as_deref(),
        Some("http://localhost:4000/oauth/callback/twitch")
    );
    let state = body["state"].as_str().unwrap().to_string();
    assert_eq!(
        url.query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned()),
        Some(state.clone())
    );
    state
}

#[tokio::test]
async fn test_callback_page_completes_flow() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "a",
            "refresh_token": "r",
            "expires_in": 7200,
            "token_type": "bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;
    let (router, state) = test_app(&server).await;

    let oauth_state = start_flow(&router).await;
    let (status, _) = send_json(&router, Method::GET, "/platforms/twitch", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, html) = send(
        &router,
        Method::GET,
        &format!("/oauth/callback/twitch?code=xyz&state={}", oauth_state),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(html.contains("streamhub:oauth-callback"));
    assert!(html.contains("Account connected"));

    assert!(state.manager.is_authenticated("twitch"));
    let (_, body) = send_json(&router, Method::GET, "/platforms/twitch", None).await;
    assert_eq!(body["name"], "Twitch");
    assert_eq!(body["authenticated"], true);
    assert_eq!(body["refresh_scheduled"], true);
    assert_eq!(body["pending"], false);
}

#[tokio::test]
async fn test_complete_endpoint_and_revoke() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("code=xyz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "a",
            "refresh_token": "r",
            "expires_in": 7200,
            "token_type": "bearer"
        })))
        .mount(&server)
        .await;
    let (router, state) = test_app(&server).await;

    let oauth_state = start_flow(&router).await;
    let (status, body) = send_json(
        &router,
        Method::POST,
        "/platforms/twitch/complete",
        Some(json!({"code": "xyz", "state": oauth_state})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["authenticated"], true);

    let (status, body) = send_json(&router, Method::POST, "/platforms/twitch/revoke", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["authenticated"], false);
    assert_eq!(body["refresh_scheduled"], false);
    assert!(!state.manager.is_authenticated("twitch"));

    // revoking twice is fine
    let (status, _) = send_json(&router, Method::POST, "/platforms/twitch/revoke", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_forged_state_is_rejected() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server).await;
    let (router, state) = test_app(&server).await;

    start_flow(&router).await;
    let (status, body) = send_json(
        &router,
        Method::POST,
        "/platforms/twitch/complete",
        Some(json!({"code": "xyz", "state": "forged"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "state_mismatch");
    assert!(!state.manager.is_authenticated("twitch"));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_replayed_callback_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "a",
            "expires_in": 7200
        })))
        .mount(&server)
        .await;
    let (router, _state) = test_app(&server).await;

    let oauth_state = start_flow(&router).await;
    let body = json!({"code": "xyz", "state": oauth_state});
    let (status, _) = send_json(&router, Method::POST, "/platforms/twitch/complete", Some(body.clone())).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send_json(&router, Method::POST, "/platforms/twitch/complete", Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "missing_verifier");
}

#[tokio::test]
async fn test_denied_consent_renders_reason() {
    let server = MockServer::start().await;
    let (router, _state) = test_app(&server).await;
    start_flow(&router).await;

    let (status, html) = send(
        &router,
        Method::GET,
        "/oauth/callback/twitch?error=access_denied&error_description=The+user+denied+you+access",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(html.contains("access_denied"));
    assert!(html.contains("The user denied you access"));
}

#[tokio::test]
async fn test_authorize_without_credentials() {
    let server = MockServer::start().await;
    let (router, _state) = test_app(&server).await;

    let (status, body) = send_json(&router, Method::POST, "/platforms/youtube/authorize", None).await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
    assert_eq!(body["error"], "configuration");
    assert!(body["message"].as_str().unwrap().contains("youtube"));
}

#[tokio::test]
async fn test_unknown_platform() {
    let server = MockServer::start().await;
    let (router, _state) = test_app(&server).await;

    let (status, body) = send_json(&router, Method::POST, "/platforms/myspace/authorize", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "unknown_platform");
}

#[tokio::test]
async fn test_refresh_without_token() {
    let server = MockServer::start().await;
    let (router, _state) = test_app(&server).await;
    start_flow(&router).await;

    let (status, body) = send_json(&router, Method::POST, "/platforms/twitch/refresh", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "no_refresh_token");
}

#[tokio::test]
async fn test_list_platforms() {
    let server = MockServer::start().await;
    let (router, _state) = test_app(&server).await;

    let (status, body) = send_json(&router, Method::GET, "/platforms", None).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["platform"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["discord", "facebook", "kick", "twitch", "youtube"]);
}

#[tokio::test]
async fn test_empty_client_id_is_rejected() {
    let server = MockServer::start().await;
    let (router, _state) = test_app(&server).await;

    let (status, body) = send_json(
        &router,
        Method::PUT,
        "/platforms/twitch/credentials",
        Some(json!({"client_id": "  "})),
    )
    .await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
    assert_eq!(body["error"], "configuration");
}

#[tokio::test]
async fn test_health() {
    let server = MockServer::start().await;
    let (router, _state) = test_app(&server).await;

    let (status, body) = send(&router, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");
}
