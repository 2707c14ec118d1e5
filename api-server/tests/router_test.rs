//! Router integration tests
//!
//! Requests are driven through `tower::ServiceExt::oneshot`; remote code
//! hosting is a wiremock server and the store is a temporary directory.

use api_server::{router, AppState, ApiServer, BUNDLE_CONTENT_TYPE};
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use reportmate_modules::{
    Installer, ManifestResolver, ModuleStore, Screener, SecurityPolicy, SourceClient,
    SourceSettings,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DEMO_CODE: &str = r#"#{ title: "Demo" }"#;

fn installer(dir: &TempDir, server: &MockServer) -> Installer {
    let settings = SourceSettings {
        raw_base_url: server.uri(),
        api_base_url: server.uri(),
        ..SourceSettings::default()
    };
    Installer::new(
        Arc::new(ModuleStore::new(dir.path())),
        ManifestResolver::new(SourceClient::new(settings).unwrap()),
        Screener::new(SecurityPolicy::default()).unwrap(),
    )
}

async fn app() -> (TempDir, MockServer, Router) {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    let app = router(AppState::new(installer(&dir, &server)));
    (dir, server, app)
}

async fn mount_demo(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/acme/reportmate-module-demo/main/manifest.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "demo", "name": "Demo", "version": "1.0.0", "category": "hardware"
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/acme/reportmate-module-demo/main/index.rhai"))
        .respond_with(ResponseTemplate::new(200).set_body_string(DEMO_CODE))
        .mount(server)
        .await;
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

fn json_of(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap()
}

async fn register_demo_repo(app: &Router) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/modules/repositories",
        Some(json!({
            "name": "Demo",
            "url": "https://github.com/acme/reportmate-module-demo",
            "branch": "main"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let body = json_of(&body);
    assert_eq!(body["success"], true);
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_repositories_round_trip() {
    let (_dir, _server, app) = app().await;

    let id = register_demo_repo(&app).await;

    let (status, body) = send(&app, Method::GET, "/api/modules/repositories", None).await;
    assert_eq!(status, StatusCode::OK);
    let list = json_of(&body);
    let entry = list
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["id"] == id.as_str())
        .unwrap();
    assert_eq!(entry["url"], "https://github.com/acme/reportmate-module-demo");
    assert_eq!(entry["branch"], "main");

    let uri = format!("/api/modules/repositories/{}", id);
    let (status, _) = send(&app, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app, Method::GET, "/api/modules/repositories", None).await;
    assert!(json_of(&body)
        .as_array()
        .unwrap()
        .iter()
        .all(|r| r["id"] != id.as_str()));
}

#[tokio::test]
async fn test_add_repository_rejects_malformed_url() {
    let (_dir, _server, app) = app().await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/modules/repositories",
        Some(json!({ "name": "Bad", "url": "ftp://example.com/x" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json_of(&body)["error"].is_string());
}

#[tokio::test]
async fn test_install_serve_and_uninstall() {
    let (_dir, server, app) = app().await;
    mount_demo(&server).await;
    let repo_id = register_demo_repo(&app).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/modules/install",
        Some(json!({ "moduleId": "demo", "repositoryId": repo_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", String::from_utf8_lossy(&body));

    let (_, body) = send(&app, Method::GET, "/api/modules/enabled", None).await;
    assert_eq!(json_of(&body), json!(["demo"]));

    let (status, body) = send(&app, Method::GET, "/api/modules/demo/manifest", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_of(&body)["version"], "1.0.0");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/modules/demo/bundle")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        BUNDLE_CONTENT_TYPE
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], DEMO_CODE.as_bytes());

    let (status, _) = send(&app, Method::DELETE, "/api/modules/demo", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::GET, "/api/modules/demo/manifest", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, body) = send(&app, Method::GET, "/api/modules/enabled", None).await;
    assert_eq!(json_of(&body), json!([]));
}

#[tokio::test]
async fn test_install_failure_is_server_error() {
    let (_dir, _server, app) = app().await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/modules/install",
        Some(json!({ "moduleId": "demo", "repositoryId": "missing" })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json_of(&body)["error"]
        .as_str()
        .unwrap()
        .contains("missing"));
}

#[tokio::test]
async fn test_install_malformed_body_is_bad_request() {
    let (_dir, _server, app) = app().await;
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/modules/install",
        Some(json!({ "module": "demo" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_toggle_unknown_module_is_not_found() {
    let (_dir, _server, app) = app().await;
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/modules/ghost/toggle",
        Some(json!({ "enabled": true })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/modules/ghost/toggle",
        Some(json!({ "enabled": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_missing_bundle_is_not_found() {
    let (_dir, _server, app) = app().await;
    let (status, _) = send(&app, Method::GET, "/api/modules/nothing/bundle", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_server_start_and_graceful_stop() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockServer::start().await;
    let server = ApiServer::start(installer(&dir, &mock), "127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();

    assert_ne!(server.local_addr().port(), 0);
    server.stop().await;
}
