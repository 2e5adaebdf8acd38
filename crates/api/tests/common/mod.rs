#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use boardwise_api::config::ServerConfig;
use boardwise_api::router::build_app_router;
use boardwise_api::state::AppState;
use boardwise_api::ws::WsManager;
use boardwise_engine::{Engine, EngineConfig};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

pub const TEST_SECRET: &str = "test-secret";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
    }
}

/// A router over an engine rooted in a temporary directory.
pub struct TestApp {
    pub router: Router,
    pub engine: Arc<Engine>,
    pub ws_manager: Arc<WsManager>,
    _dir: tempfile::TempDir,
}

/// Build the full application router, including the production middleware
/// stack, over a fresh engine.
pub fn build_test_app() -> TestApp {
    let dir = tempfile::tempdir().expect("create temp dir");
    let engine_config = EngineConfig {
        jwt_secret: TEST_SECRET.into(),
        rule_timeout: Duration::from_secs(5),
        ..EngineConfig::with_data_dir(dir.path())
    };
    let engine = Arc::new(Engine::new(engine_config));
    let ws_manager = Arc::new(WsManager::new());
    let config = test_config();

    let state = AppState {
        engine: Arc::clone(&engine),
        config: Arc::new(config.clone()),
        ws_manager: Arc::clone(&ws_manager),
    };

    TestApp {
        router: build_app_router(state, &config),
        engine,
        ws_manager,
        _dir: dir,
    }
}

pub async fn send(
    app: &TestApp,
    method: Method,
    uri: &str,
    body: Option<Value>,
    headers: &[(&str, &str)],
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    app.router
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap()
}

pub async fn get(app: &TestApp, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None, &[]).await
}

pub async fn post(app: &TestApp, uri: &str, body: Option<Value>) -> Response<Body> {
    send(app, Method::POST, uri, body, &[]).await
}

pub async fn put(app: &TestApp, uri: &str, body: Value) -> Response<Body> {
    send(app, Method::PUT, uri, Some(body), &[]).await
}

pub async fn delete(app: &TestApp, uri: &str) -> Response<Body> {
    send(app, Method::DELETE, uri, None, &[]).await
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}
