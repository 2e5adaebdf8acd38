//! Integration tests for running actions over HTTP.

mod common;

use axum::http::{Method, StatusCode};
use boardwise_engine::token::{ADMIN_ROLE, SERVICE_ROLE};
use common::{body_json, body_text, build_test_app, get, post, put, send, TestApp};
use serde_json::json;

async fn seed(app: &TestApp) {
    let board = json!({
        "cards": [
            {"key": "k1", "name": "greet", "type": "action", "rulesCode": "'hello ' .. (params.who or 'nobody')"},
            {"key": "k2", "name": "secret", "type": "action", "rulesCode": "'opened'", "tokens": {"run": "s3"}},
            {"key": "k3", "name": "broken", "type": "action", "rulesCode": "error('boom')"},
            {"key": "k5", "name": "relay", "type": "action", "rulesCode": "api.run('demo', 'ghost', {})"},
            {
                "key": "k4",
                "name": "lamp",
                "type": "action",
                "rulesCode": "params.level",
                "configParams": {"level": {"defaultValue": 100, "type": "number"}},
                "presets": {"dim": {"configParams": {"level": {"defaultValue": 10, "visible": false}}}}
            }
        ]
    });
    let response = put(app, "/api/v1/boards/demo", board).await;
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test(flavor = "multi_thread")]
async fn get_run_takes_query_params() {
    let app = build_test_app();
    seed(&app).await;

    let response = get(&app, "/api/v1/boards/demo/actions/greet?who=bob").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"], "hello bob");
}

#[tokio::test(flavor = "multi_thread")]
async fn post_run_takes_json_body() {
    let app = build_test_app();
    seed(&app).await;

    let response = post(&app, "/api/v1/boards/demo/actions/greet", Some(json!({"who": "amy"}))).await;
    assert_eq!(body_json(response).await["data"], "hello amy");

    let empty = post(&app, "/api/v1/boards/demo/actions/greet", None).await;
    assert_eq!(body_json(empty).await["data"], "hello nobody");
}

#[tokio::test(flavor = "multi_thread")]
async fn raw_flag_returns_plain_text() {
    let app = build_test_app();
    seed(&app).await;

    let response = get(&app, "/api/v1/boards/demo/actions/greet?who=eve&raw=true").await;
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap().to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
    assert_eq!(body_text(response).await, "hello eve");
}

#[tokio::test(flavor = "multi_thread")]
async fn presets_run_by_alias() {
    let app = build_test_app();
    seed(&app).await;

    let base = body_json(get(&app, "/api/v1/boards/demo/actions/lamp").await).await;
    assert_eq!(base["data"], 100);
    let dim = body_json(get(&app, "/api/v1/boards/demo/actions/lamp.dim").await).await;
    assert_eq!(dim["data"], 10);

    let catalog = body_json(get(&app, "/api/v1/boards/demo/actions").await).await;
    let names: Vec<&str> = catalog["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"lamp.dim"));
    assert!(names.contains(&"greet"));
}

#[tokio::test(flavor = "multi_thread")]
async fn run_tokens_gate_anonymous_callers() {
    let app = build_test_app();
    seed(&app).await;
    let uri = "/api/v1/boards/demo/actions/secret";

    let denied = get(&app, uri).await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(denied).await["code"], "FORBIDDEN");

    let wrong = get(&app, "/api/v1/boards/demo/actions/secret?token=nope").await;
    assert_eq!(wrong.status(), StatusCode::FORBIDDEN);

    let by_query = get(&app, "/api/v1/boards/demo/actions/secret?token=s3").await;
    assert_eq!(body_json(by_query).await["data"], "opened");

    let by_header = send(&app, Method::GET, uri, None, &[("x-board-token", "s3")]).await;
    assert_eq!(by_header.status(), StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread")]
async fn privileged_bearer_bypasses_card_tokens() {
    let app = build_test_app();
    seed(&app).await;
    let uri = "/api/v1/boards/demo/actions/secret";

    for role in [ADMIN_ROLE, SERVICE_ROLE] {
        let token = app.engine.signer().generate("operator", role).unwrap();
        let bearer = format!("Bearer {token}");
        let response = send(&app, Method::GET, uri, None, &[("authorization", bearer.as_str())]).await;
        assert_eq!(response.status(), StatusCode::OK, "role {role}");
    }

    let viewer = app.engine.signer().generate("someone", "viewer").unwrap();
    let bearer = format!("Bearer {viewer}");
    let response = send(&app, Method::GET, uri, None, &[("authorization", bearer.as_str())]).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let garbage = send(&app, Method::GET, uri, None, &[("authorization", "Bearer not-a-jwt")]).await;
    assert_eq!(garbage.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(garbage).await["code"], "UNAUTHORIZED");
}

#[tokio::test(flavor = "multi_thread")]
async fn code_errors_return_structured_payload() {
    let app = build_test_app();
    seed(&app).await;
    let mut rx = app.engine.bus().subscribe();

    let response = get(&app, "/api/v1/boards/demo/actions/broken").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let json = body_json(response).await;
    assert_eq!(json["errorKind"], "CodeExecutionError");
    assert!(json["message"].as_str().unwrap().contains("boom"));
    assert_eq!(json["callStack"][0]["name"], "broken");

    let status = body_json(get(&app, "/api/v1/boards/demo/actions/broken/status").await).await;
    assert_eq!(status["data"]["state"], "error");
    assert!(status["data"]["lastError"].as_str().unwrap().contains("boom"));

    let mut saw_error_event = false;
    while let Ok(event) = rx.try_recv() {
        saw_error_event |= event.topic == "actions/demo/broken/error";
    }
    assert!(saw_error_event);
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_actions_are_404() {
    let app = build_test_app();
    seed(&app).await;

    let response = get(&app, "/api/v1/boards/demo/actions/nope").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");

    let no_board = get(&app, "/api/v1/boards/ghost/actions/greet").await;
    assert_eq!(no_board.status(), StatusCode::NOT_FOUND);

    let no_catalog = get(&app, "/api/v1/boards/ghost/actions").await;
    assert_eq!(no_catalog.status(), StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread")]
async fn non_object_body_is_rejected() {
    let app = build_test_app();
    seed(&app).await;

    let response = post(&app, "/api/v1/boards/demo/actions/greet", Some(json!([1, 2]))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread")]
async fn nested_unknown_action_is_an_execution_failure() {
    let app = build_test_app();
    seed(&app).await;

    let response = get(&app, "/api/v1/boards/demo/actions/relay").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let json = body_json(response).await;
    assert_eq!(json["errorKind"], "CodeExecutionError");
    assert!(json["message"].as_str().unwrap().contains("ghost"));
    assert_eq!(json["callStack"][0]["name"], "relay");
}
