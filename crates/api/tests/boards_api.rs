//! Integration tests for board CRUD, card reads, states and templates.

mod common;

use axum::http::StatusCode;
use common::{body_json, build_test_app, delete, get, post, put};
use serde_json::json;

fn counter_board() -> serde_json::Value {
    json!({
        "cards": [
            {"key": "k1", "name": "counter", "type": "action", "rulesCode": "(board.counter or 0) + 1"},
            {"key": "k2", "name": "label", "type": "value", "tokens": {"read": "peek"}}
        ]
    })
}

#[tokio::test]
async fn put_creates_then_updates() {
    let app = build_test_app();

    let created = put(&app, "/api/v1/boards/demo", counter_board()).await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let json = body_json(created).await;
    assert_eq!(json["data"]["name"], "demo");
    assert!(json["data"]["savedAt"].is_string());

    let updated = put(&app, "/api/v1/boards/demo", counter_board()).await;
    assert_eq!(updated.status(), StatusCode::OK);

    let listed = body_json(get(&app, "/api/v1/boards").await).await;
    let boards = listed["data"].as_array().unwrap();
    assert_eq!(boards.len(), 1);
    assert_eq!(boards[0]["name"], "demo");
    assert_eq!(boards[0]["cards"], 2);
    assert_eq!(boards[0]["autopilot"], false);
}

#[tokio::test]
async fn put_rejects_mismatched_name() {
    let app = build_test_app();
    let response = put(&app, "/api/v1/boards/demo", json!({"name": "other", "cards": []})).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn put_rejects_duplicate_card_names() {
    let app = build_test_app();
    let board = json!({
        "cards": [
            {"key": "k1", "name": "dup", "type": "value"},
            {"key": "k2", "name": "dup", "type": "value"}
        ]
    });
    let response = put(&app, "/api/v1/boards/demo", board).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert!(json["error"].as_str().unwrap().contains("dup"));
}

#[tokio::test]
async fn unknown_board_has_error_shape() {
    let app = build_test_app();
    let response = get(&app, "/api/v1/boards/missing").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["code"], "NOT_FOUND");
    assert!(json["error"].is_string());
}

#[tokio::test(flavor = "multi_thread")]
async fn get_board_merges_values_and_client_values_are_stripped() {
    let app = build_test_app();
    let mut board = counter_board();
    board["cards"][0]["value"] = json!(99);
    put(&app, "/api/v1/boards/demo", board).await;

    let fresh = body_json(get(&app, "/api/v1/boards/demo").await).await;
    assert!(fresh["data"]["cards"][0].get("value").is_none());

    post(&app, "/api/v1/boards/demo/actions/counter", None).await;

    let json = body_json(get(&app, "/api/v1/boards/demo").await).await;
    assert_eq!(json["data"]["cards"][0]["value"], 1);
    assert_eq!(json["data"]["autopilot"], false);
}

#[tokio::test]
async fn delete_removes_board_and_actions() {
    let app = build_test_app();
    put(&app, "/api/v1/boards/demo", counter_board()).await;
    assert!(app.engine.catalog().contains("demo", "counter"));

    let response = delete(&app, "/api/v1/boards/demo").await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    assert_eq!(get(&app, "/api/v1/boards/demo").await.status(), StatusCode::NOT_FOUND);
    assert!(!app.engine.catalog().contains("demo", "counter"));
    assert_eq!(delete(&app, "/api/v1/boards/demo").await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread")]
async fn card_value_reads_are_token_gated() {
    let app = build_test_app();
    put(&app, "/api/v1/boards/demo", counter_board()).await;
    post(&app, "/api/v1/boards/demo/actions/counter", None).await;

    let open = body_json(get(&app, "/api/v1/boards/demo/cards/counter").await).await;
    assert_eq!(open["data"], 1);

    let denied = get(&app, "/api/v1/boards/demo/cards/label").await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(denied).await["code"], "FORBIDDEN");

    let allowed = get(&app, "/api/v1/boards/demo/cards/label?token=peek").await;
    assert_eq!(allowed.status(), StatusCode::OK);
    assert_eq!(body_json(allowed).await["data"], serde_json::Value::Null);

    let missing = get(&app, "/api/v1/boards/demo/cards/nope").await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread")]
async fn states_expose_tree_and_tag() {
    let app = build_test_app();
    put(&app, "/api/v1/boards/demo", counter_board()).await;
    post(&app, "/api/v1/boards/demo/actions/counter", None).await;

    let tree = body_json(get(&app, "/api/v1/states").await).await;
    assert_eq!(tree["data"]["boards"]["demo"]["counter"], 1);

    let tag = body_json(get(&app, "/api/v1/states/boards/demo").await).await;
    assert_eq!(tag["data"], json!({"counter": 1}));

    let empty = body_json(get(&app, "/api/v1/states/boards/nowhere").await).await;
    assert_eq!(empty["data"], json!({}));
}

#[tokio::test]
async fn templates_are_grouped_and_addressable() {
    let app = build_test_app();

    let listed = body_json(get(&app, "/api/v1/templates").await).await;
    let cards = listed["data"]["cards"].as_array().unwrap();
    assert!(cards.iter().any(|t| t["id"] == "action/toggle"));

    let one = body_json(get(&app, "/api/v1/templates/action/toggle").await).await;
    assert_eq!(one["data"]["id"], "action/toggle");

    let missing = get(&app, "/api/v1/templates/action/nope").await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread")]
async fn autopilot_toggles() {
    let app = build_test_app();
    put(&app, "/api/v1/boards/demo", counter_board()).await;

    let on = body_json(post(&app, "/api/v1/boards/demo/autopilot/on", None).await).await;
    assert_eq!(on["data"]["autopilot"], true);
    let board = body_json(get(&app, "/api/v1/boards/demo").await).await;
    assert_eq!(board["data"]["autopilot"], true);

    let off = body_json(post(&app, "/api/v1/boards/demo/autopilot/off", None).await).await;
    assert_eq!(off["data"]["autopilot"], false);

    let bad = post(&app, "/api/v1/boards/demo/autopilot/maybe", None).await;
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

    let unknown = post(&app, "/api/v1/boards/missing/autopilot/on", None).await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
}
