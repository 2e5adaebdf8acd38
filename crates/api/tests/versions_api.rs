//! Integration tests for version history over HTTP.

mod common;

use axum::http::StatusCode;
use common::{body_json, build_test_app, get, post, put};
use serde_json::json;

#[tokio::test]
async fn snapshot_undo_redo_and_restore() {
    let app = build_test_app();
    put(
        &app,
        "/api/v1/boards/demo",
        json!({"cards": [{"key": "k1", "name": "first", "type": "value"}]}),
    )
    .await;

    let listed = body_json(get(&app, "/api/v1/boards/demo/versions").await).await;
    assert_eq!(listed["data"], json!([0]));

    // Edit, then snapshot the edit as version 1.
    put(
        &app,
        "/api/v1/boards/demo",
        json!({"cards": [
            {"key": "k1", "name": "first", "type": "value"},
            {"key": "k2", "name": "second", "type": "value"}
        ]}),
    )
    .await;
    let created = post(&app, "/api/v1/boards/demo/versions", None).await;
    assert_eq!(created.status(), StatusCode::CREATED);
    assert_eq!(body_json(created).await["data"]["version"], 1);

    let current = body_json(get(&app, "/api/v1/boards/demo/versions/current").await).await;
    assert_eq!(current["data"]["version"], 1);

    let undone = body_json(post(&app, "/api/v1/boards/demo/undo", None).await).await;
    assert_eq!(undone["data"]["version"], 0);
    assert_eq!(undone["data"]["cards"].as_array().unwrap().len(), 1);

    let nothing = body_json(post(&app, "/api/v1/boards/demo/undo", None).await).await;
    assert!(nothing["data"].is_null());

    let redone = body_json(post(&app, "/api/v1/boards/demo/redo", None).await).await;
    assert_eq!(redone["data"]["version"], 1);
    assert_eq!(redone["data"]["cards"].as_array().unwrap().len(), 2);

    let restored = body_json(post(&app, "/api/v1/boards/demo/versions/0/restore", None).await).await;
    assert_eq!(restored["data"]["version"], 0);
    let listed = body_json(get(&app, "/api/v1/boards/demo/versions").await).await;
    assert_eq!(listed["data"], json!([0, 1]));
}

#[tokio::test]
async fn missing_versions_and_boards() {
    let app = build_test_app();

    let current = body_json(get(&app, "/api/v1/boards/ghost/versions/current").await).await;
    assert!(current["data"]["version"].is_null());

    let undo = post(&app, "/api/v1/boards/ghost/undo", None).await;
    assert_eq!(undo.status(), StatusCode::NOT_FOUND);

    put(&app, "/api/v1/boards/demo", json!({"cards": []})).await;
    let restore = post(&app, "/api/v1/boards/demo/versions/7/restore", None).await;
    assert_eq!(restore.status(), StatusCode::NOT_FOUND);

    let bad = post(&app, "/api/v1/boards/demo/versions/abc/restore", None).await;
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
}
