//! Tests for `WsManager` topic filtering and the event bridge.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use boardwise_api::ws::{start_event_bridge, WsManager};
use boardwise_events::{BoardEvent, EventBus};
use tokio_util::sync::CancellationToken;

fn text(message: Message) -> serde_json::Value {
    match message {
        Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("expected a text frame, got {other:?}"),
    }
}

#[tokio::test]
async fn add_and_remove_track_connection_count() {
    let manager = WsManager::new();
    let _rx = manager.add("conn-1".to_string()).await;
    let _rx2 = manager.add("conn-2".to_string()).await;
    assert_eq!(manager.connection_count().await, 2);

    manager.remove("conn-1").await;
    manager.remove("nonexistent").await;
    assert_eq!(manager.connection_count().await, 1);
}

#[tokio::test]
async fn publish_respects_topic_filters() {
    let manager = WsManager::new();
    let mut all = manager.add("all".to_string()).await;
    let mut demo = manager.add("demo".to_string()).await;
    assert!(manager.subscribe("demo", vec!["states/boards/demo".into()]).await);
    assert!(!manager.subscribe("ghost", vec![]).await);

    let other = BoardEvent::new("states/boards/other/x/update");
    let mine = BoardEvent::new("states/boards/demo/x/update");
    assert_eq!(manager.publish(&other).await, 1);
    assert_eq!(manager.publish(&mine).await, 2);

    assert_eq!(text(all.recv().await.unwrap())["topic"], "states/boards/other/x/update");
    assert_eq!(text(all.recv().await.unwrap())["topic"], "states/boards/demo/x/update");
    assert_eq!(text(demo.recv().await.unwrap())["topic"], "states/boards/demo/x/update");
    assert!(demo.try_recv().is_err());
}

#[tokio::test]
async fn shutdown_sends_close_and_clears() {
    let manager = WsManager::new();
    let mut rx = manager.add("conn-1".to_string()).await;

    manager.shutdown_all().await;

    assert!(matches!(rx.recv().await, Some(Message::Close(None))));
    assert_eq!(manager.connection_count().await, 0);
}

#[tokio::test]
async fn bridge_forwards_bus_events_until_cancelled() {
    let bus = EventBus::default();
    let manager = Arc::new(WsManager::new());
    let mut rx = manager.add("conn-1".to_string()).await;
    let cancel = CancellationToken::new();
    let handle = start_event_bridge(&bus, Arc::clone(&manager), cancel.clone());

    bus.publish(BoardEvent::new("boards/demo/update").with_from("boards"));

    let frame = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("frame within timeout")
        .unwrap();
    let json = text(frame);
    assert_eq!(json["topic"], "boards/demo/update");
    assert_eq!(json["from"], "boards");

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("bridge stops")
        .unwrap();
}
