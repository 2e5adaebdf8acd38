use std::sync::Arc;

use boardwise_events::{BoardEvent, EventBus};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;
use tokio_util::sync::CancellationToken;

use crate::ws::manager::WsManager;

/// Spawn the task that forwards every bus event to WebSocket clients.
///
/// Runs until `cancel` fires or the bus is dropped. A lagging receiver
/// skips the dropped events and keeps going.
pub fn start_event_bridge(
    bus: &EventBus,
    ws_manager: Arc<WsManager>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let rx = bus.subscribe();
    tokio::spawn(forward(rx, ws_manager, cancel))
}

async fn forward(mut rx: Receiver<BoardEvent>, ws_manager: Arc<WsManager>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Event bridge stopping (cancelled)");
                break;
            }
            received = rx.recv() => match received {
                Ok(event) => {
                    let sent = ws_manager.publish(&event).await;
                    tracing::trace!(topic = %event.topic, sent, "Forwarded event");
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event bridge lagged, events dropped");
                }
                Err(RecvError::Closed) => {
                    tracing::info!("Event bus closed, event bridge stopping");
                    break;
                }
            },
        }
    }
}
