//! Live-feed WebSocket endpoint
//!
//! `GET /ws/telemetry/:unit_id` upgrades to a WebSocket and runs one
//! [`LiveFeed`](crate::pipeline::LiveFeed) viewer loop over it. Each event is
//! sent as one JSON text frame. A close frame or read error from the client
//! cancels only this viewer.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::handlers::DashboardState;
use crate::pipeline::{FeedError, FeedSink, TwinRuntime};
use crate::types::FeedEvent;

/// GET /ws/telemetry/:unit_id
pub async fn telemetry_ws(
    ws: WebSocketUpgrade,
    Path(unit_id): Path<String>,
    State(state): State<DashboardState>,
) -> Response {
    let runtime = Arc::clone(&state.runtime);
    ws.on_upgrade(move |socket| serve_viewer(socket, unit_id, runtime))
}

async fn serve_viewer(socket: WebSocket, unit_id: String, runtime: Arc<TwinRuntime>) {
    let (sender, mut receiver) = socket.split();
    let cancel = CancellationToken::new();

    let reader = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            while let Some(msg) = receiver.next().await {
                match msg {
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            cancel.cancel();
        })
    };

    let sink = WsSink { sender };
    if let Err(e) = runtime.feed.run_viewer(&unit_id, sink, cancel.clone()).await {
        warn!(unit_id = %unit_id, error = %e, "[LiveFeed] Viewer loop ended with error");
    }

    cancel.cancel();
    reader.abort();
    debug!(unit_id = %unit_id, "[LiveFeed] WebSocket closed");
}

struct WsSink {
    sender: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl FeedSink for WsSink {
    async fn send(&mut self, event: &FeedEvent) -> Result<(), FeedError> {
        let text = serde_json::to_string(event)?;
        self.sender
            .send(Message::Text(text))
            .await
            .map_err(|_| FeedError::Closed)
    }
}
