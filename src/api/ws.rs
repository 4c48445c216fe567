//! Live event WebSocket
//!
//! Each connection registers one hub subscription and receives every
//! published event as a JSON text message. Client messages are ignored apart
//! from close frames.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, info};

use super::handlers::DashboardState;
use crate::broadcast::{Hub, Subscription};

/// GET /ws
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<DashboardState>) -> Response {
    let hub = Arc::clone(&state.pipeline.hub);
    ws.on_upgrade(move |socket| stream_events(socket, hub))
}

async fn stream_events(socket: WebSocket, hub: Arc<Hub>) {
    let Subscription { id, mut receiver } = hub.subscribe();
    let (mut sink, mut stream) = socket.split();
    info!(subscriber = id, "🔌 WebSocket client connected");

    loop {
        tokio::select! {
            event = receiver.recv() => match event {
                Some(json) => {
                    if sink.send(Message::Text(json.to_string())).await.is_err() {
                        break;
                    }
                }
                // Hub dropped us for falling behind
                None => {
                    debug!(subscriber = id, "Subscription closed by hub");
                    break;
                }
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    hub.unsubscribe(id);
    let _ = sink.close().await;
    info!(subscriber = id, "WebSocket client disconnected");
}
