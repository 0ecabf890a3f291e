//! Signaling over WebSocket
//!
//! Each upgraded socket is split in two. A writer task owns the sink and
//! drains the connection's outbound queue; the reader loop below feeds every
//! inbound frame to the signal router. When the reader loop ends, for any
//! reason, the router's disconnect path runs once and the writer is stopped.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use rendezvous_relay::{connection_channel, ConnectionHandle, OutboundMessage, RouteOutcome};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn, Instrument};

use crate::server::AppState;

/// Create the WebSocket router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(websocket_handler))
        .route("/ws", get(websocket_handler))
        .with_state(state)
}

/// GET / and GET /ws
///
/// Upgrades the HTTP connection to a WebSocket carrying signaling messages.
async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    debug!("Signaling WebSocket connection request");

    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle one signaling WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (handle, outbound) = connection_channel(state.config.outbound_buffer);
    let span = tracing::info_span!("connection", id = %handle.id());

    async move {
        info!("Client connected");

        let (sender, mut receiver) = socket.split();
        let mut writer = tokio::spawn(write_outbound(sender, outbound).in_current_span());

        loop {
            tokio::select! {
                frame = receiver.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        dispatch(&state, &handle, &text).await;
                    }
                    Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                        Ok(text) => dispatch(&state, &handle, &text).await,
                        Err(_) => warn!("Dropping non-UTF-8 binary frame"),
                    },
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                        // Pongs are sent by the WebSocket layer
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("WebSocket close requested");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                    None => break,
                },
                _ = &mut writer => {
                    debug!("Writer stopped, closing connection");
                    break;
                }
            }
        }

        state.router.handle_disconnect(&handle).await;
        drop(handle);
        writer.abort();

        info!("Client disconnected");
    }
    .instrument(span)
    .await
}

/// Route one text frame, logging anything that was dropped.
async fn dispatch(state: &AppState, handle: &ConnectionHandle, text: &str) {
    debug!(len = text.len(), "Received signaling message");

    if let RouteOutcome::Dropped(reason) = state.router.handle_message(handle, text).await {
        debug!(reason = %reason, "Message not delivered");
    }
}

/// Drain the outbound queue into the socket until either side goes away.
async fn write_outbound(
    mut sender: futures::stream::SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<OutboundMessage>,
) {
    while let Some(message) = outbound.recv().await {
        if let Err(e) = sender.send(Message::Text(message.into_payload())).await {
            debug!(error = %e, "Failed to write WebSocket message");
            return;
        }
    }

    if let Err(e) = sender.close().await {
        debug!(error = %e, "Failed to close WebSocket");
    }
}
