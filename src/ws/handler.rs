//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::game::{ConnectionHandler, Outbox, OutboxError};
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (handler, outbox) = state.connections.connect();
    let connection_id = handler.id();

    let (ws_sink, ws_stream) = socket.split();
    run_session(&handler, ws_sink, ws_stream, outbox).await;

    handler.on_disconnect();
    info!(connection_id = %connection_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split. Ends when either half ends.
async fn run_session(
    handler: &ConnectionHandler,
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    mut outbox: Outbox,
) {
    let connection_id = handler.id();

    // Spawn writer task: outbound batches addressed to us -> WebSocket
    let mut writer_handle = tokio::spawn(async move {
        loop {
            match outbox.recv().await {
                Ok(events) => {
                    for msg in events.iter() {
                        if let Err(e) = send_msg(&mut ws_sink, msg).await {
                            debug!(
                                connection_id = %connection_id,
                                event = msg.event_name(),
                                error = %e,
                                "WebSocket send failed"
                            );
                            return;
                        }
                    }
                }
                Err(OutboxError::Lagged(n)) => {
                    // Missed joins/leaves can't be replayed; close so the client rejoins with a fresh roster
                    warn!(
                        connection_id = %connection_id,
                        lagged_count = n,
                        "Client lagged {} batches, closing session", n
                    );
                    let _ = ws_sink.send(Message::Close(None)).await;
                    return;
                }
                Err(OutboxError::Closed) => {
                    debug!(connection_id = %connection_id, "Outbound channel closed");
                    return;
                }
            }
        }
    });

    // Reader loop: WebSocket -> world
    let reader = async {
        while let Some(result) = ws_stream.next().await {
            match result {
                Ok(Message::Text(text)) => match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => handler.on_message(msg),
                    Err(e) => {
                        warn!(connection_id = %connection_id, error = %e, "Failed to parse client message");
                    }
                },
                Ok(Message::Binary(_)) => {
                    debug!(connection_id = %connection_id, "Received binary message, ignoring");
                }
                Ok(Message::Ping(_)) => {
                    debug!(connection_id = %connection_id, "Received ping");
                }
                Ok(Message::Pong(_)) => {
                    debug!(connection_id = %connection_id, "Received pong");
                }
                Ok(Message::Close(_)) => {
                    info!(connection_id = %connection_id, "Client initiated close");
                    break;
                }
                Err(e) => {
                    error!(connection_id = %connection_id, error = %e, "WebSocket error");
                    break;
                }
            }
        }
    };

    tokio::select! {
        _ = reader => {}
        _ = &mut writer_handle => {
            debug!(connection_id = %connection_id, "Writer finished, ending session");
        }
    }

    writer_handle.abort();
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
