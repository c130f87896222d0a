//! WebSocket Connection Handler
//!
//! Drives one WebSocket connection: Hello, Identify, registration with the
//! hub, then the frame loop until the peer leaves or the hub evicts it.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{Sink, SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;

use super::messages::{GatewayReceive, GatewaySend};
use super::transport::WsConnection;
use crate::application::HubEvent;
use crate::domain::SessionId;
use crate::shared::error::HubError;
use crate::startup::AppState;

/// Time given to the writer to flush a final frame before the socket drops.
const CLOSE_FLUSH: Duration = Duration::from_millis(100);

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let max_message_size = state.settings.websocket.max_message_size;
    ws.max_message_size(max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Bounded so that a slow reader turns into delivery timeouts
    let (tx, mut rx) =
        mpsc::channel::<GatewaySend>(state.settings.websocket.outbound_queue_size);

    // Send Hello message immediately
    let hello = GatewaySend::hello(state.hub.heartbeat_interval().as_millis() as u64);
    if let Err(e) = send_frame(&mut sender, &hello).await {
        tracing::debug!(error = %e, "Failed to send Hello");
        return;
    }

    // Spawn task to forward messages from channel to WebSocket
    let sender_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = send_frame(&mut sender, &frame).await {
                tracing::debug!(error = %e, "WebSocket write failed");
                break;
            }
        }
    });

    // Wait for Identify (with timeout)
    let identify_timeout = Duration::from_secs(state.settings.websocket.identify_timeout_secs);
    let identify_result = timeout(identify_timeout, async {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    match GatewayReceive::parse(text.as_str()).and_then(GatewayReceive::into_identify) {
                        Ok(identify) => return Some(identify),
                        Err(e) => tracing::debug!(error = %e, "Expected Identify"),
                    }
                }
                Ok(Message::Close(_)) | Err(_) => return None,
                _ => continue,
            }
        }
        None
    })
    .await;

    let identify = match identify_result {
        Ok(Some(identify)) => identify,
        Ok(None) => {
            tracing::debug!("Connection closed before Identify");
            sender_task.abort();
            return;
        }
        Err(_) => {
            tracing::debug!("Identify timeout");
            reject(&tx, sender_task, None).await;
            return;
        }
    };

    let user_id = match state.authenticator.authenticate(&identify.token).await {
        Ok(user_id) => user_id,
        Err(e) => {
            tracing::debug!(error = %e, "Authentication failed");
            reject(&tx, sender_task, None).await;
            return;
        }
    };

    // Subscribe before registering so an early eviction is not missed
    let mut hub_events = state.hub.events();

    let connection = Arc::new(WsConnection::new(tx.clone()));
    let session_id = match state.hub.accept_connection(user_id.clone(), connection) {
        Ok(session_id) => session_id,
        Err(e) => {
            tracing::info!(user_id = %user_id, error = %e, "Connection refused");
            reject(&tx, sender_task, Some(e)).await;
            return;
        }
    };

    if tx
        .send(GatewaySend::ready(session_id.clone(), user_id.clone()))
        .await
        .is_err()
    {
        state.hub.unregister(&session_id);
        sender_task.abort();
        return;
    }

    tracing::info!(
        user_id = %user_id,
        session_id = %session_id,
        "User connected and identified"
    );

    // Main message loop
    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match handle_message(text.as_str(), &session_id, &state).await {
                            Ok(reply) => {
                                if tx.send(reply).await.is_err() {
                                    break;
                                }
                            }
                            Err(MessageError::SessionGone) => {
                                tracing::debug!(session_id = %session_id, "Session no longer live");
                                let _ = tx.send(GatewaySend::invalid_session()).await;
                                break;
                            }
                            Err(MessageError::Rejected(reply)) => {
                                if tx.send(reply).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!(session_id = %session_id, "Connection closed");
                        break;
                    }
                    Some(Ok(Message::Ping(_))) => {
                        // Pong is handled automatically by axum
                    }
                    Some(Err(e)) => {
                        tracing::debug!(session_id = %session_id, error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }

            event = hub_events.recv() => {
                match event {
                    Ok(HubEvent::SessionEvicted { session_id: evicted, .. }) if evicted == session_id => {
                        tracing::info!(session_id = %session_id, "Heartbeat timeout, closing connection");
                        let _ = tx.send(GatewaySend::invalid_session()).await;
                        break;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(session_id = %session_id, skipped = n, "Hub event receiver lagged");
                        if !state.hub.registry().contains(&session_id) {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    // Cleanup
    state.hub.unregister(&session_id);
    drop(tx);
    tokio::time::sleep(CLOSE_FLUSH).await;
    sender_task.abort();

    tracing::info!(
        user_id = %user_id,
        session_id = %session_id,
        "User disconnected"
    );
}

/// Why a frame produced no normal reply.
enum MessageError {
    /// The session was evicted or unregistered; the socket must close.
    SessionGone,
    /// The frame was refused; the reply explains why.
    Rejected(GatewaySend),
}

/// Handle incoming WebSocket message
async fn handle_message(
    text: &str,
    session_id: &SessionId,
    state: &AppState,
) -> Result<GatewaySend, MessageError> {
    let frame = GatewayReceive::parse(text)
        .and_then(GatewayReceive::into_client_frame)
        .map_err(|e| {
            tracing::debug!(session_id = %session_id, error = %e, "Undecodable frame");
            MessageError::Rejected(GatewaySend::error(
                HubError::InvalidFrame(e.to_string()).to_response(),
            ))
        })?;

    tracing::trace!(session_id = %session_id, kind = frame.kind(), "Frame received");

    match state.hub.handle_client_frame(session_id, frame).await {
        Ok(outcome) => Ok(GatewaySend::from_outcome(&outcome)),
        Err(HubError::NotFound(_)) | Err(HubError::SessionNotFound(_)) => {
            Err(MessageError::SessionGone)
        }
        Err(e) => Err(MessageError::Rejected(GatewaySend::error(e.to_response()))),
    }
}

/// Refuse the connection: optional error frame, InvalidSession, then close.
async fn reject(
    tx: &mpsc::Sender<GatewaySend>,
    sender_task: tokio::task::JoinHandle<()>,
    error: Option<HubError>,
) {
    if let Some(e) = error {
        let _ = tx.send(GatewaySend::error(e.to_response())).await;
    }
    let _ = tx.send(GatewaySend::invalid_session()).await;
    tokio::time::sleep(CLOSE_FLUSH).await;
    sender_task.abort();
}

async fn send_frame<S>(sender: &mut S, frame: &GatewaySend) -> Result<(), axum::Error>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    let text = serde_json::to_string(frame).map_err(axum::Error::new)?;
    sender.send(Message::Text(text.into())).await
}
