use axum::{
    extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    response::{IntoResponse, Response},
};
use mona_core::registry::{ConnectionRegistry, RegistryError};
use mona_sdk::objects::WsCloseCode;
use std::time::Duration;
use thiserror::Error;

use super::ApiError;
use crate::state::AppState;

/// Subscriber channel upgrade.
///
/// Rejected with 503 before the upgrade when the subscriber limit is
/// already reached or the server is shutting down.
pub(super) fn subscribe(state: AppState, upgrade: WebSocketUpgrade) -> Response {
    let registry = state.registry;
    if registry.is_closed() {
        return ApiError::ShuttingDown.into_response();
    }
    if registry.is_full() {
        tracing::warn!(
            limit = registry.config().max_subscribers,
            "WS: rejecting subscriber before upgrade, at capacity"
        );
        return ApiError::AtCapacity.into_response();
    }
    upgrade.on_upgrade(move |socket| handle_subscriber(socket, registry))
}

/// Background task that drives a single subscriber connection.
///
/// 1. Admits the subscriber, which queues the snapshot as the first frame.
/// 2. Writes queued frames to the socket, ignoring anything the client sends.
/// 3. When the registry drops the subscriber, sends a close frame:
///    normal on shutdown, policy violation if it was pruned for stalling.
///
/// Every write is bounded by the configured write timeout. A client that
/// stops reading is disconnected once a write stalls, which releases its
/// registry slot.
async fn handle_subscriber(mut socket: WebSocket, registry: ConnectionRegistry) {
    let deadline = registry.config().write_timeout;
    let mut subscription = match registry.admit() {
        Ok(subscription) => subscription,
        Err(e) => {
            tracing::warn!(error = %e, "WS: admission failed after upgrade");
            let (code, reason) = admission_close(&e);
            send_close(&mut socket, code, reason, deadline).await;
            return;
        }
    };
    let subscriber = subscription.id();

    loop {
        tokio::select! {
            frame = subscription.recv() => {
                let Some(frame) = frame else {
                    break;
                };
                match write(&mut socket, Message::Text(frame.as_ref().into()), deadline).await {
                    Ok(()) => {}
                    Err(WriteError::TimedOut(after)) => {
                        tracing::warn!(
                            %subscriber,
                            ?after,
                            "WS: write stalled, dropping subscriber"
                        );
                        return;
                    }
                    Err(WriteError::Socket(e)) => {
                        tracing::debug!(%subscriber, error = %e, "WS: send failed, client gone");
                        return;
                    }
                }
            }

            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!(%subscriber, "WS: client closed connection");
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(%subscriber, error = %e, "WS: receive failed");
                        return;
                    }
                }
            }
        }
    }

    if registry.is_closed() {
        send_close(&mut socket, WsCloseCode::NORMAL, "server shutting down", deadline).await;
    } else {
        tracing::info!(%subscriber, "WS: closing pruned subscriber");
        send_close(
            &mut socket,
            WsCloseCode::POLICY_VIOLATION,
            "subscriber too slow",
            deadline,
        )
        .await;
    }
}

/// Close code and reason for a subscriber that could not be admitted.
fn admission_close(error: &RegistryError) -> (u16, &'static str) {
    match error {
        RegistryError::AtCapacity { .. } => {
            (WsCloseCode::TRY_AGAIN_LATER, "subscriber limit reached")
        }
        RegistryError::Closed => (WsCloseCode::NORMAL, "server shutting down"),
        RegistryError::Serialize(_) => (WsCloseCode::INTERNAL_ERROR, "internal error"),
    }
}

#[derive(Debug, Error)]
enum WriteError {
    #[error(transparent)]
    Socket(#[from] axum::Error),

    #[error("write timed out after {0:?}")]
    TimedOut(Duration),
}

async fn write(
    socket: &mut WebSocket,
    message: Message,
    deadline: Duration,
) -> Result<(), WriteError> {
    tokio::time::timeout(deadline, socket.send(message))
        .await
        .map_err(|_| WriteError::TimedOut(deadline))??;
    Ok(())
}

async fn send_close(socket: &mut WebSocket, code: u16, reason: &'static str, deadline: Duration) {
    let close = Message::Close(Some(CloseFrame {
        code,
        reason: reason.into(),
    }));
    if let Err(e) = write(socket, close, deadline).await {
        tracing::debug!(error = %e, code, "WS: close frame not sent");
    }
}
