//! /ws — bridges one WebSocket connection to one gateway session.
//!
//! The reader half forwards frames to the gateway in arrival order. A writer
//! task drains the session's bounded outbound queue into the socket, so a
//! slow client only ever backs up its own queue. Frames the bridge cannot
//! decode are rejected through the gateway too, so the error reply keeps its
//! place among replies to earlier frames.

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use rally_core::wire::WireError;
use rally_services::Frame;

use super::ApiState;

/// How long the writer may keep flushing queued frames after the reader ends.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

pub async fn handle_ws(
    ws: WebSocketUpgrade,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    State(state): State<ApiState>,
) -> Response {
    ws.on_upgrade(move |socket| run_session(socket, remote, state))
}

async fn run_session(socket: WebSocket, remote: SocketAddr, state: ApiState) {
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Frame>(state.outbound_queue_depth.max(1));

    let session = match state.gateway.open(remote, outbound_tx).await {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(%remote, error = %e, "refusing connection");
            return;
        }
    };

    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if let Err(e) = sink.send(Message::Text(frame.to_string().into())).await {
                tracing::debug!(session, error = %e, "write failed, stopping writer");
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(msg) = stream.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(session, error = %e, "read failed");
                break;
            }
        };

        let payload = match msg {
            Message::Text(text) => text.to_string(),
            Message::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => text,
                Err(_) => {
                    if state.gateway.reject(session, WireError::BinaryFrame).await.is_err() {
                        tracing::debug!(session, "gateway stopped, dropping connection");
                        break;
                    }
                    continue;
                }
            },
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        if state.gateway.frame(session, payload).await.is_err() {
            tracing::debug!(session, "gateway stopped, dropping connection");
            break;
        }
    }

    if let Err(e) = state.gateway.close(session).await {
        tracing::debug!(session, error = %e, "close not delivered");
    }

    // The gateway drops its sender on close, which ends the writer once the
    // queue is flushed.
    let abort = writer.abort_handle();
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer).await.is_err() {
        tracing::debug!(session, "writer did not drain in time");
        abort.abort();
    }
}
