use crate::protocol::{CloseReason, ServerMessage};
use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;

/// Serialize a relay-originated message into a text payload.
pub(super) fn encode_server_message(message: &ServerMessage) -> Option<Utf8Bytes> {
    match serde_json::to_string(message) {
        Ok(json) => Some(Utf8Bytes::from(json)),
        Err(err) => {
            tracing::error!(error = %err, ?message, "Failed to serialize server message");
            None
        }
    }
}

/// Write a relay-originated message straight to the socket, bypassing the outbound queue.
pub(super) async fn send_immediate_server_message(
    sink: &mut SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    match encode_server_message(message) {
        Some(payload) => sink.send(Message::Text(payload)).await,
        None => Ok(()),
    }
}

pub(super) fn close_message(reason: CloseReason) -> Message {
    Message::Close(Some(CloseFrame {
        code: reason.code(),
        reason: Utf8Bytes::from_static(reason.reason()),
    }))
}

/// Close a socket that never made it past admission.
pub(super) async fn refuse(socket: &mut WebSocket, reason: CloseReason) -> Result<(), axum::Error> {
    socket.send(close_message(reason)).await
}
