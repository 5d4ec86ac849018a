use crate::protocol::{CloseReason, PeerRole, RoomKey};
use crate::server::RelayServer;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, OriginalUri, State};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use std::sync::Arc;

use super::connection::handle_socket;

const USAGE_BANNER: &str =
    "Room relay. Open a WebSocket to /<roomId>, adding ?initiator=true for the offering peer.";

/// Where a new connection wants to go and what it declared itself to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub room: RoomKey,
    pub role: PeerRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    #[error("request path carries no room id")]
    MissingRoomId,
}

impl AdmissionError {
    pub const fn close_reason(self) -> CloseReason {
        match self {
            Self::MissingRoomId => CloseReason::MissingRoomId,
        }
    }
}

/// Resolve the room key and role from a request target.
///
/// The room key is the path with its single leading `/` removed, taken as-is
/// (no percent-decoding, so `/a%20b` and `/a b` are different rooms). Only
/// `initiator=true` as the first `initiator` query value marks an initiator.
pub fn parse_connect_request(uri: &Uri) -> Result<ConnectRequest, AdmissionError> {
    let path = uri.path();
    let raw_room = path.strip_prefix('/').unwrap_or(path);
    let room = RoomKey::new(raw_room).map_err(|_| AdmissionError::MissingRoomId)?;

    let role = uri.query().map(role_from_query).unwrap_or_default();

    Ok(ConnectRequest { room, role })
}

fn role_from_query(query: &str) -> PeerRole {
    let initiator = url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "initiator")
        .is_some_and(|(_, value)| value == "true");

    if initiator {
        PeerRole::Initiator
    } else {
        PeerRole::Responder
    }
}

/// Upgrade handler for every room path.
///
/// Admission is decided before the upgrade but enforced after it, so a refused
/// client still receives a proper close code instead of an HTTP error.
pub async fn websocket_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(server): State<Arc<RelayServer>>,
    OriginalUri(uri): OriginalUri,
) -> Response {
    let ws = match ws {
        Ok(ws) => ws,
        Err(WebSocketUpgradeRejection::InvalidConnectionHeader(_)) => {
            return (StatusCode::UPGRADE_REQUIRED, USAGE_BANNER).into_response();
        }
        Err(rejection) => {
            tracing::debug!(client_addr = %addr, %uri, error = %rejection, "Rejected upgrade request");
            return rejection.into_response();
        }
    };

    let admission = parse_connect_request(&uri);
    let max_message_size = server.config().max_message_size;

    ws.max_message_size(max_message_size)
        .max_frame_size(max_message_size)
        .on_failed_upgrade(move |err| {
            tracing::warn!(client_addr = %addr, error = %err, "WebSocket upgrade failed");
        })
        .on_upgrade(move |socket| handle_socket(socket, server, addr, admission))
}
