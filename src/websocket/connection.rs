use crate::protocol::{
    CloseReason, ConnectionId, ConnectionPhase, PeerRole, RoomKey, ServerMessage, SignalEnvelope,
};
use crate::registry::{JoinOutcome, MemberHandle, PAIR_SIZE};
use crate::server::RelayServer;
use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::handler::{AdmissionError, ConnectRequest};
use super::sending::{
    close_message, encode_server_message, refuse, send_immediate_server_message,
};

/// Why the relay loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopExit {
    /// Close frame received or the stream ended
    PeerClosed,
    /// The socket reported an error while reading
    TransportError,
    /// The writer task stopped, so nothing more can reach this client
    WriterClosed,
    /// The server is shutting down
    Shutdown,
}

struct Session {
    id: ConnectionId,
    room: RoomKey,
    role: PeerRole,
    phase: ConnectionPhase,
}

impl Session {
    fn advance(&mut self, next: ConnectionPhase) {
        debug_assert!(
            self.phase.can_transition_to(next),
            "illegal connection transition {:?} -> {:?}",
            self.phase,
            next
        );
        debug!(connection_id = %self.id, from = ?self.phase, to = ?next, "Connection phase change");
        self.phase = next;
    }
}

pub(super) async fn handle_socket(
    mut socket: WebSocket,
    server: Arc<RelayServer>,
    addr: SocketAddr,
    admission: Result<ConnectRequest, AdmissionError>,
) {
    let connection_id = Uuid::new_v4();

    let ConnectRequest { room, role } = match admission {
        Ok(request) => request,
        Err(err) => {
            server.metrics().increment_admission_refusals();
            warn!(%connection_id, client_addr = %addr, error = %err, "Refusing connection");
            if let Err(err) = refuse(&mut socket, err.close_reason()).await {
                debug!(%connection_id, error = %err, "Failed to send refusal close frame");
            }
            return;
        }
    };

    info!(
        %connection_id,
        client_addr = %addr,
        room_id = %room,
        initiator = role.is_initiator(),
        "New connection"
    );
    server.metrics().increment_connections();

    let mut session = Session {
        id: connection_id,
        room,
        role,
        phase: ConnectionPhase::Admitted,
    };

    let (mut sink, stream) = socket.split();
    let (tx, rx) = mpsc::channel::<Message>(server.config().outbound_queue_capacity);

    let joined = server
        .registry()
        .join(&session.room, MemberHandle::new(connection_id, tx.clone()));
    session.advance(ConnectionPhase::Joined);

    // Written directly, before the writer task exists, so it always precedes
    // anything a peer has already queued for this connection.
    let connected = ServerMessage::Connected {
        room_id: session.room.clone(),
    };
    if let Err(err) = send_immediate_server_message(&mut sink, &connected).await {
        server.metrics().increment_transport_errors();
        warn!(%connection_id, room_id = %session.room, error = %err, "Failed to acknowledge join");
        teardown(&server, &mut session, LoopExit::TransportError);
        return;
    }

    announce_peer_ready(&server, &session, joined);
    session.advance(ConnectionPhase::Relaying);

    let mut writer = tokio::spawn(drain_outbound(sink, rx, connection_id));
    let shutdown = server.shutdown_token();

    let exit = tokio::select! {
        exit = relay_inbound(stream, &server, &session) => exit,
        _ = &mut writer => LoopExit::WriterClosed,
        () = shutdown.cancelled() => LoopExit::Shutdown,
    };

    teardown(&server, &mut session, exit);

    if exit == LoopExit::WriterClosed {
        return;
    }
    if exit == LoopExit::Shutdown {
        queue_shutdown_close(&tx, connection_id);
    }
    // Dropping our sender lets the writer drain and close once the registry's
    // handle (removed above) and any in-flight broadcast snapshots are gone.
    drop(tx);

    let grace = server.config().shutdown_grace_period;
    if tokio::time::timeout(grace, &mut writer).await.is_err() {
        debug!(%connection_id, "Writer did not finish within grace period; aborting");
        writer.abort();
    }
}

/// Queue the going-away close frame behind whatever the writer still has to flush.
fn queue_shutdown_close(tx: &mpsc::Sender<Message>, connection_id: ConnectionId) -> bool {
    match tx.try_send(close_message(CloseReason::ServerShutdown)) {
        Ok(()) => true,
        Err(err) => {
            debug!(%connection_id, error = %err, "Failed to queue shutdown close frame");
            false
        }
    }
}

/// Tell the waiting member its peer has arrived.
///
/// Only the initiator completing a pair announces readiness; an initiator that
/// arrives first, or a third member, stays silent. The recipient is the peer seen
/// at join time, never whoever happens to be in the room now.
fn announce_peer_ready(server: &RelayServer, session: &Session, joined: JoinOutcome) {
    let JoinOutcome {
        member_count,
        peers,
    } = joined;
    if member_count != PAIR_SIZE || !session.role.is_initiator() {
        if member_count > PAIR_SIZE {
            warn!(
                connection_id = %session.id,
                room_id = %session.room,
                member_count,
                "Room already holds a pair; no peer-ready for this connection"
            );
        }
        return;
    }

    let Some(payload) = encode_server_message(&ServerMessage::PeerReady) else {
        return;
    };
    let delivered = server.registry().deliver(&session.room, peers, payload);
    if delivered > 0 {
        server.metrics().increment_peer_ready_sent();
    }
    info!(
        connection_id = %session.id,
        room_id = %session.room,
        delivered,
        "Initiator completed pair; peer-ready sent"
    );
}

async fn relay_inbound(
    mut stream: SplitStream<WebSocket>,
    server: &RelayServer,
    session: &Session,
) -> LoopExit {
    while let Some(frame) = stream.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                server.metrics().increment_transport_errors();
                warn!(connection_id = %session.id, room_id = %session.room, error = %err, "WebSocket error");
                return LoopExit::TransportError;
            }
        };

        let text = match frame {
            Message::Text(text) => text,
            Message::Binary(bytes) => match Utf8Bytes::try_from(bytes) {
                Ok(text) => text,
                Err(_) => {
                    server.metrics().increment_parse_errors();
                    warn!(connection_id = %session.id, room_id = %session.room, "Dropping non-UTF-8 binary frame");
                    continue;
                }
            },
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Close(frame) => {
                debug!(connection_id = %session.id, ?frame, "Client sent close frame");
                return LoopExit::PeerClosed;
            }
        };

        relay_frame(server, session, text);
    }

    LoopExit::PeerClosed
}

fn relay_frame(server: &RelayServer, session: &Session, text: Utf8Bytes) {
    server.metrics().increment_messages_received();

    let envelope = match SignalEnvelope::inspect(text.as_str()) {
        Ok(envelope) => envelope,
        Err(err) => {
            server.metrics().increment_parse_errors();
            warn!(
                connection_id = %session.id,
                room_id = %session.room,
                error = %err,
                "Dropping malformed signaling message"
            );
            return;
        }
    };

    let delivered = server
        .registry()
        .broadcast_except(&session.room, session.id, text);
    server.metrics().add_messages_relayed(delivered as u64);
    info!(
        connection_id = %session.id,
        room_id = %session.room,
        message_type = %envelope.message_type,
        delivered,
        "Relayed signaling message"
    );
}

/// Leave the room exactly once, however the connection ended.
fn teardown(server: &RelayServer, session: &mut Session, exit: LoopExit) {
    if session.phase == ConnectionPhase::Closed {
        return;
    }
    server.registry().leave(&session.room, session.id);
    server.metrics().decrement_active_connections();
    session.advance(ConnectionPhase::Closed);
    info!(connection_id = %session.id, room_id = %session.room, reason = ?exit, "Connection closed");
}

/// Owns the socket's write half; everything bound for this client passes through here.
async fn drain_outbound(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Message>,
    connection_id: ConnectionId,
) {
    while let Some(message) = rx.recv().await {
        let closing = matches!(message, Message::Close(_));
        if let Err(err) = sink.send(message).await {
            debug!(%connection_id, error = %err, "Failed to write frame, connection closed");
            return;
        }
        if closing {
            return;
        }
    }

    let _ = sink.close().await;
}
