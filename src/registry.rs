//! Room registry: the only state shared between connection tasks.
//!
//! Each room key maps to the handles of its live members. A room exists exactly as
//! long as it has at least one member. Join, leave, and broadcast on a key are
//! serialized by the shard lock guarding that key, and no lock is ever held while a
//! message is being queued for a peer.

use std::sync::Arc;

use axum::extract::ws::{Message, Utf8Bytes};
use dashmap::DashMap;
use smallvec::SmallVec;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info};

use crate::metrics::RelayMetrics;
use crate::protocol::{ConnectionId, RoomKey};

/// Rooms are meant for two peers; larger rooms spill to the heap.
pub const PAIR_SIZE: usize = 2;

type MemberSet = SmallVec<[MemberHandle; PAIR_SIZE]>;

/// Why a single delivery was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("peer outbound queue is full")]
    QueueFull,
    #[error("peer connection is closed")]
    Closed,
}

/// What a connection found when it joined a room.
#[derive(Debug)]
pub struct JoinOutcome {
    /// Members in the room right after insertion, the joiner included
    pub member_count: usize,
    /// Every other member at that instant
    pub peers: SmallVec<[MemberHandle; PAIR_SIZE]>,
}

/// Non-owning reference to a connection, held by the registry.
///
/// The connection's socket stays with its own handler task; the registry can only
/// push frames onto the bounded queue that task drains.
#[derive(Debug, Clone)]
pub struct MemberHandle {
    id: ConnectionId,
    outbound: mpsc::Sender<Message>,
}

impl MemberHandle {
    pub fn new(id: ConnectionId, outbound: mpsc::Sender<Message>) -> Self {
        Self { id, outbound }
    }

    #[inline]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// True while the owning task is still draining the queue.
    #[inline]
    pub fn is_open(&self) -> bool {
        !self.outbound.is_closed()
    }

    /// Queue a frame without waiting.
    pub fn try_deliver(&self, message: Message) -> Result<(), DeliveryError> {
        self.outbound.try_send(message).map_err(|err| match err {
            TrySendError::Full(_) => DeliveryError::QueueFull,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

/// Maps room keys to their member connections.
pub struct RoomRegistry {
    rooms: DashMap<RoomKey, MemberSet>,
    metrics: Arc<RelayMetrics>,
}

impl RoomRegistry {
    pub fn new(metrics: Arc<RelayMetrics>) -> Self {
        Self {
            rooms: DashMap::new(),
            metrics,
        }
    }

    /// Add `member` to `room`, creating the room if needed.
    ///
    /// The returned member count and peer list are taken under the same lock as the
    /// insertion, so they describe the room exactly as this member found it. Joining
    /// twice with the same connection id leaves a single membership.
    pub fn join(&self, room: &RoomKey, member: MemberHandle) -> JoinOutcome {
        let connection_id = member.id();
        let mut created = false;

        let outcome = {
            let mut members = self.rooms.entry(room.clone()).or_insert_with(|| {
                created = true;
                MemberSet::new()
            });
            if !members.iter().any(|existing| existing.id == connection_id) {
                members.push(member);
            }
            JoinOutcome {
                member_count: members.len(),
                peers: members
                    .iter()
                    .filter(|existing| existing.id != connection_id)
                    .cloned()
                    .collect(),
            }
        };

        if created {
            self.metrics.increment_rooms_created();
            info!(room_id = %room, "Room created");
        }
        debug!(
            room_id = %room,
            %connection_id,
            member_count = outcome.member_count,
            "Connection joined room"
        );

        outcome
    }

    /// Remove a connection from `room`, deleting the room once it is empty.
    ///
    /// Returns whether a membership was actually removed; a second call for the
    /// same connection is a no-op that returns `false`.
    pub fn leave(&self, room: &RoomKey, connection_id: ConnectionId) -> bool {
        let removed = match self.rooms.get_mut(room) {
            Some(mut members) => {
                let before = members.len();
                members.retain(|member| member.id != connection_id);
                members.len() != before
            }
            None => false,
        };

        if !removed {
            return false;
        }

        // Re-checked under the shard lock so a concurrent join keeps the room alive.
        if self
            .rooms
            .remove_if(room, |_, members| members.is_empty())
            .is_some()
        {
            self.metrics.increment_rooms_deleted();
            info!(room_id = %room, "Room deleted");
        }
        debug!(room_id = %room, %connection_id, "Connection left room");

        true
    }

    /// Queue `payload` as a text frame for every member of `room` except `sender`.
    ///
    /// Members that are closed or whose queue is full are skipped individually; the
    /// sender never sees a delivery failure. Returns how many members the frame was
    /// queued for.
    pub fn broadcast_except(
        &self,
        room: &RoomKey,
        sender: ConnectionId,
        payload: Utf8Bytes,
    ) -> usize {
        let recipients: MemberSet = match self.rooms.get(room) {
            Some(members) => members
                .iter()
                .filter(|member| member.id != sender)
                .cloned()
                .collect(),
            None => return 0,
        };

        self.deliver(room, recipients, payload)
    }

    /// Queue `payload` as a text frame for each of `recipients`, skipping closed or
    /// full peers. Returns how many members the frame was queued for.
    pub fn deliver(
        &self,
        room: &RoomKey,
        recipients: impl IntoIterator<Item = MemberHandle>,
        payload: Utf8Bytes,
    ) -> usize {
        let mut delivered = 0;
        for recipient in recipients {
            if !recipient.is_open() {
                self.metrics.increment_messages_dropped();
                continue;
            }
            match recipient.try_deliver(Message::Text(payload.clone())) {
                Ok(()) => delivered += 1,
                Err(err) => {
                    self.metrics.increment_messages_dropped();
                    debug!(
                        room_id = %room,
                        recipient = %recipient.id(),
                        error = %err,
                        "Skipped delivery to peer"
                    );
                }
            }
        }

        delivered
    }

    /// Number of members currently in `room` (zero if it does not exist).
    pub fn member_count(&self, room: &RoomKey) -> usize {
        self.rooms.get(room).map_or(0, |members| members.len())
    }

    pub fn contains_room(&self, room: &RoomKey) -> bool {
        self.rooms.contains_key(room)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Total memberships across all rooms.
    pub fn connection_count(&self) -> usize {
        self.rooms.iter().map(|entry| entry.value().len()).sum()
    }
}
