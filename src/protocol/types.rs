use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Unique identifier for a relayed connection
pub type ConnectionId = Uuid;

/// Opaque room identifier taken from the request path.
///
/// Never empty. Cloning is a reference-count bump, so keys can be handed to the
/// registry and to every log span without copying the string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(into = "String")]
pub struct RoomKey(Arc<str>);

/// Returned when a room key would be empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("room key must not be empty")]
pub struct EmptyRoomKey;

impl RoomKey {
    pub fn new(raw: impl AsRef<str>) -> Result<Self, EmptyRoomKey> {
        let raw = raw.as_ref();
        if raw.is_empty() {
            return Err(EmptyRoomKey);
        }
        Ok(Self(Arc::from(raw)))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<RoomKey> for String {
    fn from(key: RoomKey) -> Self {
        key.as_str().to_owned()
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role a connection declared when it was admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeerRole {
    /// Expected to send the first offer; announces readiness when it completes the pair.
    Initiator,
    /// Waits for `peer-ready` before starting negotiation.
    #[default]
    Responder,
}

impl PeerRole {
    #[inline]
    pub const fn is_initiator(self) -> bool {
        matches!(self, Self::Initiator)
    }
}

/// Lifecycle of a single relayed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Admitted,
    Joined,
    Relaying,
    Closed,
}

impl ConnectionPhase {
    /// Whether moving from `self` to `next` is a legal lifecycle step.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Admitted, Self::Joined)
                | (Self::Admitted, Self::Closed)
                | (Self::Joined, Self::Relaying)
                | (Self::Joined, Self::Closed)
                | (Self::Relaying, Self::Closed)
        )
    }
}
