use std::fmt;

/// Reasons the relay itself closes a WebSocket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The request path carried no room id.
    MissingRoomId,
    /// The process is shutting down.
    ServerShutdown,
}

impl CloseReason {
    /// RFC 6455 status code sent in the close frame.
    pub const fn code(self) -> u16 {
        match self {
            Self::MissingRoomId => 1008,
            Self::ServerShutdown => 1001,
        }
    }

    /// Human-readable reason sent in the close frame.
    pub const fn reason(self) -> &'static str {
        match self {
            Self::MissingRoomId => "Room ID required",
            Self::ServerShutdown => "Server shutting down",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.reason(), self.code())
    }
}
