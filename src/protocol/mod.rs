// Protocol module: wire envelope, identifiers, and close codes

pub mod close_codes;
pub mod messages;
pub mod types;

pub use close_codes::CloseReason;

pub use messages::{ServerMessage, SignalEnvelope, SignalParseError, UNKNOWN_SIGNAL_TYPE};

pub use types::{ConnectionId, ConnectionPhase, EmptyRoomKey, PeerRole, RoomKey};
