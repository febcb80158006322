//! Unified error type for Campfire.

use campfire_peer::PeerError;
use campfire_protocol::ProtocolError;
use campfire_room::RoomError;
use campfire_transport::TransportError;

/// Top-level error that wraps every layer's error.
///
/// The `#[from]` conversions let `?` lift layer errors into this one.
#[derive(Debug, thiserror::Error)]
pub enum CampfireError {
    /// Bus failure (not connected, send failed, shut down).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Encode/decode failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Media negotiation failure.
    #[error(transparent)]
    Peer(#[from] PeerError),

    /// Fire or roster operation rejected.
    #[error(transparent)]
    Room(#[from] RoomError),

    /// The room session has already left or stopped.
    #[error("room session closed")]
    SessionClosed,

    /// A session was configured with an unusable value.
    #[error("invalid session setting: {0}")]
    InvalidConfig(String),
}
