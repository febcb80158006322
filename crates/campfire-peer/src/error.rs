//! Error types for the peer negotiation layer.

use campfire_protocol::Username;

/// Errors raised while negotiating or running a single peer link.
///
/// None of these escape the room session: the engine logs them, discards
/// the affected link, and carries on with every other peer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PeerError {
    /// Local audio could not be acquired (no microphone, permission
    /// denied). The participant stays in the room without outbound tracks.
    #[error("local media unavailable: {0}")]
    MediaUnavailable(String),

    /// The media primitive rejected an operation on one connection.
    #[error("media operation failed for {remote}: {reason}")]
    Media { remote: Username, reason: String },

    /// No link exists for this remote participant.
    #[error("no peer link for {0}")]
    NoLink(Username),
}

impl PeerError {
    pub fn media(remote: &Username, reason: impl Into<String>) -> Self {
        Self::Media {
            remote: remote.clone(),
            reason: reason.into(),
        }
    }
}
