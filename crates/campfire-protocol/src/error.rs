//! Error types for the protocol layer.

/// Errors that can occur while encoding or decoding messages.
///
/// On the receiving side none of these are fatal: the signaling topic is
/// shared, so a message that fails here is logged and skipped.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, missing fields, or an
    /// unknown `type` tag.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message parsed but breaks a protocol rule, e.g. a fire level
    /// above the maximum.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
