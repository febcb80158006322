//! Codec trait and implementations for serializing/deserializing messages.
//!
//! The session layer doesn't care HOW signals become bytes; it holds
//! something that implements [`Codec`]. [`JsonCodec`] is the only format
//! browsers on the same room understand, so it is the default.

use serde::{Serialize, de::DeserializeOwned};

use crate::{ProtocolError, Signal};

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because the codec lives inside a long-running
/// room session task.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;

    /// Decodes a signaling-topic message and checks its protocol rules.
    fn decode_signal(&self, data: &[u8]) -> Result<Signal, ProtocolError> {
        let signal: Signal = self.decode(data)?;
        signal.validate()?;
        Ok(signal)
    }
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ```rust
/// use campfire_protocol::{Codec, JsonCodec, Signal, Username};
///
/// let codec = JsonCodec;
/// let bytes = codec.encode(&Signal::join(Username::new("alice"))).unwrap();
/// let decoded = codec.decode_signal(&bytes).unwrap();
/// assert_eq!(decoded.kind(), "join");
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
