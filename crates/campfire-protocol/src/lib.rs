//! Wire protocol for Campfire.
//!
//! This crate defines the "language" participants of a room speak over the
//! bus:
//!
//! - **Types** ([`Signal`], [`ChatMessage`], [`SessionDescription`],
//!   [`IceCandidate`]): the JSON envelopes on a room's topics.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those envelopes are
//!   converted to/from bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong while doing so.
//!
//! # Architecture
//!
//! ```text
//! Transport (topic, bytes) → Protocol (Signal) → Session (negotiation, fire state)
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    ChatKind, ChatMessage, IceCandidate, MAX_FIRE_LEVEL, RoomName, SdpKind,
    SessionDescription, Signal, Username,
};
