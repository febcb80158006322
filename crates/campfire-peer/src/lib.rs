//! Peer negotiation for Campfire rooms.
//!
//! Every participant keeps one [`PeerLink`] per remote participant and
//! negotiates it over the room's signaling topic:
//!
//! 1. **Media seam**: [`MediaEngine`] / [`MediaConnection`] abstract the
//!    real media stack (descriptions, candidates, connectivity).
//! 2. **Link state**: [`PeerLink`] and its [`PeerState`] machine.
//! 3. **Engine**: [`NegotiationEngine`] turns inbound signals into link
//!    transitions and outbound signals.
//!
//! # How it fits in the stack
//!
//! ```text
//! Room session (above)  ← dispatches offer/answer/ice/join/leave here
//!     ↕
//! Peer layer (this crate)  ← one state machine per remote participant
//!     ↕
//! Protocol layer (below)  ← Signal, SessionDescription, IceCandidate
//! ```

mod engine;
mod error;
mod link;
#[cfg(feature = "loopback")]
mod loopback;
mod media;

pub use engine::NegotiationEngine;
pub use error::PeerError;
pub use link::{PeerLink, PeerState, PeerStatus, Role};
#[cfg(feature = "loopback")]
pub use loopback::{LoopbackConnection, LoopbackMedia, LoopbackRecord};
pub use media::{
    ConnectivityState, LinkId, MediaConnection, MediaEngine, MediaEvent,
    MediaEventKind, MediaTrack, TrackKind,
};
