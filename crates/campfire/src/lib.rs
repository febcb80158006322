//! # Campfire
//!
//! Voice rooms where every participant connects directly to every other,
//! sharing one campfire that anyone can light or feed and that slowly
//! burns down on its own.
//!
//! There is no server holding room state. Participants talk over a
//! publish/subscribe bus: they negotiate a media link per pair of
//! participants on the room's signaling topic, and keep their copies of
//! the fire level in step by broadcasting it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use campfire::prelude::*;
//!
//! # async fn run() -> Result<(), CampfireError> {
//! let broker = LocalBroker::new();
//! let alice = RoomSession::enter("den", "alice", broker.connect().await, LoopbackMedia::new())
//!     .await?;
//! let bob = RoomSession::enter("den", "bob", broker.connect().await, LoopbackMedia::new())
//!     .await?;
//!
//! alice.ignite().await?;
//! // bob's replica follows shortly after.
//! let mut fire = bob.watch_fire();
//! fire.wait_for(|f| f.level == 1).await.ok();
//! # Ok(())
//! # }
//! ```
//!
//! ## Crates
//!
//! - `campfire-transport`: the bus ([`Bus`](campfire_transport::Bus))
//! - `campfire-protocol`: the signal envelopes and JSON codec
//! - `campfire-peer`: per-peer media negotiation
//! - `campfire-room`: roster and fire replica
//! - `campfire-tick`: the decay tick scheduler

mod actor;
mod config;
mod error;
mod session;

pub use config::SessionConfig;
pub use error::CampfireError;
pub use session::{RoomSession, RoomSessionBuilder};

pub use campfire_peer as peer;
pub use campfire_protocol as protocol;
pub use campfire_room as room;
pub use campfire_tick::TickConfig;
pub use campfire_transport as transport;

pub mod prelude {
    //! Everything needed to enter a room.

    pub use crate::{CampfireError, RoomSession, SessionConfig, TickConfig};
    pub use campfire_peer::{LoopbackMedia, MediaEngine, PeerState, PeerStatus};
    pub use campfire_protocol::{ChatMessage, RoomName, Username};
    #[cfg(feature = "http")]
    pub use campfire_room::HttpRosterSource;
    pub use campfire_room::{
        FireConfig, FireStatus, NoRoster, RoomError, RosterSource, StaticRoster,
    };
    pub use campfire_transport::{Bus, BusStatus, LocalBroker};
    #[cfg(feature = "websocket")]
    pub use campfire_transport::{WebSocketBus, WebSocketBusConfig};
}
