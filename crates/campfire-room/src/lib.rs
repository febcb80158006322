//! Room state for Campfire: who is here, and how hot the fire is.
//!
//! # Key types
//!
//! - [`Roster`]: membership built from `join`/`leave` broadcasts
//! - [`RosterSource`]: one-off roster fallback ([`HttpRosterSource`]
//!   with the `http` feature)
//! - [`FireSync`]: this participant's replica of the shared fire
//! - [`FireConfig`]: fire settings (max level, burn ticks)

mod config;
mod error;
mod fire;
mod roster;
mod source;

pub use config::FireConfig;
pub use error::RoomError;
pub use fire::{FireStatus, FireSync};
pub use roster::{Roster, RosterChange};
#[cfg(feature = "http")]
pub use source::HttpRosterSource;
pub use source::{NoRoster, RosterSource, StaticRoster};
