//! Fire configuration.

use campfire_protocol::MAX_FIRE_LEVEL;
use serde::{Deserialize, Serialize};

/// How the shared fire behaves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FireConfig {
    /// Highest level fuel can raise the fire to.
    pub max_level: u8,

    /// Ticks a level burns for before dropping by one. With the default
    /// one-second tick this is the number of seconds.
    pub burn_ticks: u32,
}

impl Default for FireConfig {
    fn default() -> Self {
        Self {
            max_level: MAX_FIRE_LEVEL,
            burn_ticks: 30,
        }
    }
}
