//! The shared fire: a replicated, decaying level.
//!
//! Every participant keeps its own [`FireSync`]. Replicas converge by
//! broadcast, not consensus:
//!
//! - a local `ignite`/`add_fuel` changes the level and yields a
//!   `fire-update` to broadcast;
//! - a `fire-update` from anyone else overwrites the local level, no
//!   matter what it was (last one received wins);
//! - a newcomer asks with `request-fire-sync`, and anyone holding a lit
//!   fire answers with its level. Holders also answer a bare `join`.
//!
//! Decay is local. Each replica counts down `burn_ticks` ticks after the
//! last change and drops one level when it runs out. Decay is never
//! broadcast; replicas that saw the same last update stay roughly in step.

use campfire_protocol::{MAX_FIRE_LEVEL, Signal, Username};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{FireConfig, RoomError};

/// Point-in-time view of a replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FireStatus {
    pub level: u8,
    /// Ticks left before the next decay step.
    pub countdown: u32,
}

impl FireStatus {
    pub fn is_lit(&self) -> bool {
        self.level > 0
    }
}

/// One participant's replica of the room's fire.
#[derive(Debug, Clone)]
pub struct FireSync {
    local: Username,
    config: FireConfig,
    level: u8,
    countdown: u32,
}

impl FireSync {
    /// A cold fire (level 0) for `local`. The cap is clamped to
    /// `1..=MAX_FIRE_LEVEL` and the burn time to at least one tick.
    pub fn new(local: Username, mut config: FireConfig) -> Self {
        config.max_level = config.max_level.clamp(1, MAX_FIRE_LEVEL);
        config.burn_ticks = config.burn_ticks.max(1);
        let countdown = config.burn_ticks;
        Self {
            local,
            config,
            level: 0,
            countdown,
        }
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn countdown(&self) -> u32 {
        self.countdown
    }

    pub fn is_lit(&self) -> bool {
        self.level > 0
    }

    pub fn status(&self) -> FireStatus {
        FireStatus {
            level: self.level,
            countdown: self.countdown,
        }
    }

    pub fn config(&self) -> &FireConfig {
        &self.config
    }

    // -----------------------------------------------------------------
    // Local actions
    // -----------------------------------------------------------------

    /// Light a cold fire to level 1. Returns the update to broadcast.
    ///
    /// # Errors
    /// [`RoomError::AlreadyLit`] if the fire is burning.
    pub fn ignite(&mut self) -> Result<Signal, RoomError> {
        if self.level > 0 {
            return Err(RoomError::AlreadyLit(self.level));
        }
        self.set_level(1);
        info!(user = %self.local, "fire ignited");
        Ok(self.update())
    }

    /// Raise a burning fire by one, capped at `max_level`. The countdown
    /// resets even at the cap. Returns the update to broadcast.
    ///
    /// # Errors
    /// [`RoomError::NotLit`] if the fire is out.
    pub fn add_fuel(&mut self) -> Result<Signal, RoomError> {
        if self.level == 0 {
            return Err(RoomError::NotLit);
        }
        let level = self.level.saturating_add(1).min(self.config.max_level);
        self.set_level(level);
        debug!(user = %self.local, level, "fuel added");
        Ok(self.update())
    }

    /// One decay tick. Returns the new level when it dropped.
    pub fn tick(&mut self) -> Option<u8> {
        if self.level == 0 {
            return None;
        }
        if self.countdown <= 1 {
            self.level -= 1;
            self.countdown = self.config.burn_ticks;
            debug!(level = self.level, "fire decayed");
            Some(self.level)
        } else {
            self.countdown -= 1;
            None
        }
    }

    /// Back to a cold fire, as on leaving a room.
    pub fn reset(&mut self) {
        self.set_level(0);
    }

    // -----------------------------------------------------------------
    // Remote events
    // -----------------------------------------------------------------

    /// Someone broadcast their level. Overwrites ours unless it's our own
    /// echo. Returns whether the update was applied.
    pub fn on_remote_update(&mut self, sender: &Username, level: u8) -> bool {
        if sender == &self.local {
            return false;
        }
        if level > self.config.max_level {
            warn!(
                %sender,
                level,
                max = self.config.max_level,
                "fire update out of range, ignoring"
            );
            return false;
        }
        debug!(%sender, from = self.level, to = level, "fire level overwritten");
        self.set_level(level);
        true
    }

    /// Someone asked for the current level. Answer if we hold a lit fire.
    pub fn on_sync_requested(&self, sender: &Username) -> Option<Signal> {
        if sender == &self.local || self.level == 0 {
            return None;
        }
        debug!(%sender, level = self.level, "answering fire sync request");
        Some(self.update())
    }

    /// Someone joined. Holders broadcast right away, without waiting for
    /// the newcomer's sync request.
    pub fn on_peer_join(&self, sender: &Username) -> Option<Signal> {
        if sender == &self.local || self.level == 0 {
            return None;
        }
        Some(self.update())
    }

    /// Route a signaling envelope to the matching operation. Returns the
    /// update to broadcast, if any.
    pub fn handle_signal(&mut self, signal: &Signal) -> Option<Signal> {
        match signal {
            Signal::FireUpdate { sender, level } => {
                self.on_remote_update(sender, *level);
                None
            }
            Signal::RequestFireSync { sender } => self.on_sync_requested(sender),
            Signal::Join { sender, .. } => self.on_peer_join(sender),
            _ => None,
        }
    }

    /// The `request-fire-sync` a newcomer sends after joining.
    pub fn sync_request(&self) -> Signal {
        Signal::RequestFireSync {
            sender: self.local.clone(),
        }
    }

    fn update(&self) -> Signal {
        Signal::FireUpdate {
            sender: self.local.clone(),
            level: self.level,
        }
    }

    fn set_level(&mut self, level: u8) {
        self.level = level;
        self.countdown = self.config.burn_ticks;
    }
}

// =========================================================================
// Tests
// =========================================================================
