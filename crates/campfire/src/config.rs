//! Room session configuration.

use campfire_room::FireConfig;
use campfire_tick::TickConfig;

/// Settings for one room visit.
///
/// ```rust
/// use std::time::Duration;
/// use campfire::SessionConfig;
/// use campfire::TickConfig;
///
/// let config = SessionConfig {
///     tick: TickConfig::every(Duration::from_millis(100)),
///     roster_fallback: false,
///     ..Default::default()
/// };
/// assert_eq!(config.command_buffer, 64);
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Fire level cap and burn time.
    pub fire: FireConfig,

    /// Decay tick timing. The scheduler always starts paused, since a
    /// new session's fire is cold.
    pub tick: TickConfig,

    /// Capacity of the handle-to-actor command queue.
    pub command_buffer: usize,

    /// Chat messages buffered per subscriber before it starts lagging.
    pub chat_buffer: usize,

    /// Fetch the roster from the configured source once on entry.
    pub roster_fallback: bool,

    /// Try to acquire the microphone on entry.
    pub acquire_audio: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            fire: FireConfig::default(),
            tick: TickConfig::default(),
            command_buffer: 64,
            chat_buffer: 32,
            roster_fallback: true,
            acquire_audio: true,
        }
    }
}
