//! Error types for the room layer.

/// Errors from room membership and fire operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    /// `ignite` while the fire is already burning.
    #[error("fire is already lit (level {0})")]
    AlreadyLit(u8),

    /// `add_fuel` while the fire is out. Ignite it first.
    #[error("fire is not lit")]
    NotLit,

    /// The roster fallback could not be fetched or parsed.
    #[error("roster unavailable: {0}")]
    RosterUnavailable(String),
}
