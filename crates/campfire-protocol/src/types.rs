//! Wire types for Campfire's room signaling and chat topics.
//!
//! Every type here travels "on the wire" as JSON published to the bus.
//! Field names follow what browser clients already send (`targetUser`,
//! `sdpMid`, `roomId`), so a Rust participant and a browser participant can
//! share a room.

use std::fmt;

use campfire_transport::Topic;
use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Highest fire level a room can hold.
pub const MAX_FIRE_LEVEL: u8 = 10;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A participant's username. Unique per room for the length of a session.
///
/// `#[serde(transparent)]` keeps it a plain JSON string: `"alice"`, not
/// `{"0":"alice"}`.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Username(String);

impl Username {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Username {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// A room's human-chosen name. Scopes every topic the room uses.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RoomName(String);

impl RoomName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Topic carrying join/leave, negotiation, and fire-state signals.
    pub fn signaling_topic(&self) -> Topic {
        Topic::new(format!("/topic/room/{}", self.0))
    }

    /// Topic carrying chat fan-out.
    pub fn chat_topic(&self) -> Topic {
        Topic::new(format!("/topic/room/{}/chat", self.0))
    }
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

// ---------------------------------------------------------------------------
// Media negotiation payloads
// ---------------------------------------------------------------------------

/// Which side of an offer/answer exchange a description belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// A session description, shaped like a browser `RTCSessionDescription`:
/// `{ "type": "offer", "sdp": "v=0..." }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// A trickled connectivity candidate, shaped like `RTCIceCandidateInit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_m_line_index: Option<u16>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_m_line_index: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Signal: the signaling topic envelope
// ---------------------------------------------------------------------------

/// Every message on a room's signaling topic.
///
/// Internally tagged by `type` with kebab-case tags:
///
/// ```text
/// { "type": "offer", "sender": "alice", "targetUser": "bob", "data": {...} }
/// { "type": "fire-update", "sender": "alice", "level": 3 }
/// ```
///
/// `join` and `leave` may carry a `users` snapshot when relayed by a room
/// server that tracks membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Signal {
    /// Announce presence. Existing participants answer with offers.
    Join {
        sender: Username,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        users: Option<Vec<Username>>,
    },

    /// Announce departure. Peers tear down their link to `sender`.
    Leave {
        sender: Username,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        users: Option<Vec<Username>>,
    },

    /// Offer addressed to `target_user`.
    Offer {
        sender: Username,
        #[serde(rename = "targetUser")]
        target_user: Username,
        data: SessionDescription,
    },

    /// Answer addressed to `target_user`.
    Answer {
        sender: Username,
        #[serde(rename = "targetUser")]
        target_user: Username,
        data: SessionDescription,
    },

    /// Connectivity candidate addressed to `target_user`.
    IceCandidate {
        sender: Username,
        #[serde(rename = "targetUser")]
        target_user: Username,
        data: IceCandidate,
    },

    /// Overwrite everyone's fire level. Last one received wins.
    #[serde(alias = "fire_update")]
    FireUpdate { sender: Username, level: u8 },

    /// Ask anyone holding a lit fire to broadcast it.
    #[serde(alias = "request_fire_sync")]
    RequestFireSync { sender: Username },
}

impl Signal {
    pub fn join(sender: Username) -> Self {
        Self::Join {
            sender,
            users: None,
        }
    }

    pub fn leave(sender: Username) -> Self {
        Self::Leave {
            sender,
            users: None,
        }
    }

    /// Who published this signal.
    pub fn sender(&self) -> &Username {
        match self {
            Self::Join { sender, .. }
            | Self::Leave { sender, .. }
            | Self::Offer { sender, .. }
            | Self::Answer { sender, .. }
            | Self::IceCandidate { sender, .. }
            | Self::FireUpdate { sender, .. }
            | Self::RequestFireSync { sender } => sender,
        }
    }

    /// The addressee, for the point-to-point negotiation kinds.
    pub fn target(&self) -> Option<&Username> {
        match self {
            Self::Offer { target_user, .. }
            | Self::Answer { target_user, .. }
            | Self::IceCandidate { target_user, .. } => Some(target_user),
            _ => None,
        }
    }

    /// `false` only for addressed signals meant for someone else.
    pub fn is_for(&self, user: &Username) -> bool {
        self.target().is_none_or(|target| target == user)
    }

    /// The wire tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::Leave { .. } => "leave",
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::IceCandidate { .. } => "ice-candidate",
            Self::FireUpdate { .. } => "fire-update",
            Self::RequestFireSync { .. } => "request-fire-sync",
        }
    }

    /// Checks rules that deserialization alone can't express.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.sender().as_str().is_empty() {
            return Err(ProtocolError::InvalidMessage(format!(
                "{} has an empty sender",
                self.kind()
            )));
        }
        if self.target().is_some_and(|t| t.as_str().is_empty()) {
            return Err(ProtocolError::InvalidMessage(format!(
                "{} has an empty targetUser",
                self.kind()
            )));
        }
        match self {
            Self::FireUpdate { level, .. } if *level > MAX_FIRE_LEVEL => {
                Err(ProtocolError::InvalidMessage(format!(
                    "fire level {level} exceeds {MAX_FIRE_LEVEL}"
                )))
            }
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// Tag carried by chat messages: always `"CHAT"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChatKind {
    #[default]
    #[serde(rename = "CHAT")]
    Chat,
}

/// A chat line on the room's chat topic. Fan-out only; never reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(rename = "type", default)]
    pub kind: ChatKind,
    pub sender: Username,
    pub content: String,
    #[serde(rename = "roomId")]
    pub room_id: RoomName,
}

impl ChatMessage {
    pub fn new(
        sender: Username,
        room_id: RoomName,
        content: impl Into<String>,
    ) -> Self {
        Self {
            kind: ChatKind::Chat,
            sender,
            content: content.into(),
            room_id,
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
