//! The seam between negotiation and the actual media stack.
//!
//! The engine never touches audio or sockets. It drives a [`MediaEngine`]
//! (one per participant) which hands out [`MediaConnection`]s (one per
//! remote peer). Anything the media stack learns on its own, like a new
//! local candidate or a connectivity change, comes back as a
//! [`MediaEvent`] on the channel given at connection creation.

use std::fmt;
use std::future::Future;

use campfire_protocol::{IceCandidate, SessionDescription, Username};
use tokio::sync::mpsc;

use crate::PeerError;

/// Generation id of a peer link. A remote that leaves and rejoins gets a
/// new id, so late events from the old connection can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub u64);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link#{}", self.0)
    }
}

/// A media track, local or remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTrack {
    pub id: String,
    pub kind: TrackKind,
}

impl MediaTrack {
    pub fn audio(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: TrackKind::Audio,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// Connectivity as reported by the media stack, mirroring the ICE
/// connection states a browser exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectivityState {
    #[default]
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::New => "new",
            Self::Checking => "checking",
            Self::Connected => "connected",
            Self::Completed => "completed",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Something a connection reported without being asked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaEvent {
    pub remote: Username,
    pub link: LinkId,
    pub kind: MediaEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaEventKind {
    /// A local candidate was gathered and should be trickled to the remote.
    LocalCandidate(IceCandidate),
    /// The connection's connectivity changed.
    Connectivity(ConnectivityState),
    /// The remote started sending a track.
    RemoteTrack(MediaTrack),
}

/// Per-participant factory for media connections.
pub trait MediaEngine: Send + Sync + 'static {
    type Connection: MediaConnection;

    /// Acquire the local microphone. Called once when entering a room.
    fn acquire_audio(
        &self,
    ) -> impl Future<Output = Result<Vec<MediaTrack>, PeerError>> + Send;

    /// Create a fresh connection toward `remote`. Events it produces must
    /// be tagged with `link` and sent on `events`.
    fn create_connection(
        &self,
        remote: &Username,
        link: LinkId,
        events: mpsc::UnboundedSender<MediaEvent>,
    ) -> Result<Self::Connection, PeerError>;
}

/// One point-to-point media connection.
///
/// `create_offer` and `create_answer` also install the returned
/// description as the local description.
pub trait MediaConnection: Send + 'static {
    fn add_track(&mut self, track: &MediaTrack) -> Result<(), PeerError>;

    fn create_offer(
        &mut self,
    ) -> impl Future<Output = Result<SessionDescription, PeerError>> + Send;

    fn create_answer(
        &mut self,
    ) -> impl Future<Output = Result<SessionDescription, PeerError>> + Send;

    fn set_remote_description(
        &mut self,
        description: SessionDescription,
    ) -> impl Future<Output = Result<(), PeerError>> + Send;

    /// Apply a remote candidate. Fails if no remote description is set.
    fn add_ice_candidate(
        &mut self,
        candidate: IceCandidate,
    ) -> impl Future<Output = Result<(), PeerError>> + Send;

    /// Tear down the connection. Idempotent.
    fn close(&mut self);
}
