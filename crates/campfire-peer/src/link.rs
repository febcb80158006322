//! A single negotiated connection to one remote participant.

use std::fmt;

use campfire_protocol::{IceCandidate, SessionDescription, Username};
use tracing::{debug, warn};

use crate::{ConnectivityState, LinkId, MediaConnection, MediaTrack, PeerError};

/// Negotiation state of a [`PeerLink`].
///
/// ```text
///   New ──(offer out)──→ OfferSent ──(answer in)──┐
///    │                                            ▼
///    └──(offer in)──→ OfferReceived ──(answer out)──→ AnswerExchanged ──→ Connected
///
///   any state ──→ Failed | Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeerState {
    #[default]
    New,
    OfferSent,
    OfferReceived,
    AnswerExchanged,
    Connected,
    Failed,
    Closed,
}

impl PeerState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Closed)
    }
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::New => "new",
            Self::OfferSent => "offer-sent",
            Self::OfferReceived => "offer-received",
            Self::AnswerExchanged => "answer-exchanged",
            Self::Connected => "connected",
            Self::Failed => "failed",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Which side of the exchange this participant plays for a link.
///
/// Whoever was already in the room when the other joined initiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

/// Snapshot of a link for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerStatus {
    pub state: PeerState,
    pub connectivity: ConnectivityState,
    pub role: Option<Role>,
}

/// One live connection to a remote participant, owned by the
/// [`NegotiationEngine`](crate::NegotiationEngine).
pub struct PeerLink<C> {
    remote: Username,
    id: LinkId,
    role: Role,
    state: PeerState,
    connectivity: ConnectivityState,
    connection: C,
    remote_description_set: bool,
    /// Remote candidates that arrived before the remote description.
    pending_candidates: Vec<IceCandidate>,
    remote_tracks: Vec<MediaTrack>,
}

impl<C: MediaConnection> PeerLink<C> {
    pub(crate) fn new(remote: Username, id: LinkId, role: Role, connection: C) -> Self {
        Self {
            remote,
            id,
            role,
            state: PeerState::New,
            connectivity: ConnectivityState::New,
            connection,
            remote_description_set: false,
            pending_candidates: Vec::new(),
            remote_tracks: Vec::new(),
        }
    }

    pub fn remote(&self) -> &Username {
        &self.remote
    }

    pub fn id(&self) -> LinkId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> PeerState {
        self.state
    }

    pub fn connectivity(&self) -> ConnectivityState {
        self.connectivity
    }

    pub fn has_remote_description(&self) -> bool {
        self.remote_description_set
    }

    /// Number of remote candidates waiting for the remote description.
    pub fn pending_candidates(&self) -> usize {
        self.pending_candidates.len()
    }

    pub fn remote_tracks(&self) -> &[MediaTrack] {
        &self.remote_tracks
    }

    pub fn status(&self) -> PeerStatus {
        PeerStatus {
            state: self.state,
            connectivity: self.connectivity,
            role: Some(self.role),
        }
    }

    pub(crate) fn set_state(&mut self, state: PeerState) {
        debug!(
            remote = %self.remote,
            link = %self.id,
            from = %self.state,
            to = %state,
            "peer state"
        );
        self.state = state;
    }

    pub(crate) fn set_connectivity(&mut self, connectivity: ConnectivityState) {
        self.connectivity = connectivity;
    }

    pub(crate) fn push_remote_track(&mut self, track: MediaTrack) {
        self.remote_tracks.push(track);
    }

    pub(crate) fn connection_mut(&mut self) -> &mut C {
        &mut self.connection
    }

    /// Apply the remote description, then flush any queued candidates in
    /// arrival order.
    pub(crate) async fn apply_remote_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<(), PeerError> {
        self.connection.set_remote_description(description).await?;
        self.remote_description_set = true;

        let queued = std::mem::take(&mut self.pending_candidates);
        if !queued.is_empty() {
            debug!(remote = %self.remote, count = queued.len(), "flushing queued candidates");
        }
        for candidate in queued {
            self.apply_candidate(candidate).await;
        }
        Ok(())
    }

    /// Apply a remote candidate now, or queue it until the remote
    /// description is set.
    pub(crate) async fn add_remote_candidate(&mut self, candidate: IceCandidate) {
        if self.remote_description_set {
            self.apply_candidate(candidate).await;
        } else {
            self.pending_candidates.push(candidate);
        }
    }

    async fn apply_candidate(&mut self, candidate: IceCandidate) {
        // A single bad candidate doesn't sink the link; others may work.
        if let Err(e) = self.connection.add_ice_candidate(candidate).await {
            warn!(remote = %self.remote, error = %e, "remote candidate rejected");
        }
    }

    pub(crate) fn close(&mut self, state: PeerState) {
        self.connection.close();
        self.pending_candidates.clear();
        self.set_state(state);
    }
}
