//! The negotiation engine: one [`PeerLink`] per remote participant.
//!
//! The engine is a plain value owned by the room session actor. Every
//! method takes `&mut self`, so transitions for a given pair can never
//! interleave. Methods that need to tell the remote something return the
//! outbound [`Signal`]; publishing it is the caller's job.
//!
//! # Roles
//!
//! The participant already in the room initiates: on seeing a `join` it
//! creates a link and sends an offer. A joiner never offers; it creates
//! its link lazily when an offer addressed to it arrives. That asymmetry
//! means each pair produces at most one offer and glare can't happen.
//!
//! # Failure
//!
//! A failure on one link is logged, the link is closed and discarded, and
//! the remote is reported as [`PeerState::Failed`] until something starts
//! a fresh link. Nothing is retried automatically.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use campfire_protocol::{IceCandidate, SessionDescription, Signal, Username};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::link::{PeerLink, PeerState, PeerStatus, Role};
use crate::{
    ConnectivityState, LinkId, MediaConnection, MediaEngine, MediaEvent,
    MediaEventKind, MediaTrack, PeerError,
};

/// Owns every peer link of one participant in one room.
pub struct NegotiationEngine<M: MediaEngine> {
    local: Username,
    media: M,
    links: HashMap<Username, PeerLink<M::Connection>>,
    /// Remotes whose last link failed. Cleared when a new link starts.
    failed: BTreeSet<Username>,
    local_tracks: Vec<MediaTrack>,
    next_link: u64,
    events: mpsc::UnboundedSender<MediaEvent>,
}

impl<M: MediaEngine> NegotiationEngine<M> {
    /// Create an engine for `local`. Media events from every connection
    /// are delivered on `events`; feed them back via
    /// [`on_media_event`](Self::on_media_event).
    pub fn new(
        local: Username,
        media: M,
        events: mpsc::UnboundedSender<MediaEvent>,
    ) -> Self {
        Self {
            local,
            media,
            links: HashMap::new(),
            failed: BTreeSet::new(),
            local_tracks: Vec::new(),
            next_link: 0,
            events,
        }
    }

    pub fn local(&self) -> &Username {
        &self.local
    }

    /// Acquire local audio. On error the engine keeps working and simply
    /// negotiates links without outbound tracks.
    pub async fn acquire_local_audio(&mut self) -> Result<usize, PeerError> {
        let tracks = self.media.acquire_audio().await?;
        info!(user = %self.local, tracks = tracks.len(), "local audio acquired");
        self.local_tracks = tracks;
        Ok(self.local_tracks.len())
    }

    pub fn local_tracks(&self) -> &[MediaTrack] {
        &self.local_tracks
    }

    /// Route a signaling envelope to the matching operation.
    ///
    /// Our own echoes and non-negotiation kinds are ignored.
    pub async fn handle_signal(&mut self, signal: &Signal) -> Option<Signal> {
        if signal.sender() == &self.local {
            return None;
        }

        match signal {
            Signal::Join { sender, .. } => self.on_join(sender).await,
            Signal::Leave { sender, .. } => {
                self.on_leave(sender);
                None
            }
            Signal::Offer {
                sender,
                target_user,
                data,
            } => self.on_offer(sender, target_user, data.clone()).await,
            Signal::Answer {
                sender,
                target_user,
                data,
            } => {
                self.on_answer(sender, target_user, data.clone()).await;
                None
            }
            Signal::IceCandidate {
                sender,
                target_user,
                data,
            } => {
                self.on_ice_candidate(sender, target_user, data.clone()).await;
                None
            }
            Signal::FireUpdate { .. } | Signal::RequestFireSync { .. } => None,
        }
    }

    // -----------------------------------------------------------------
    // Signaling operations
    // -----------------------------------------------------------------

    /// A participant joined: offer to it, unless a link already exists.
    pub async fn on_join(&mut self, remote: &Username) -> Option<Signal> {
        if remote == &self.local {
            return None;
        }
        if self.links.contains_key(remote) {
            debug!(%remote, "join from peer with a live link, ignoring");
            return None;
        }

        let mut link = match self.open_link(remote, Role::Initiator) {
            Ok(link) => link,
            Err(e) => {
                self.record_failure(remote, &e);
                return None;
            }
        };

        match link.connection_mut().create_offer().await {
            Ok(offer) => {
                link.set_state(PeerState::OfferSent);
                info!(%remote, link = %link.id(), "offer sent");
                self.links.insert(remote.clone(), link);
                Some(Signal::Offer {
                    sender: self.local.clone(),
                    target_user: remote.clone(),
                    data: offer,
                })
            }
            Err(e) => {
                link.close(PeerState::Failed);
                self.record_failure(remote, &e);
                None
            }
        }
    }

    /// An offer arrived. Answer it on a fresh link.
    ///
    /// An offer from a remote we already have a link with means the remote
    /// started over, so the old link is closed first.
    pub async fn on_offer(
        &mut self,
        remote: &Username,
        target: &Username,
        offer: SessionDescription,
    ) -> Option<Signal> {
        if target != &self.local || remote == &self.local {
            debug!(%remote, %target, "offer not addressed to us");
            return None;
        }

        if let Some(mut old) = self.links.remove(remote) {
            info!(%remote, link = %old.id(), "offer on existing link, starting over");
            old.close(PeerState::Closed);
        }

        let mut link = match self.open_link(remote, Role::Responder) {
            Ok(link) => link,
            Err(e) => {
                self.record_failure(remote, &e);
                return None;
            }
        };

        match answer_offer(&mut link, offer).await {
            Ok(answer) => {
                link.set_state(PeerState::AnswerExchanged);
                info!(%remote, link = %link.id(), "answer sent");
                self.links.insert(remote.clone(), link);
                Some(Signal::Answer {
                    sender: self.local.clone(),
                    target_user: remote.clone(),
                    data: answer,
                })
            }
            Err(e) => {
                link.close(PeerState::Failed);
                self.record_failure(remote, &e);
                None
            }
        }
    }

    /// An answer arrived for an offer we sent.
    ///
    /// Stray answers (no link) and duplicates (link past `OfferSent`) are
    /// ignored.
    pub async fn on_answer(
        &mut self,
        remote: &Username,
        target: &Username,
        answer: SessionDescription,
    ) {
        if target != &self.local {
            debug!(%remote, %target, "answer not addressed to us");
            return;
        }
        let Some(link) = self.links.get_mut(remote) else {
            debug!(%remote, "answer without a link, ignoring");
            return;
        };
        if link.state() != PeerState::OfferSent {
            debug!(%remote, state = %link.state(), "unexpected answer, ignoring");
            return;
        }

        let result = link.apply_remote_description(answer).await;
        match result {
            Ok(()) => link.set_state(PeerState::AnswerExchanged),
            Err(e) => self.fail_link(remote, &e),
        }
    }

    /// A remote candidate arrived. Queued on the link if the remote
    /// description isn't set yet.
    pub async fn on_ice_candidate(
        &mut self,
        remote: &Username,
        target: &Username,
        candidate: IceCandidate,
    ) {
        if target != &self.local {
            return;
        }
        match self.links.get_mut(remote) {
            Some(link) => link.add_remote_candidate(candidate).await,
            None => debug!(%remote, "candidate without a link, ignoring"),
        }
    }

    /// A participant left: close and discard its link.
    pub fn on_leave(&mut self, remote: &Username) {
        self.failed.remove(remote);
        if let Some(mut link) = self.links.remove(remote) {
            link.close(PeerState::Closed);
            info!(%remote, link = %link.id(), "peer link closed");
        }
    }

    // -----------------------------------------------------------------
    // Media events
    // -----------------------------------------------------------------

    /// Handle something a connection reported. Returns the candidate
    /// signal to trickle, if any.
    pub fn on_media_event(&mut self, event: MediaEvent) -> Option<Signal> {
        let MediaEvent { remote, link: id, kind } = event;

        let Some(link) = self.links.get_mut(&remote) else {
            debug!(%remote, link = %id, "media event for unknown peer");
            return None;
        };
        if link.id() != id {
            debug!(%remote, link = %id, current = %link.id(), "stale media event");
            return None;
        }

        match kind {
            MediaEventKind::LocalCandidate(candidate) => Some(Signal::IceCandidate {
                sender: self.local.clone(),
                target_user: remote,
                data: candidate,
            }),
            MediaEventKind::RemoteTrack(track) => {
                info!(%remote, track = %track.id, "remote track");
                link.push_remote_track(track);
                None
            }
            MediaEventKind::Connectivity(state) => {
                link.set_connectivity(state);
                match state {
                    ConnectivityState::Connected | ConnectivityState::Completed => {
                        if link.state() != PeerState::Connected {
                            link.set_state(PeerState::Connected);
                            info!(%remote, link = %id, "peer connected");
                        }
                    }
                    ConnectivityState::Failed => {
                        let e = PeerError::media(&remote, "connectivity failed");
                        self.fail_link(&remote, &e);
                    }
                    ConnectivityState::Closed => {
                        if let Some(mut link) = self.links.remove(&remote) {
                            link.close(PeerState::Closed);
                            info!(%remote, link = %id, "peer connection closed by media stack");
                        }
                    }
                    ConnectivityState::New
                    | ConnectivityState::Checking
                    | ConnectivityState::Disconnected => {}
                }
                None
            }
        }
    }

    // -----------------------------------------------------------------
    // Bulk teardown and diagnostics
    // -----------------------------------------------------------------

    /// Close links to every remote for which `is_member` is false.
    pub fn retain_members(&mut self, is_member: impl Fn(&Username) -> bool) {
        let gone: Vec<Username> = self
            .links
            .keys()
            .filter(|remote| !is_member(remote))
            .cloned()
            .collect();
        for remote in gone {
            if let Some(mut link) = self.links.remove(&remote) {
                link.close(PeerState::Closed);
                info!(%remote, link = %link.id(), "peer left roster, link closed");
            }
        }
        self.failed.retain(|remote| is_member(remote));
    }

    /// Close every link. Used when leaving the room.
    pub fn close_all(&mut self) {
        for (remote, mut link) in self.links.drain() {
            link.close(PeerState::Closed);
            debug!(%remote, link = %link.id(), "peer link closed");
        }
        self.failed.clear();
    }

    pub fn link(&self, remote: &Username) -> Option<&PeerLink<M::Connection>> {
        self.links.get(remote)
    }

    pub fn has_link(&self, remote: &Username) -> bool {
        self.links.contains_key(remote)
    }

    /// Number of live links.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Per-peer status for diagnostics, including remotes whose last link
    /// failed.
    pub fn peer_states(&self) -> BTreeMap<Username, PeerStatus> {
        let mut states: BTreeMap<Username, PeerStatus> = self
            .failed
            .iter()
            .map(|remote| {
                let status = PeerStatus {
                    state: PeerState::Failed,
                    connectivity: ConnectivityState::Closed,
                    role: None,
                };
                (remote.clone(), status)
            })
            .collect();
        states.extend(
            self.links
                .iter()
                .map(|(remote, link)| (remote.clone(), link.status())),
        );
        states
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    fn open_link(
        &mut self,
        remote: &Username,
        role: Role,
    ) -> Result<PeerLink<M::Connection>, PeerError> {
        self.next_link += 1;
        let id = LinkId(self.next_link);

        let mut connection =
            self.media.create_connection(remote, id, self.events.clone())?;
        if let Err(e) = self
            .local_tracks
            .iter()
            .try_for_each(|track| connection.add_track(track))
        {
            connection.close();
            return Err(e);
        }

        self.failed.remove(remote);
        debug!(%remote, link = %id, ?role, "peer link created");
        Ok(PeerLink::new(remote.clone(), id, role, connection))
    }

    fn fail_link(&mut self, remote: &Username, error: &PeerError) {
        if let Some(mut link) = self.links.remove(remote) {
            link.close(PeerState::Failed);
        }
        self.record_failure(remote, error);
    }

    fn record_failure(&mut self, remote: &Username, error: &PeerError) {
        warn!(%remote, %error, "peer link failed");
        self.failed.insert(remote.clone());
    }
}

async fn answer_offer<C: MediaConnection>(
    link: &mut PeerLink<C>,
    offer: SessionDescription,
) -> Result<SessionDescription, PeerError> {
    link.apply_remote_description(offer).await?;
    link.set_state(PeerState::OfferReceived);
    link.connection_mut().create_answer().await
}

// =========================================================================
// Tests
// =========================================================================
